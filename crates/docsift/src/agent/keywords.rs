use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::decode::from_value;
use super::llm::{ChatRequest, PromptRunner};
use super::{elapsed_secs, AnalysisAgent, AnalysisPayload};
use crate::config::schema::KEYWORD_EXTRACTOR;
use crate::error::TaskError;

const INSTRUCTIONS: &str = "You are a keyword extraction specialist. Identify the top 5 most \
important keywords from the document.";

pub const KEYWORD_COUNT: usize = 5;

const DEFAULT_KEYWORDS: [&str; KEYWORD_COUNT] = ["document", "text", "content", "analysis", "data"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordResult {
    pub keywords: Vec<String>,
    pub processing_time: f64,
}

impl KeywordResult {
    pub fn defaults(processing_time: f64) -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            processing_time,
        }
    }

    pub fn validate(&self) -> Result<(), TaskError> {
        if self.keywords.len() != KEYWORD_COUNT {
            return Err(TaskError::MalformedOutput(format!(
                "exactly {} keywords are required, got {}",
                KEYWORD_COUNT,
                self.keywords.len()
            )));
        }
        if self.keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(TaskError::MalformedOutput(
                "keywords must be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct KeywordReply {
    keywords: Vec<String>,
}

pub struct KeywordExtractorAgent {
    runner: PromptRunner,
}

impl KeywordExtractorAgent {
    pub fn new(runner: PromptRunner) -> Self {
        Self { runner }
    }

    fn request(text: &str) -> ChatRequest {
        ChatRequest::new(
            INSTRUCTIONS,
            format!(
                "Document:\n\"\"\"{}\"\"\"\n\n\
                 Extract exactly 5 keywords that best represent the main topics, ordered by \
                 importance. Respond only with JSON: {{\"keywords\": [str, str, str, str, str]}}.",
                text
            ),
        )
    }
}

#[async_trait]
impl AnalysisAgent for KeywordExtractorAgent {
    fn name(&self) -> &str {
        KEYWORD_EXTRACTOR
    }

    async fn process(&self, text: &str) -> Result<AnalysisPayload, TaskError> {
        let start = Instant::now();
        if text.trim().is_empty() {
            return Ok(AnalysisPayload::Keywords(KeywordResult::defaults(
                elapsed_secs(start),
            )));
        }

        let value = self
            .runner
            .run_json(KEYWORD_EXTRACTOR, Self::request(text))
            .await?;
        let reply: KeywordReply = from_value(value)?;

        let result = KeywordResult {
            keywords: reply.keywords.iter().map(|k| k.trim().to_string()).collect(),
            processing_time: elapsed_secs(start),
        };
        result.validate()?;
        Ok(AnalysisPayload::Keywords(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::testing::{fast_policy, ScriptedClient};

    fn agent(reply: &str) -> KeywordExtractorAgent {
        KeywordExtractorAgent::new(PromptRunner::new(
            Some(ScriptedClient::replying(reply)),
            fast_policy(),
        ))
    }

    #[tokio::test]
    async fn test_five_keywords() {
        let payload = agent(r#"{"keywords": ["rust", " async ", "jobs", "retry", "status"]}"#)
            .process("text")
            .await
            .unwrap();
        match payload {
            AnalysisPayload::Keywords(result) => {
                assert_eq!(result.keywords, vec!["rust", "async", "jobs", "retry", "status"]);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wrong_count_is_malformed() {
        let err = agent(r#"{"keywords": ["one", "two"]}"#)
            .process("text")
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::MalformedOutput(_)));
    }

    #[tokio::test]
    async fn test_blank_keyword_is_malformed() {
        let err = agent(r#"{"keywords": ["a", "b", "c", "d", "  "]}"#)
            .process("text")
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::MalformedOutput(_)));
    }

    #[tokio::test]
    async fn test_empty_text_returns_defaults() {
        match agent("unused").process("").await.unwrap() {
            AnalysisPayload::Keywords(result) => {
                assert_eq!(result.keywords[0], "document");
                assert!(result.validate().is_ok());
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }
}
