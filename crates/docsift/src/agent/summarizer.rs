use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::decode::from_value;
use super::llm::{ChatRequest, PromptRunner};
use super::{check_unit_interval, elapsed_secs, AnalysisAgent, AnalysisPayload};
use crate::config::schema::SUMMARIZER;
use crate::error::TaskError;

const INSTRUCTIONS: &str = "You are an expert document summarizer. Generate a concise summary \
between 100 and 150 words that highlights the central narrative and preserves critical details.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryResult {
    pub text: String,
    pub key_points: Vec<String>,
    pub confidence: f64,
    pub processing_time: f64,
}

impl SummaryResult {
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.text.trim().is_empty() {
            return Err(TaskError::MalformedOutput(
                "summary text is empty".to_string(),
            ));
        }
        if !(3..=5).contains(&self.key_points.len()) {
            return Err(TaskError::MalformedOutput(format!(
                "expected 3 to 5 key points, got {}",
                self.key_points.len()
            )));
        }
        if self.key_points.iter().any(|p| p.trim().is_empty()) {
            return Err(TaskError::MalformedOutput(
                "key points must be non-empty".to_string(),
            ));
        }
        check_unit_interval("confidence", self.confidence)
    }
}

#[derive(Deserialize)]
struct SummaryReply {
    text: String,
    key_points: Vec<String>,
    confidence: f64,
}

pub struct SummarizerAgent {
    runner: PromptRunner,
}

impl SummarizerAgent {
    pub fn new(runner: PromptRunner) -> Self {
        Self { runner }
    }

    fn request(text: &str) -> ChatRequest {
        ChatRequest::new(
            INSTRUCTIONS,
            format!(
                "Document to summarize:\n\"\"\"{}\"\"\"\n\n\
                 1. Write 100-150 words covering main themes and conclusions.\n\
                 2. Provide 3-5 bullet points capturing critical insights.\n\
                 3. Give a confidence score between 0 and 1.\n\
                 Respond only with JSON: {{\"text\": str, \"key_points\": [str], \"confidence\": float}}.",
                text
            ),
        )
    }
}

#[async_trait]
impl AnalysisAgent for SummarizerAgent {
    fn name(&self) -> &str {
        SUMMARIZER
    }

    async fn process(&self, text: &str) -> Result<AnalysisPayload, TaskError> {
        let start = Instant::now();
        if text.trim().is_empty() {
            return Err(TaskError::Failed(
                "Document text is required for summarization.".to_string(),
            ));
        }

        let value = self.runner.run_json(SUMMARIZER, Self::request(text)).await?;
        let reply: SummaryReply = from_value(value)?;

        let result = SummaryResult {
            text: reply.text.trim().to_string(),
            key_points: reply
                .key_points
                .iter()
                .map(|p| p.trim().to_string())
                .collect(),
            confidence: reply.confidence,
            processing_time: elapsed_secs(start),
        };
        result.validate()?;
        Ok(AnalysisPayload::Summary(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::testing::{fast_policy, ScriptedClient};

    fn agent(reply: &str) -> SummarizerAgent {
        SummarizerAgent::new(PromptRunner::new(
            Some(ScriptedClient::replying(reply)),
            fast_policy(),
        ))
    }

    #[tokio::test]
    async fn test_summary_is_parsed_and_trimmed() {
        let reply = r#"{"text": " A short summary. ", "key_points": [" one", "two ", "three"], "confidence": 0.8}"#;
        let payload = agent(reply).process("Some document").await.unwrap();
        match payload {
            AnalysisPayload::Summary(summary) => {
                assert_eq!(summary.text, "A short summary.");
                assert_eq!(summary.key_points, vec!["one", "two", "three"]);
                assert_eq!(summary.confidence, 0.8);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_too_few_key_points_is_malformed() {
        let reply = r#"{"text": "Summary", "key_points": ["one"], "confidence": 0.8}"#;
        let err = agent(reply).process("Some document").await.unwrap_err();
        assert!(matches!(err, TaskError::MalformedOutput(_)));
    }

    #[tokio::test]
    async fn test_confidence_out_of_range_is_malformed() {
        let reply = r#"{"text": "Summary", "key_points": ["a", "b", "c"], "confidence": 3}"#;
        let err = agent(reply).process("Some document").await.unwrap_err();
        assert!(matches!(err, TaskError::MalformedOutput(_)));
    }

    #[tokio::test]
    async fn test_empty_text_is_an_error() {
        let err = agent("{}").process("   ").await.unwrap_err();
        assert!(matches!(err, TaskError::Failed(_)));
    }
}
