pub mod decode;
pub mod entities;
pub mod envelope;
pub mod keywords;
pub mod llm;
pub mod sentiment;
pub mod summarizer;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::schema::{
    Config, ENTITY_EXTRACTOR, KEYWORD_EXTRACTOR, SENTIMENT_ANALYZER, SUMMARIZER,
};
use crate::error::{ConfigError, TaskError};
use crate::progress::round_to;

pub use entities::{EntityExtractorAgent, EntityResult};
pub use envelope::{ErrorType, TaskEnvelope, TaskOutcome};
pub use keywords::{KeywordExtractorAgent, KeywordResult};
pub use llm::{ChatRequest, LlmClient, LlmError, OpenAiClient, PromptRunner};
pub use sentiment::{SentimentAnalyzerAgent, SentimentResult};
pub use summarizer::{SummarizerAgent, SummaryResult};

/// One independent analysis over a document's text.
///
/// Implementations return errors instead of panicking; the envelope
/// normalizes both anyway.
#[async_trait]
pub trait AnalysisAgent: Send + Sync {
    fn name(&self) -> &str;
    async fn process(&self, text: &str) -> Result<AnalysisPayload, TaskError>;
}

/// Typed output of one agent. Serialized without a tag: the job's result map
/// is keyed by agent name already.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AnalysisPayload {
    Summary(SummaryResult),
    Entities(EntityResult),
    Sentiment(SentimentResult),
    Keywords(KeywordResult),
}

impl AnalysisPayload {
    /// Checks the payload's invariants; violations are malformed output.
    pub fn validate(&self) -> Result<(), TaskError> {
        match self {
            AnalysisPayload::Summary(summary) => summary.validate(),
            AnalysisPayload::Entities(entities) => entities.validate(),
            AnalysisPayload::Sentiment(sentiment) => sentiment.validate(),
            AnalysisPayload::Keywords(keywords) => keywords.validate(),
        }
    }
}

/// Builds the configured agents in configuration order.
pub fn build_agents(
    config: &Config,
    client: Option<Arc<dyn LlmClient>>,
) -> Result<Vec<Arc<dyn AnalysisAgent>>, ConfigError> {
    let runner = PromptRunner::new(client, config.retry_policy());
    if !runner.has_client() {
        log::warn!("No LLM client configured; every agent will fail until credentials are set");
    }

    config
        .agents
        .iter()
        .map(|name| -> Result<Arc<dyn AnalysisAgent>, ConfigError> {
            let agent: Arc<dyn AnalysisAgent> = match name.as_str() {
                SUMMARIZER => Arc::new(SummarizerAgent::new(runner.clone())),
                ENTITY_EXTRACTOR => Arc::new(EntityExtractorAgent::new(runner.clone())),
                SENTIMENT_ANALYZER => Arc::new(SentimentAnalyzerAgent::new(runner.clone())),
                KEYWORD_EXTRACTOR => Arc::new(KeywordExtractorAgent::new(runner.clone())),
                other => return Err(ConfigError::UnknownAgent(other.to_string())),
            };
            Ok(agent)
        })
        .collect()
}

/// Seconds since `start`, rounded to four decimals.
pub(crate) fn elapsed_secs(start: Instant) -> f64 {
    round_to(start.elapsed().as_secs_f64(), 4)
}

pub(crate) fn check_unit_interval(field: &str, value: f64) -> Result<(), TaskError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(TaskError::MalformedOutput(format!(
            "{} must be between 0 and 1, got {}",
            field, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_agents_in_config_order() {
        let config = Config {
            agents: vec![KEYWORD_EXTRACTOR.to_string(), SUMMARIZER.to_string()],
            ..Config::default()
        };
        let agents = build_agents(&config, None).unwrap();
        let names: Vec<&str> = agents.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["keyword_extractor", "summarizer"]);
    }

    #[test]
    fn test_build_agents_rejects_unknown() {
        let config = Config {
            agents: vec!["translator".to_string()],
            ..Config::default()
        };
        assert!(matches!(
            build_agents(&config, None),
            Err(ConfigError::UnknownAgent(_))
        ));
    }

    #[test]
    fn test_check_unit_interval() {
        assert!(check_unit_interval("confidence", 0.0).is_ok());
        assert!(check_unit_interval("confidence", 1.0).is_ok());
        assert!(check_unit_interval("confidence", 1.2).is_err());
        assert!(check_unit_interval("confidence", f64::NAN).is_err());
    }
}
