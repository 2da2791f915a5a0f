//! Builder patterns for creating test data programmatically.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use docsift::agent::{AnalysisAgent, AnalysisPayload, KeywordResult};
use docsift::config::schema::{Config, RetryConfig};
use docsift::TaskError;

/// Builder for creating `Config` instances.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn agents(mut self, agents: &[&str]) -> Self {
        self.config.agents = agents.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn agent_timeout_secs(mut self, seconds: f64) -> Self {
        self.config.agent_timeout_secs = seconds;
        self
    }

    pub fn max_file_size_mb(mut self, mb: u64) -> Self {
        self.config.max_file_size_mb = mb;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// How a scripted agent behaves when run.
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    Fail(String),
    Hang,
    Panic,
}

/// Agent with a fixed name, delay and behavior that counts its runs.
pub struct ScriptedAgent {
    name: String,
    delay: Duration,
    behavior: Behavior,
    runs: AtomicU32,
}

impl ScriptedAgent {
    pub fn new(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            delay: Duration::ZERO,
            behavior,
            runs: AtomicU32::new(0),
        }
    }

    pub fn succeeding(name: &str) -> Arc<Self> {
        Arc::new(Self::new(name, Behavior::Succeed))
    }

    pub fn failing(name: &str, message: &str) -> Arc<Self> {
        Arc::new(Self::new(name, Behavior::Fail(message.to_string())))
    }

    pub fn hanging(name: &str) -> Arc<Self> {
        Arc::new(Self::new(name, Behavior::Hang))
    }

    pub fn with_delay(mut self, delay: Duration) -> Arc<Self> {
        self.delay = delay;
        Arc::new(self)
    }

    pub fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisAgent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, _text: &str) -> Result<AnalysisPayload, TaskError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match &self.behavior {
            Behavior::Succeed => Ok(AnalysisPayload::Keywords(KeywordResult::defaults(0.0))),
            Behavior::Fail(message) => Err(TaskError::Failed(message.clone())),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Err(TaskError::Failed("woke up".to_string()))
            }
            Behavior::Panic => panic!("{} blew up", self.name),
        }
    }
}

/// Upcasts scripted agents for the orchestrator.
pub fn as_agents(agents: &[Arc<ScriptedAgent>]) -> Vec<Arc<dyn AnalysisAgent>> {
    agents
        .iter()
        .map(|a| Arc::clone(a) as Arc<dyn AnalysisAgent>)
        .collect()
}
