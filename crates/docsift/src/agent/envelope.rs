//! Uniform execution wrapper around an agent run.
//!
//! The envelope enforces a wall-clock ceiling that covers every retry the
//! agent makes, and turns whatever happens (success, error, timeout, panic,
//! invalid payload) into a [`TaskOutcome`]. `execute` itself never fails.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};

use super::{AnalysisAgent, AnalysisPayload};
use crate::error::TaskError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Timeout,
    Exception,
}

/// Normalized result of one agent run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Success {
        agent: String,
        data: AnalysisPayload,
        timestamp: DateTime<Utc>,
    },
    Error {
        agent: String,
        error_type: ErrorType,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl TaskOutcome {
    pub fn success(agent: &str, data: AnalysisPayload) -> Self {
        TaskOutcome::Success {
            agent: agent.to_string(),
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn error(agent: &str, error_type: ErrorType, message: impl Into<String>) -> Self {
        TaskOutcome::Error {
            agent: agent.to_string(),
            error_type,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn agent(&self) -> &str {
        match self {
            TaskOutcome::Success { agent, .. } | TaskOutcome::Error { agent, .. } => agent,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success { .. })
    }
}

#[derive(Debug, Clone)]
pub struct TaskEnvelope {
    timeout: Duration,
}

impl TaskEnvelope {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn execute(&self, agent: &dyn AnalysisAgent, text: &str) -> TaskOutcome {
        let name = agent.name().to_string();
        let start = Instant::now();

        let guarded = AssertUnwindSafe(agent.process(text)).catch_unwind();
        let outcome = match tokio::time::timeout(self.timeout, guarded).await {
            Err(_) => {
                let err = TaskError::Timeout {
                    seconds: self.timeout.as_secs_f64(),
                };
                TaskOutcome::error(&name, ErrorType::Timeout, err.to_string())
            }
            Ok(Err(panic)) => TaskOutcome::error(
                &name,
                ErrorType::Exception,
                format!("{} panicked: {}", name, panic_message(panic.as_ref())),
            ),
            Ok(Ok(Err(err))) => {
                let error_type = match err {
                    TaskError::Timeout { .. } => ErrorType::Timeout,
                    _ => ErrorType::Exception,
                };
                TaskOutcome::error(&name, error_type, err.to_string())
            }
            Ok(Ok(Ok(payload))) => match payload.validate() {
                Ok(()) => TaskOutcome::success(&name, payload),
                Err(err) => TaskOutcome::error(&name, ErrorType::Exception, err.to_string()),
            },
        };

        let elapsed = start.elapsed().as_secs_f64();
        match &outcome {
            TaskOutcome::Success { .. } => {
                log::info!("Agent {} completed in {:.3}s", name, elapsed);
            }
            TaskOutcome::Error { message, .. } => {
                log::warn!("Agent {} failed after {:.3}s: {}", name, elapsed, message);
            }
        }
        outcome
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
