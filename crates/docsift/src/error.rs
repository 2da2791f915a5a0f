use std::path::PathBuf;
use thiserror::Error;

use crate::store::model::{JobStatus, TaskStatus};

#[derive(Error, Debug)]
pub enum DocsiftError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Orchestration error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("Logging error: {0}")]
    Logging(#[from] crate::logging::LoggingError),

    #[error("LLM client error: {0}")]
    Llm(#[from] crate::agent::llm::LlmError),

    #[error("Failed to render output: {0}")]
    Render(#[from] serde_json::Error),

    #[error("Failed to read input '{path}': {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Unknown agent '{0}'")]
    UnknownAgent(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {job_id} has no task named '{task}'")]
    UnknownTask { job_id: String, task: String },

    #[error("Job {job_id}: task '{task}' cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        task: String,
        from: TaskStatus,
        to: TaskStatus,
    },
}

/// Failure of a single analysis task.
///
/// These never escape the task envelope: they are normalized into an error
/// outcome and recorded on the job.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("Operation exceeded timeout of {seconds} seconds")]
    Timeout { seconds: f64 },

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Malformed output: {0}")]
    MalformedOutput(String),

    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    Failed(String),
}

impl crate::retry::Retryable for TaskError {
    fn is_retryable(&self) -> bool {
        matches!(self, TaskError::Timeout { .. } | TaskError::Transient(_))
    }
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("No text could be extracted for job {job_id}")]
    EmptyInput { job_id: String },

    #[error("Job {job_id} is already {status} and cannot be claimed")]
    AlreadyClaimed { job_id: String, status: JobStatus },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Uploaded file '{0}' is empty")]
    EmptyDocument(String),

    #[error("File '{filename}' is {size_bytes} bytes, limit is {limit_bytes} bytes")]
    TooLarge {
        filename: String,
        size_bytes: u64,
        limit_bytes: u64,
    },

    #[error("Timed out waiting for job {0} to finish")]
    WaitTimeout(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, DocsiftError>;
