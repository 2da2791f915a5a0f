pub mod admission;
pub mod agent;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod progress;
pub mod retry;
pub mod secrets;
pub mod service;
pub mod store;

pub use admission::{Admission, AdmissionAction};
pub use agent::{AnalysisAgent, AnalysisPayload, ErrorType, TaskEnvelope, TaskOutcome};
pub use broadcast::{AnalysisEvent, EventKind, ProgressBroadcaster};
pub use config::{load_config, load_config_from_str, Config};
pub use error::{
    ConfigError, DocsiftError, OrchestratorError, Result, ServiceError, StoreError, TaskError,
};
pub use orchestrator::{AnalysisReport, Orchestrator};
pub use progress::calculate_progress;
pub use retry::{retry_with_backoff, RetryError, RetryPolicy, Retryable};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use service::{AnalysisService, AnalysisStatus, AnalysisTicket, AppContext, JobList};
pub use store::{Document, Job, JobStatus, JobStore, TaskStatus};
