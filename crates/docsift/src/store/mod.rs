pub mod job_store;
pub mod model;

pub use job_store::{Claim, JobStore};
pub use model::{
    Document, Job, JobMetadata, JobStatus, TaskRecord, TaskResult, TaskStatus,
};
