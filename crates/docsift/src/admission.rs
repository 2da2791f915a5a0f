//! Idempotent admission of analysis requests.
//!
//! Repeated requests for the same document must not start a second run while
//! one is in flight or after one has finished. The decision only looks at the
//! latest job for the document; [`crate::store::JobStore::admit`] makes the
//! lookup and the optional create a single critical section.

use serde::Serialize;

use crate::store::model::{Job, JobStatus};

/// What to do with a request, given the latest job's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionAction {
    /// Create a fresh pending job and schedule it.
    CreateNew,
    /// Reuse the pending job and schedule it again.
    Reschedule,
    /// Return the job as it is.
    ReturnExisting,
}

pub fn decide(latest: Option<JobStatus>) -> AdmissionAction {
    match latest {
        None | Some(JobStatus::Failed) => AdmissionAction::CreateNew,
        Some(JobStatus::Pending) => AdmissionAction::Reschedule,
        Some(JobStatus::Processing) | Some(JobStatus::Completed) | Some(JobStatus::Partial) => {
            AdmissionAction::ReturnExisting
        }
    }
}

/// Outcome of admitting a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "admission", content = "job", rename_all = "snake_case")]
pub enum Admission {
    Created(Job),
    Rescheduled(Job),
    Existing(Job),
}

impl Admission {
    pub fn job(&self) -> &Job {
        match self {
            Admission::Created(job) | Admission::Rescheduled(job) | Admission::Existing(job) => {
                job
            }
        }
    }

    pub fn into_job(self) -> Job {
        match self {
            Admission::Created(job) | Admission::Rescheduled(job) | Admission::Existing(job) => {
                job
            }
        }
    }

    /// Whether the caller should trigger orchestration for the job.
    pub fn should_schedule(&self) -> bool {
        !matches!(self, Admission::Existing(_))
    }

    pub fn message(&self) -> &'static str {
        match self {
            Admission::Created(_) | Admission::Rescheduled(_) => "Analysis started",
            Admission::Existing(job) => match job.status {
                JobStatus::Completed => "Analysis already completed",
                JobStatus::Partial => "Partial analysis previously completed",
                _ => "Analysis already in progress",
            },
        }
    }
}
