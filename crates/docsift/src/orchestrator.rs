//! Fan-out/fan-in execution of the configured agents for one job.
//!
//! Every agent runs as its own spawned unit with its own result channel. A
//! failing unit never cancels its siblings. Each outcome is written to the
//! store as soon as it arrives, so pollers see progress before the job ends.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info_span, Instrument};

use crate::agent::{AnalysisAgent, TaskEnvelope, TaskOutcome};
use crate::broadcast::{JobTracker, ProgressBroadcaster};
use crate::error::{OrchestratorError, StoreError};
use crate::progress::{calculate_progress, round_to};
use crate::store::{
    Claim, Job, JobMetadata, JobStatus, JobStore, TaskRecord, TaskResult, TaskStatus,
};

/// Key under which job-level failures are recorded in `error_messages`.
pub const ORCHESTRATOR_KEY: &str = "orchestrator";

pub const EMPTY_TEXT_MESSAGE: &str = "No text could be extracted from the uploaded file.";

pub const PARTIAL_WARNING: &str = "Some tasks failed to complete";

// ─── Reports ────────────────────────────────────────────────────────────────

/// Final result of a run in which every task completed.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompleteAnalysis {
    pub job_id: String,
    pub document_id: String,
    pub document_name: String,
    pub status: JobStatus,
    pub results: BTreeMap<String, TaskResult>,
    pub metadata: JobMetadata,
}

/// Final result of a run in which at least one task failed.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PartialAnalysis {
    pub job_id: String,
    pub document_id: String,
    pub document_name: String,
    pub status: JobStatus,
    pub results: BTreeMap<String, TaskResult>,
    pub metadata: JobMetadata,
    pub failed_tasks: Vec<String>,
    pub error_messages: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum AnalysisReport {
    Complete(CompleteAnalysis),
    Partial(PartialAnalysis),
}

impl AnalysisReport {
    fn from_job(job: Job, document_name: String, metadata: JobMetadata) -> Self {
        if metadata.failed_tasks.is_empty() {
            AnalysisReport::Complete(CompleteAnalysis {
                job_id: job.id,
                document_id: job.document_id,
                document_name,
                status: job.status,
                results: job.results,
                metadata,
            })
        } else {
            AnalysisReport::Partial(PartialAnalysis {
                job_id: job.id,
                document_id: job.document_id,
                document_name,
                status: job.status,
                results: job.results,
                failed_tasks: metadata.failed_tasks.clone(),
                metadata,
                error_messages: job.error_messages,
            })
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            AnalysisReport::Complete(r) => &r.job_id,
            AnalysisReport::Partial(r) => &r.job_id,
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            AnalysisReport::Complete(r) => r.status,
            AnalysisReport::Partial(r) => r.status,
        }
    }

    pub fn results(&self) -> &BTreeMap<String, TaskResult> {
        match self {
            AnalysisReport::Complete(r) => &r.results,
            AnalysisReport::Partial(r) => &r.results,
        }
    }

    pub fn metadata(&self) -> &JobMetadata {
        match self {
            AnalysisReport::Complete(r) => &r.metadata,
            AnalysisReport::Partial(r) => &r.metadata,
        }
    }

    pub fn failed_tasks(&self) -> &[String] {
        match self {
            AnalysisReport::Complete(_) => &[],
            AnalysisReport::Partial(r) => &r.failed_tasks,
        }
    }
}

// ─── Orchestrator ───────────────────────────────────────────────────────────

pub struct Orchestrator {
    store: Arc<JobStore>,
    agents: Vec<Arc<dyn AnalysisAgent>>,
    envelope: TaskEnvelope,
    progress: ProgressBroadcaster,
}

impl Orchestrator {
    pub fn new(
        store: Arc<JobStore>,
        agents: Vec<Arc<dyn AnalysisAgent>>,
        envelope: TaskEnvelope,
        progress: ProgressBroadcaster,
    ) -> Self {
        Self {
            store,
            agents,
            envelope,
            progress,
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn progress(&self) -> &ProgressBroadcaster {
        &self.progress
    }

    /// Names of the configured agents, in configuration order.
    pub fn task_names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name().to_string()).collect()
    }

    /// Runs every task of `job_id` against `text` and finalizes the job.
    ///
    /// Empty text fails the job without starting any task. A job that is not
    /// `pending` is left alone, so a job scheduled twice only runs once.
    pub async fn analyze(
        &self,
        job_id: &str,
        document_id: &str,
        text: &str,
    ) -> Result<AnalysisReport, OrchestratorError> {
        let span = info_span!("analysis", job_id = %job_id, document_id = %document_id);
        self.run(job_id, document_id, text).instrument(span).await
    }

    /// Runs [`analyze`](Self::analyze) detached from the caller.
    pub fn spawn(
        self: &Arc<Self>,
        job_id: String,
        document_id: String,
        text: String,
    ) -> JoinHandle<Result<AnalysisReport, OrchestratorError>> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let result = orchestrator.analyze(&job_id, &document_id, &text).await;
            if let Err(e) = &result {
                log::warn!("Analysis for job {} did not run: {}", job_id, e);
            }
            result
        })
    }

    async fn run(
        &self,
        job_id: &str,
        document_id: &str,
        text: &str,
    ) -> Result<AnalysisReport, OrchestratorError> {
        let tracker = self.progress.track(job_id);

        if text.trim().is_empty() {
            return match self
                .store
                .fail_job(job_id, ORCHESTRATOR_KEY, EMPTY_TEXT_MESSAGE)?
            {
                Claim::Claimed(_) => {
                    tracker.failed(EMPTY_TEXT_MESSAGE);
                    Err(OrchestratorError::EmptyInput {
                        job_id: job_id.to_string(),
                    })
                }
                Claim::NotPending(status) => Err(OrchestratorError::AlreadyClaimed {
                    job_id: job_id.to_string(),
                    status,
                }),
            };
        }

        let job = match self.store.begin_processing(job_id)? {
            Claim::Claimed(job) => job,
            Claim::NotPending(status) => {
                return Err(OrchestratorError::AlreadyClaimed {
                    job_id: job_id.to_string(),
                    status,
                })
            }
        };

        let started = Instant::now();
        let task_names = job.task_names();
        log::info!("Starting {} agents for job {}", task_names.len(), job_id);
        tracker.started(task_names.len());

        let text: Arc<str> = Arc::from(text);
        let mut pending = FuturesUnordered::new();

        for name in task_names {
            let Some(agent) = self.agents.iter().find(|a| a.name() == name).cloned() else {
                let reason = format!("No agent registered for task '{}'", name);
                self.record(job_id, &name, TaskRecord::Failed(reason), &tracker);
                continue;
            };

            let (tx, rx) = oneshot::channel::<TaskOutcome>();
            let envelope = self.envelope.clone();
            let text = Arc::clone(&text);
            tokio::spawn(
                async move {
                    let outcome = envelope.execute(agent.as_ref(), &text).await;
                    // The receiver only goes away if the run itself was dropped
                    let _ = tx.send(outcome);
                }
                .in_current_span(),
            );
            pending.push(async move { (name, rx.await) });
        }

        while let Some((name, received)) = pending.next().await {
            let record = match received {
                Ok(TaskOutcome::Success { data, .. }) => TaskRecord::Completed(data),
                Ok(TaskOutcome::Error { message, .. }) => TaskRecord::Failed(message),
                Err(_) => {
                    TaskRecord::Failed(format!("{} stopped without reporting a result", name))
                }
            };
            self.record(job_id, &name, record, &tracker);
        }

        let snapshot = self
            .store
            .get_job(job_id)
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        let failed_tasks: Vec<String> = snapshot
            .task_status
            .iter()
            .filter(|(_, status)| **status == TaskStatus::Failed)
            .map(|(name, _)| name.clone())
            .collect();
        let metadata = JobMetadata {
            total_processing_time_seconds: round_to(started.elapsed().as_secs_f64(), 4),
            parallel_execution: true,
            agents_completed: snapshot.count_tasks(TaskStatus::Completed),
            agents_failed: failed_tasks.len(),
            timestamp: Utc::now(),
            warning: (!failed_tasks.is_empty()).then(|| PARTIAL_WARNING.to_string()),
            failed_tasks,
        };

        let job = self.store.finalize_job(job_id, metadata.clone())?;
        tracker.finished(job.status, calculate_progress(&job.task_status));
        log::info!(
            "Job {} finished as {} in {:.3}s ({} completed, {} failed)",
            job_id,
            job.status,
            metadata.total_processing_time_seconds,
            metadata.agents_completed,
            metadata.agents_failed
        );

        let document_name = self
            .store
            .get_document(document_id)
            .map(|doc| doc.filename)
            .unwrap_or_else(|| document_id.to_string());

        Ok(AnalysisReport::from_job(job, document_name, metadata))
    }

    fn record(&self, job_id: &str, task: &str, record: TaskRecord, tracker: &JobTracker) {
        let task_status = record.status();
        match self.store.record_task_outcome(job_id, task, record) {
            Ok(job) => tracker.task_finished(
                task,
                task_status,
                job.status,
                calculate_progress(&job.task_status),
            ),
            Err(e) => log::error!(
                "Failed to record outcome of {} for job {}: {}",
                task,
                job_id,
                e
            ),
        }
    }
}
