//! Application wiring plus the trigger and read surface around the
//! orchestrator.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::admission::Admission;
use crate::agent::{build_agents, LlmClient, OpenAiClient, TaskEnvelope};
use crate::broadcast::ProgressBroadcaster;
use crate::config::Config;
use crate::error::{DocsiftError, OrchestratorError, Result, ServiceError};
use crate::orchestrator::{AnalysisReport, Orchestrator, ORCHESTRATOR_KEY};
use crate::progress::calculate_progress;
use crate::secrets::resolve_llm_api_key;
use crate::store::{Claim, Document, Job, JobStatus, JobStore, TaskStatus};

pub const DOCUMENT_NOT_FOUND_MESSAGE: &str = "Document not found.";

// ─── Views ──────────────────────────────────────────────────────────────────

/// Answer to an analysis request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnalysisTicket {
    pub job_id: String,
    pub document_id: String,
    pub status: JobStatus,
    pub message: String,
    /// Whether this request scheduled a run.
    pub scheduled: bool,
}

/// Polling view of one job.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnalysisStatus {
    pub job_id: String,
    pub document_id: String,
    pub status: JobStatus,
    pub task_status: BTreeMap<String, TaskStatus>,
    pub progress_percentage: f64,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl From<&Job> for AnalysisStatus {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            document_id: job.document_id.clone(),
            status: job.status,
            task_status: job.task_status.clone(),
            progress_percentage: calculate_progress(&job.task_status),
            start_time: job.start_time,
            end_time: job.end_time,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobListItem {
    pub job_id: String,
    pub document_id: String,
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobList {
    pub jobs: Vec<JobListItem>,
    pub total_count: usize,
}

// ─── AnalysisService ────────────────────────────────────────────────────────

pub struct AnalysisService {
    store: Arc<JobStore>,
    orchestrator: Arc<Orchestrator>,
    max_file_size_bytes: u64,
}

impl AnalysisService {
    pub fn new(store: Arc<JobStore>, orchestrator: Arc<Orchestrator>, max_file_size_bytes: u64) -> Self {
        Self {
            store,
            orchestrator,
            max_file_size_bytes,
        }
    }

    /// Stores an uploaded document and its extracted text.
    pub fn register_document(
        &self,
        filename: &str,
        path: &str,
        size_bytes: u64,
        text: String,
    ) -> std::result::Result<Document, ServiceError> {
        if size_bytes == 0 {
            return Err(ServiceError::EmptyDocument(filename.to_string()));
        }
        if size_bytes > self.max_file_size_bytes {
            return Err(ServiceError::TooLarge {
                filename: filename.to_string(),
                size_bytes,
                limit_bytes: self.max_file_size_bytes,
            });
        }

        let document = self
            .store
            .save_document(Document::new(filename, path, size_bytes, text));
        log::info!("Registered document {} ({})", document.id, document.filename);
        Ok(document)
    }

    /// Admits an analysis request and schedules a run when needed.
    pub fn request_analysis(
        self: &Arc<Self>,
        document_id: &str,
    ) -> std::result::Result<AnalysisTicket, ServiceError> {
        if self.store.get_document(document_id).is_none() {
            return Err(ServiceError::DocumentNotFound(document_id.to_string()));
        }

        let admission = self
            .store
            .admit(document_id, &self.orchestrator.task_names());
        let scheduled = admission.should_schedule();
        let message = admission.message().to_string();

        if scheduled {
            self.spawn_analysis(admission.job().id.clone(), document_id.to_string());
        } else if let Admission::Existing(job) = &admission {
            log::debug!("Job {} for document {} is already {}", job.id, document_id, job.status);
        }

        let job = admission.into_job();
        Ok(AnalysisTicket {
            job_id: job.id,
            document_id: job.document_id,
            status: job.status,
            message,
            scheduled,
        })
    }

    /// Runs [`run_analysis`](Self::run_analysis) in the background.
    pub fn spawn_analysis(
        self: &Arc<Self>,
        job_id: String,
        document_id: String,
    ) -> JoinHandle<Result<AnalysisReport>> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let result = service.run_analysis(&job_id, &document_id).await;
            match &result {
                Ok(report) => log::info!("Job {} ended as {}", report.job_id(), report.status()),
                Err(e) => log::warn!("Background analysis for job {} ended with: {}", job_id, e),
            }
            result
        })
    }

    /// Resolves the document and runs the orchestrator on its text.
    ///
    /// A missing document fails the job under the `orchestrator` key.
    pub async fn run_analysis(&self, job_id: &str, document_id: &str) -> Result<AnalysisReport> {
        let Some(document) = self.store.get_document(document_id) else {
            match self
                .store
                .fail_job(job_id, ORCHESTRATOR_KEY, DOCUMENT_NOT_FOUND_MESSAGE)?
            {
                Claim::Claimed(_) => self
                    .orchestrator
                    .progress()
                    .track(job_id)
                    .failed(DOCUMENT_NOT_FOUND_MESSAGE),
                Claim::NotPending(status) => {
                    log::warn!("Document {} is gone but job {} is already {}", document_id, job_id, status)
                }
            }
            return Err(ServiceError::DocumentNotFound(document_id.to_string()).into());
        };

        match self
            .orchestrator
            .analyze(job_id, document_id, &document.content_text)
            .await
        {
            Ok(report) => Ok(report),
            Err(OrchestratorError::Store(e)) => {
                match self.store.fail_job(job_id, ORCHESTRATOR_KEY, &e.to_string()) {
                    Ok(Claim::Claimed(_)) => {}
                    Ok(Claim::NotPending(status)) => {
                        log::error!("Job {} stays {} after store error: {}", job_id, status, e)
                    }
                    Err(fail_err) => {
                        log::error!("Could not mark job {} as failed: {}", job_id, fail_err)
                    }
                }
                Err(DocsiftError::Orchestrator(OrchestratorError::Store(e)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn job(&self, job_id: &str) -> std::result::Result<Job, ServiceError> {
        self.store
            .get_job(job_id)
            .ok_or_else(|| ServiceError::JobNotFound(job_id.to_string()))
    }

    pub fn status(&self, job_id: &str) -> std::result::Result<AnalysisStatus, ServiceError> {
        self.job(job_id).map(|job| AnalysisStatus::from(&job))
    }

    /// Status of the latest job for a document.
    pub fn document_status(
        &self,
        document_id: &str,
    ) -> std::result::Result<AnalysisStatus, ServiceError> {
        self.store
            .get_latest_job_for_document(document_id)
            .map(|job| AnalysisStatus::from(&job))
            .ok_or_else(|| ServiceError::DocumentNotFound(document_id.to_string()))
    }

    pub fn list_jobs(&self) -> JobList {
        let jobs: Vec<JobListItem> = self
            .store
            .get_all_jobs()
            .into_iter()
            .map(|job| JobListItem {
                job_id: job.id,
                document_id: job.document_id,
                status: job.status,
                start_time: job.start_time,
                end_time: job.end_time,
            })
            .collect();
        JobList {
            total_count: jobs.len(),
            jobs,
        }
    }

    /// Polls until the job is finalized or `timeout` elapses.
    pub async fn wait_for_completion(
        &self,
        job_id: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> std::result::Result<Job, ServiceError> {
        let poll = async {
            loop {
                let job = self.job(job_id)?;
                if job.is_finished() {
                    return Ok::<Job, ServiceError>(job);
                }
                tokio::time::sleep(poll_interval).await;
            }
        };
        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| ServiceError::WaitTimeout(job_id.to_string()))?
    }
}

// ─── AppContext ─────────────────────────────────────────────────────────────

/// Everything a process needs, built once from configuration.
pub struct AppContext {
    pub config: Arc<Config>,
    pub store: Arc<JobStore>,
    pub progress: ProgressBroadcaster,
    pub orchestrator: Arc<Orchestrator>,
    pub service: Arc<AnalysisService>,
}

impl AppContext {
    /// Builds the context, connecting to the configured LLM provider when an
    /// API key is available.
    pub fn from_config(config: Config) -> Result<Self> {
        let client: Option<Arc<dyn LlmClient>> = match resolve_llm_api_key(&config.llm)? {
            Some(key) => Some(Arc::new(OpenAiClient::new(&config.llm, key)?)),
            None => None,
        };
        Self::with_client(config, client)
    }

    /// Builds the context around an explicit LLM client.
    pub fn with_client(config: Config, client: Option<Arc<dyn LlmClient>>) -> Result<Self> {
        let agents = build_agents(&config, client)?;
        let store = Arc::new(JobStore::new());
        let progress = ProgressBroadcaster::default();
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store),
            agents,
            TaskEnvelope::new(config.agent_timeout()),
            progress.clone(),
        ));
        let service = Arc::new(AnalysisService::new(
            Arc::clone(&store),
            Arc::clone(&orchestrator),
            config.max_file_size_bytes(),
        ));

        log::info!(
            "Analysis context ready with agents: {}",
            orchestrator.task_names().join(", ")
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            progress,
            orchestrator,
            service,
        })
    }
}
