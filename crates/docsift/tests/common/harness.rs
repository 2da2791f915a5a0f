//! Test harness for isolated analysis runs.
//!
//! The `TestHarness` owns a temporary directory for input documents and
//! config files, and a fully wired store, orchestrator and service.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use docsift::agent::{AnalysisAgent, TaskEnvelope};
use docsift::config::schema::Config;
use docsift::store::{Document, Job};
use docsift::{AnalysisService, JobStore, Orchestrator, ProgressBroadcaster};

pub struct TestHarness {
    temp_dir: TempDir,
    pub store: Arc<JobStore>,
    pub progress: ProgressBroadcaster,
    pub orchestrator: Arc<Orchestrator>,
    pub service: Arc<AnalysisService>,
}

impl TestHarness {
    /// Create a harness around the given agents and envelope timeout.
    pub fn new(agents: Vec<Arc<dyn AnalysisAgent>>, timeout: Duration) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(JobStore::new());
        let progress = ProgressBroadcaster::default();
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store),
            agents,
            TaskEnvelope::new(timeout),
            progress.clone(),
        ));
        let service = Arc::new(AnalysisService::new(
            Arc::clone(&store),
            Arc::clone(&orchestrator),
            10 * 1024 * 1024,
        ));

        Self {
            temp_dir,
            store,
            progress,
            orchestrator,
            service,
        }
    }

    /// Write a text document to the temp directory and register it.
    pub fn add_document(&self, filename: &str, text: &str) -> Document {
        let path = self.temp_dir.path().join(filename);
        std::fs::write(&path, text).expect("Failed to write input file");
        self.service
            .register_document(
                filename,
                &path.display().to_string(),
                text.len() as u64,
                text.to_string(),
            )
            .expect("Failed to register document")
    }

    /// Write a config file to the temp directory.
    pub fn write_config(&self, filename: &str, config: &Config) -> PathBuf {
        let path = self.temp_dir.path().join(filename);
        let json = serde_json::to_string_pretty(config).expect("Failed to serialize config");
        std::fs::write(&path, json).expect("Failed to write config file");
        path
    }

    /// Request analysis of `document_id` and wait for the job to finish.
    pub async fn analyze_and_wait(&self, document_id: &str) -> Job {
        let ticket = self
            .service
            .request_analysis(document_id)
            .expect("Failed to request analysis");
        self.service
            .wait_for_completion(&ticket.job_id, Duration::from_millis(10), Duration::from_secs(120))
            .await
            .expect("Job did not finish")
    }
}
