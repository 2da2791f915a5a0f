//! Documents, jobs and their status lifecycles.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::AnalysisPayload;

// ─── Document ───────────────────────────────────────────────────────────────

/// An uploaded document and its extracted text. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub path: String,
    pub size_bytes: u64,
    pub upload_timestamp: DateTime<Utc>,
    pub content_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl Document {
    pub fn new(filename: &str, path: &str, size_bytes: u64, content_text: String) -> Self {
        Self {
            id: format!("doc_{}", Uuid::new_v4()),
            filename: filename.to_string(),
            path: path.to_string(),
            size_bytes,
            upload_timestamp: Utc::now(),
            content_text,
            mime_type: detect_mime_type(filename),
        }
    }
}

fn detect_mime_type(filename: &str) -> Option<String> {
    mime_guess::from_path(filename)
        .first()
        .map(|mime| mime.essence_str().to_string())
}

// ─── Statuses ───────────────────────────────────────────────────────────────

/// Lifecycle of one task within a job: `pending → processing → completed | failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Processing)
                | (TaskStatus::Processing, TaskStatus::Completed)
                | (TaskStatus::Processing, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Partial,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Partial
        )
    }

    /// Derives the job status from its task statuses.
    ///
    /// An empty task map is `pending`.
    pub fn derive(tasks: &BTreeMap<String, TaskStatus>) -> JobStatus {
        if tasks.is_empty() {
            return JobStatus::Pending;
        }

        let total = tasks.len();
        let completed = tasks
            .values()
            .filter(|s| **s == TaskStatus::Completed)
            .count();
        let failed = tasks.values().filter(|s| **s == TaskStatus::Failed).count();
        let pending = tasks
            .values()
            .filter(|s| **s == TaskStatus::Pending)
            .count();

        if completed == total {
            JobStatus::Completed
        } else if failed == total {
            JobStatus::Failed
        } else if completed + failed == total {
            JobStatus::Partial
        } else if pending == total {
            JobStatus::Pending
        } else {
            JobStatus::Processing
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Partial => "partial",
        };
        f.write_str(s)
    }
}

// ─── Results ────────────────────────────────────────────────────────────────

/// What a task left behind: its payload, or `{"error": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TaskResult {
    Error { error: String },
    Success(AnalysisPayload),
}

impl TaskResult {
    pub fn is_error(&self) -> bool {
        matches!(self, TaskResult::Error { .. })
    }
}

/// Terminal outcome of one task as handed to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskRecord {
    Completed(AnalysisPayload),
    Failed(String),
}

impl TaskRecord {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskRecord::Completed(_) => TaskStatus::Completed,
            TaskRecord::Failed(_) => TaskStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobMetadata {
    pub total_processing_time_seconds: f64,
    pub parallel_execution: bool,
    pub agents_completed: usize,
    pub agents_failed: usize,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_tasks: Vec<String>,
}

// ─── Job ────────────────────────────────────────────────────────────────────

/// One run of the configured task set against one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    pub document_id: String,
    pub status: JobStatus,
    pub task_status: BTreeMap<String, TaskStatus>,
    #[serde(default)]
    pub results: BTreeMap<String, TaskResult>,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_messages: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JobMetadata>,
}

impl Job {
    /// Creates a pending job with every task pending.
    pub fn new<S: AsRef<str>>(document_id: &str, task_names: &[S]) -> Self {
        Self {
            id: format!("job_{}", Uuid::new_v4()),
            document_id: document_id.to_string(),
            status: JobStatus::Pending,
            task_status: task_names
                .iter()
                .map(|name| (name.as_ref().to_string(), TaskStatus::Pending))
                .collect(),
            results: BTreeMap::new(),
            start_time: Utc::now(),
            end_time: None,
            error_messages: BTreeMap::new(),
            metadata: None,
        }
    }

    pub fn task_names(&self) -> Vec<String> {
        self.task_status.keys().cloned().collect()
    }

    pub fn count_tasks(&self, status: TaskStatus) -> usize {
        self.task_status.values().filter(|s| **s == status).count()
    }

    /// Whether the job reached a terminal status and was finalized.
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal() && self.end_time.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tasks(statuses: &[TaskStatus]) -> BTreeMap<String, TaskStatus> {
        statuses
            .iter()
            .enumerate()
            .map(|(i, s)| (format!("task_{}", i), *s))
            .collect()
    }

    #[test]
    fn test_derive_status() {
        use TaskStatus::*;
        assert_eq!(JobStatus::derive(&tasks(&[])), JobStatus::Pending);
        assert_eq!(JobStatus::derive(&tasks(&[Pending, Pending])), JobStatus::Pending);
        assert_eq!(
            JobStatus::derive(&tasks(&[Processing, Pending])),
            JobStatus::Processing
        );
        assert_eq!(
            JobStatus::derive(&tasks(&[Completed, Processing])),
            JobStatus::Processing
        );
        assert_eq!(
            JobStatus::derive(&tasks(&[Completed, Completed])),
            JobStatus::Completed
        );
        assert_eq!(JobStatus::derive(&tasks(&[Failed, Failed])), JobStatus::Failed);
        assert_eq!(
            JobStatus::derive(&tasks(&[Completed, Failed])),
            JobStatus::Partial
        );
    }

    #[test]
    fn test_task_transitions() {
        use TaskStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Processing));
    }

    #[test]
    fn test_new_job_ids_and_tasks() {
        let job = Job::new("doc_1", &["summarizer", "keyword_extractor"]);
        assert!(job.id.starts_with("job_"));
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.count_tasks(TaskStatus::Pending), 2);
        assert!(job.results.is_empty());
        assert!(!job.is_finished());
    }

    #[test]
    fn test_document_mime_detection() {
        let doc = Document::new("report.txt", "/tmp/report.txt", 12, "hello".to_string());
        assert!(doc.id.starts_with("doc_"));
        assert_eq!(doc.mime_type.as_deref(), Some("text/plain"));

        let unknown = Document::new("blob", "/tmp/blob", 1, "x".to_string());
        assert_eq!(unknown.mime_type, None);
    }

    #[test]
    fn test_error_result_serializes_as_object() {
        let result = TaskResult::Error {
            error: "boom".to_string(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "boom" }));
    }

    #[test]
    fn test_job_status_serialization() {
        let json = serde_json::to_string(&JobStatus::Partial).unwrap();
        assert_eq!(json, "\"partial\"");
    }
}
