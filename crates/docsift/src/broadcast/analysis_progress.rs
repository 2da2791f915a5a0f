//! Progress events for analysis jobs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::store::model::{JobStatus, TaskStatus};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    JobStarted,
    TaskFinished,
    JobFinished,
    JobFailed,
}

/// One observable step of an analysis job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisEvent {
    pub job_id: String,
    pub kind: EventKind,
    /// Job status after this step.
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_status: Option<TaskStatus>,
    /// Completed share of tasks, in percent.
    pub progress: f64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AnalysisEvent {
    pub fn new(job_id: &str, kind: EventKind, status: JobStatus, message: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            kind,
            status,
            task: None,
            task_status: None,
            progress: 0.0,
            message: message.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Fans analysis events out to any number of subscribers.
#[derive(Clone)]
pub struct ProgressBroadcaster {
    sender: Arc<broadcast::Sender<AnalysisEvent>>,
}

impl ProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: AnalysisEvent) {
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisEvent> {
        self.sender.subscribe()
    }

    /// Creates a tracker that stamps events with `job_id`.
    pub fn track(&self, job_id: &str) -> JobTracker {
        JobTracker {
            job_id: job_id.to_string(),
            sender: Arc::clone(&self.sender),
        }
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Emits the events of a single job.
pub struct JobTracker {
    job_id: String,
    sender: Arc<broadcast::Sender<AnalysisEvent>>,
}

impl JobTracker {
    fn send(&self, event: AnalysisEvent) {
        let _ = self.sender.send(event);
    }

    pub fn started(&self, task_count: usize) {
        self.send(AnalysisEvent::new(
            &self.job_id,
            EventKind::JobStarted,
            JobStatus::Processing,
            &format!("Running {} agents", task_count),
        ));
    }

    pub fn task_finished(
        &self,
        task: &str,
        task_status: TaskStatus,
        job_status: JobStatus,
        progress: f64,
    ) {
        let mut event = AnalysisEvent::new(
            &self.job_id,
            EventKind::TaskFinished,
            job_status,
            &format!("{} {}", task, task_status),
        );
        event.task = Some(task.to_string());
        event.task_status = Some(task_status);
        event.progress = progress;
        self.send(event);
    }

    pub fn finished(&self, status: JobStatus, progress: f64) {
        let mut event = AnalysisEvent::new(
            &self.job_id,
            EventKind::JobFinished,
            status,
            &format!("Analysis {}", status),
        );
        event.progress = progress;
        self.send(event);
    }

    pub fn failed(&self, reason: &str) {
        self.send(AnalysisEvent::new(
            &self.job_id,
            EventKind::JobFailed,
            JobStatus::Failed,
            reason,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_without_subscribers_is_fine() {
        let broadcaster = ProgressBroadcaster::default();
        broadcaster.track("job_1").failed("nobody listens");
    }

    #[tokio::test]
    async fn test_tracker_events_reach_subscribers() {
        let broadcaster = ProgressBroadcaster::new(16);
        let mut rx = broadcaster.subscribe();
        let tracker = broadcaster.track("job_1");

        tracker.started(2);
        tracker.task_finished("summarizer", TaskStatus::Completed, JobStatus::Processing, 50.0);
        tracker.finished(JobStatus::Partial, 50.0);

        let started = rx.recv().await.unwrap();
        assert_eq!(started.kind, EventKind::JobStarted);
        assert_eq!(started.job_id, "job_1");

        let task = rx.recv().await.unwrap();
        assert_eq!(task.task.as_deref(), Some("summarizer"));
        assert_eq!(task.task_status, Some(TaskStatus::Completed));
        assert_eq!(task.progress, 50.0);

        let finished = rx.recv().await.unwrap();
        assert_eq!(finished.kind, EventKind::JobFinished);
        assert_eq!(finished.message, "Analysis partial");
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let event = AnalysisEvent::new("job_1", EventKind::JobFailed, JobStatus::Failed, "boom");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["jobId"], "job_1");
        assert_eq!(json["kind"], "job_failed");
        assert!(json.get("task").is_none());
    }
}
