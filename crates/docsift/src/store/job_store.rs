//! In-memory document and job store.
//!
//! Every public operation takes the lock once, so each one is an atomic
//! read-modify-write. Task updates merge into a job's maps instead of
//! replacing the job. The lock is never held across an `.await`.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use crate::admission::{self, Admission, AdmissionAction};
use crate::error::StoreError;
use crate::store::model::{
    Document, Job, JobMetadata, JobStatus, TaskRecord, TaskResult, TaskStatus,
};

/// Result of trying to move a job from `pending` to `processing`.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    Claimed(Job),
    NotPending(JobStatus),
}

#[derive(Default)]
struct StoreState {
    documents: HashMap<String, Document>,
    jobs: HashMap<String, Job>,
    /// Job ids in creation order, used to break start-time ties.
    job_order: Vec<String>,
}

impl StoreState {
    fn job_mut(&mut self, job_id: &str) -> Result<&mut Job, StoreError> {
        self.jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))
    }

    fn insert_job(&mut self, job: Job) {
        self.job_order.push(job.id.clone());
        self.jobs.insert(job.id.clone(), job);
    }

    fn latest_job_for(&self, document_id: &str) -> Option<&Job> {
        self.job_order
            .iter()
            .enumerate()
            .filter_map(|(seq, id)| self.jobs.get(id).map(|job| (seq, job)))
            .filter(|(_, job)| job.document_id == document_id)
            .max_by_key(|(seq, job)| (job.start_time, *seq))
            .map(|(_, job)| job)
    }
}

// ─── JobStore ───────────────────────────────────────────────────────────────

/// Shared store for documents and jobs. Wrap in an `Arc` to share.
#[derive(Default)]
pub struct JobStore {
    state: RwLock<StoreState>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    // ─── Documents ──────────────────────────────────────────────────────────

    pub fn save_document(&self, document: Document) -> Document {
        let mut state = self.write();
        state
            .documents
            .insert(document.id.clone(), document.clone());
        log::debug!("Saved document {} ({})", document.id, document.filename);
        document
    }

    pub fn get_document(&self, document_id: &str) -> Option<Document> {
        self.read().documents.get(document_id).cloned()
    }

    // ─── Job reads ──────────────────────────────────────────────────────────

    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        self.read().jobs.get(job_id).cloned()
    }

    /// The most recently started job for a document.
    pub fn get_latest_job_for_document(&self, document_id: &str) -> Option<Job> {
        self.read().latest_job_for(document_id).cloned()
    }

    /// All jobs, newest first.
    pub fn get_all_jobs(&self) -> Vec<Job> {
        let state = self.read();
        let mut jobs: Vec<(usize, Job)> = state
            .job_order
            .iter()
            .enumerate()
            .filter_map(|(seq, id)| state.jobs.get(id).map(|job| (seq, job.clone())))
            .collect();
        jobs.sort_by(|(seq_a, a), (seq_b, b)| {
            b.start_time.cmp(&a.start_time).then(seq_b.cmp(seq_a))
        });
        jobs.into_iter().map(|(_, job)| job).collect()
    }

    // ─── Job writes ─────────────────────────────────────────────────────────

    /// Creates a pending job with every task pending.
    pub fn create_job<S: AsRef<str>>(&self, document_id: &str, task_names: &[S]) -> Job {
        let job = Job::new(document_id, task_names);
        self.write().insert_job(job.clone());
        log::debug!("Created job {} for document {}", job.id, document_id);
        job
    }

    /// Looks up the latest job for a document and creates a new one when
    /// needed, under one write lock.
    pub fn admit<S: AsRef<str>>(&self, document_id: &str, task_names: &[S]) -> Admission {
        let mut state = self.write();
        let latest = state.latest_job_for(document_id).cloned();

        match (admission::decide(latest.as_ref().map(|j| j.status)), latest) {
            (AdmissionAction::Reschedule, Some(job)) => Admission::Rescheduled(job),
            (AdmissionAction::ReturnExisting, Some(job)) => Admission::Existing(job),
            _ => {
                let job = Job::new(document_id, task_names);
                state.insert_job(job.clone());
                log::debug!("Admitted new job {} for document {}", job.id, document_id);
                Admission::Created(job)
            }
        }
    }

    /// Moves a pending job and all of its tasks to `processing`.
    ///
    /// A job in any other status is left untouched.
    pub fn begin_processing(&self, job_id: &str) -> Result<Claim, StoreError> {
        let mut state = self.write();
        let job = state.job_mut(job_id)?;

        if job.status != JobStatus::Pending {
            return Ok(Claim::NotPending(job.status));
        }

        for status in job.task_status.values_mut() {
            *status = TaskStatus::Processing;
        }
        job.status = JobStatus::derive(&job.task_status);
        Ok(Claim::Claimed(job.clone()))
    }

    /// Records the terminal outcome of one task and re-derives the job status.
    pub fn record_task_outcome(
        &self,
        job_id: &str,
        task: &str,
        record: TaskRecord,
    ) -> Result<Job, StoreError> {
        let mut state = self.write();
        let job = state.job_mut(job_id)?;

        let current = *job
            .task_status
            .get(task)
            .ok_or_else(|| StoreError::UnknownTask {
                job_id: job_id.to_string(),
                task: task.to_string(),
            })?;
        let next = record.status();
        if !current.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                job_id: job_id.to_string(),
                task: task.to_string(),
                from: current,
                to: next,
            });
        }

        job.task_status.insert(task.to_string(), next);
        match record {
            TaskRecord::Completed(payload) => {
                job.results
                    .insert(task.to_string(), TaskResult::Success(payload));
            }
            TaskRecord::Failed(message) => {
                job.results.insert(
                    task.to_string(),
                    TaskResult::Error {
                        error: message.clone(),
                    },
                );
                job.error_messages.insert(task.to_string(), message);
            }
        }
        job.status = JobStatus::derive(&job.task_status);
        Ok(job.clone())
    }

    /// Writes the final status, metadata and end time in one step.
    pub fn finalize_job(&self, job_id: &str, metadata: JobMetadata) -> Result<Job, StoreError> {
        let mut state = self.write();
        let job = state.job_mut(job_id)?;

        job.status = JobStatus::derive(&job.task_status);
        job.metadata = Some(metadata);
        job.end_time = Some(Utc::now());
        Ok(job.clone())
    }

    /// Fails a pending job with a message stored under `key`.
    ///
    /// Same compare-and-set as [`begin_processing`](Self::begin_processing):
    /// a job that is not `pending` is left untouched. Task statuses are not
    /// touched either; this is the only write that sets the job status
    /// without deriving it.
    pub fn fail_job(&self, job_id: &str, key: &str, reason: &str) -> Result<Claim, StoreError> {
        let mut state = self.write();
        let job = state.job_mut(job_id)?;

        if job.status != JobStatus::Pending {
            return Ok(Claim::NotPending(job.status));
        }

        job.status = JobStatus::Failed;
        job.error_messages
            .insert(key.to_string(), reason.to_string());
        job.end_time = Some(Utc::now());
        log::warn!("Job {} failed: {}", job_id, reason);
        Ok(Claim::Claimed(job.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::keywords::KeywordResult;
    use crate::agent::AnalysisPayload;
    use std::sync::Arc;

    const TASKS: [&str; 2] = ["keyword_extractor", "summarizer"];

    fn keywords() -> AnalysisPayload {
        AnalysisPayload::Keywords(KeywordResult {
            keywords: vec!["a", "b", "c", "d", "e"]
                .into_iter()
                .map(String::from)
                .collect(),
            processing_time: 0.1,
        })
    }

    #[test]
    fn test_save_and_get_document() {
        let store = JobStore::new();
        let doc = store.save_document(Document::new("a.txt", "/tmp/a.txt", 3, "abc".into()));
        assert_eq!(store.get_document(&doc.id), Some(doc));
        assert!(store.get_document("doc_missing").is_none());
    }

    #[test]
    fn test_create_and_get_job() {
        let store = JobStore::new();
        let job = store.create_job("doc_1", &TASKS);
        let fetched = store.get_job(&job.id).unwrap();
        assert_eq!(fetched.status, JobStatus::Pending);
        assert_eq!(fetched.task_names(), vec!["keyword_extractor", "summarizer"]);
    }

    #[test]
    fn test_latest_job_for_document() {
        let store = JobStore::new();
        let first = store.create_job("doc_1", &TASKS);
        let second = store.create_job("doc_1", &TASKS);
        store.create_job("doc_2", &TASKS);

        let latest = store.get_latest_job_for_document("doc_1").unwrap();
        assert_eq!(latest.id, second.id);
        assert_ne!(latest.id, first.id);
        assert!(store.get_latest_job_for_document("doc_3").is_none());

        let all = store.get_all_jobs();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1].id, second.id);
    }

    #[test]
    fn test_begin_processing_only_claims_pending() {
        let store = JobStore::new();
        let job = store.create_job("doc_1", &TASKS);

        let claim = store.begin_processing(&job.id).unwrap();
        let claimed = match claim {
            Claim::Claimed(job) => job,
            other => panic!("expected claim, got {:?}", other),
        };
        assert_eq!(claimed.status, JobStatus::Processing);
        assert_eq!(claimed.count_tasks(TaskStatus::Processing), 2);

        assert_eq!(
            store.begin_processing(&job.id).unwrap(),
            Claim::NotPending(JobStatus::Processing)
        );
    }

    #[test]
    fn test_record_outcomes_derive_status() {
        let store = JobStore::new();
        let job = store.create_job("doc_1", &TASKS);
        store.begin_processing(&job.id).unwrap();

        let after_first = store
            .record_task_outcome(&job.id, "keyword_extractor", TaskRecord::Completed(keywords()))
            .unwrap();
        assert_eq!(after_first.status, JobStatus::Processing);
        assert!(!after_first.results["keyword_extractor"].is_error());

        let after_second = store
            .record_task_outcome(&job.id, "summarizer", TaskRecord::Failed("boom".into()))
            .unwrap();
        assert_eq!(after_second.status, JobStatus::Partial);
        assert_eq!(after_second.error_messages["summarizer"], "boom");
        assert_eq!(
            after_second.results["summarizer"],
            TaskResult::Error {
                error: "boom".into()
            }
        );
    }

    #[test]
    fn test_record_rejects_invalid_transitions() {
        let store = JobStore::new();
        let job = store.create_job("doc_1", &TASKS);

        let pending = store.record_task_outcome(&job.id, "summarizer", TaskRecord::Failed("x".into()));
        assert!(matches!(pending, Err(StoreError::InvalidTransition { .. })));

        store.begin_processing(&job.id).unwrap();
        store
            .record_task_outcome(&job.id, "summarizer", TaskRecord::Failed("x".into()))
            .unwrap();
        let twice = store.record_task_outcome(&job.id, "summarizer", TaskRecord::Completed(keywords()));
        assert!(matches!(twice, Err(StoreError::InvalidTransition { .. })));

        let unknown = store.record_task_outcome(&job.id, "translator", TaskRecord::Failed("x".into()));
        assert!(matches!(unknown, Err(StoreError::UnknownTask { .. })));
    }

    #[test]
    fn test_fail_job_leaves_tasks_pending() {
        let store = JobStore::new();
        let job = store.create_job("doc_1", &TASKS);
        let failed = match store
            .fail_job(&job.id, "orchestrator", "Document not found.")
            .unwrap()
        {
            Claim::Claimed(job) => job,
            other => panic!("expected the pending job to fail, got {:?}", other),
        };
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.count_tasks(TaskStatus::Pending), 2);
        assert_eq!(failed.error_messages["orchestrator"], "Document not found.");
        assert!(failed.end_time.is_some());
    }

    #[test]
    fn test_fail_job_skips_started_jobs() {
        let store = JobStore::new();
        let job = store.create_job("doc_1", &TASKS);
        store.begin_processing(&job.id).unwrap();

        let outcome = store.fail_job(&job.id, "orchestrator", "late failure").unwrap();
        assert_eq!(outcome, Claim::NotPending(JobStatus::Processing));

        let stored = store.get_job(&job.id).unwrap();
        assert_eq!(stored.status, JobStatus::Processing);
        assert!(stored.error_messages.is_empty());
        assert!(stored.end_time.is_none());
    }

    #[test]
    fn test_missing_job() {
        let store = JobStore::new();
        assert_eq!(
            store.begin_processing("job_missing"),
            Err(StoreError::JobNotFound("job_missing".into()))
        );
    }

    #[test]
    fn test_admit_decision_table() {
        let store = JobStore::new();

        let first = store.admit("doc_1", &TASKS);
        assert!(matches!(first, Admission::Created(_)));

        let again = store.admit("doc_1", &TASKS);
        assert!(matches!(again, Admission::Rescheduled(_)));
        assert_eq!(again.job().id, first.job().id);

        store.begin_processing(&first.job().id).unwrap();
        let running = store.admit("doc_1", &TASKS);
        assert!(matches!(running, Admission::Existing(_)));
        assert_eq!(store.get_all_jobs().len(), 1);
    }

    #[test]
    fn test_admit_after_failure_creates_new_job() {
        let store = JobStore::new();
        let first = store.admit("doc_1", &TASKS).into_job();
        store.fail_job(&first.id, "orchestrator", "boom").unwrap();

        let retry = store.admit("doc_1", &TASKS);
        assert!(matches!(retry, Admission::Created(_)));
        assert_ne!(retry.job().id, first.id);
    }

    #[test]
    fn test_concurrent_admission_creates_one_job() {
        let store = Arc::new(JobStore::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.admit("doc_1", &TASKS).job().id.clone())
            })
            .collect();

        let ids: std::collections::HashSet<String> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn test_concurrent_task_updates_are_not_lost() {
        let names: Vec<String> = (0..32).map(|i| format!("task_{}", i)).collect();
        let store = Arc::new(JobStore::new());
        let job = store.create_job("doc_1", &names);
        store.begin_processing(&job.id).unwrap();

        let handles: Vec<_> = names
            .iter()
            .cloned()
            .map(|name| {
                let store = Arc::clone(&store);
                let job_id = job.id.clone();
                std::thread::spawn(move || {
                    store
                        .record_task_outcome(&job_id, &name, TaskRecord::Completed(keywords()))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let job = store.get_job(&job.id).unwrap();
        assert_eq!(job.results.len(), 32);
        assert_eq!(job.status, JobStatus::Completed);
    }
}
