//! Bounded queue of worker invocations with progress tracking

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::QueryModel;

/// Work the background worker knows how to do
#[derive(Debug, Clone)]
pub enum WorkerTask {
    /// Answer a stored query record and write the result back
    Answer(QueryModel),
    /// Load the user's uploaded documents into their collection
    Ingest { user_id: String, reset: bool },
}

impl WorkerTask {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerTask::Answer(_) => "answer",
            WorkerTask::Ingest { .. } => "ingest",
        }
    }
}

/// One queued invocation
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub task: WorkerTask,
}

/// Job status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
}

/// Progress of a job that has not finished yet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: Uuid,
    pub kind: String,
    pub status: JobStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Queue statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueStats {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Asynchronous invocation queue feeding the worker
///
/// Finished jobs leave the progress map and are only counted.
pub struct JobQueue {
    jobs: Arc<DashMap<Uuid, JobProgress>>,
    sender: mpsc::Sender<Job>,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl JobQueue {
    /// Create a queue holding at most `capacity` pending jobs
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Job>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));

        let queue = Self {
            jobs: Arc::new(DashMap::new()),
            sender,
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        };

        (queue, receiver)
    }

    /// Queue a task without waiting for it to run
    ///
    /// Returns the invocation id. Fails when the queue is full or the worker
    /// has stopped.
    pub fn invoke(&self, task: WorkerTask) -> Result<Uuid> {
        let job_id = Uuid::new_v4();
        let now = chrono::Utc::now();
        let kind = task.kind();

        self.jobs.insert(
            job_id,
            JobProgress {
                job_id,
                kind: kind.to_string(),
                status: JobStatus::Queued,
                created_at: now,
                updated_at: now,
            },
        );

        if let Err(e) = self.sender.try_send(Job { id: job_id, task }) {
            self.jobs.remove(&job_id);
            tracing::error!("Failed to invoke {} task: {}", kind, e);
            return Err(Error::internal(format!("Failed to invoke worker: {}", e)));
        }

        tracing::debug!("Invoked {} task {}", kind, job_id);
        Ok(job_id)
    }

    /// Get progress of an unfinished job
    pub fn get_progress(&self, job_id: Uuid) -> Option<JobProgress> {
        self.jobs.get(&job_id).map(|p| p.clone())
    }

    pub fn mark_running(&self, job_id: Uuid) {
        if let Some(mut progress) = self.jobs.get_mut(&job_id) {
            progress.status = JobStatus::Running;
            progress.updated_at = chrono::Utc::now();
        }
    }

    pub fn mark_complete(&self, job_id: Uuid) {
        self.jobs.remove(&job_id);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn mark_failed(&self, job_id: Uuid) {
        self.jobs.remove(&job_id);
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn stats(&self) -> QueueStats {
        let queued = self
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Queued)
            .count();
        let running = self
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Running)
            .count();

        QueueStats {
            queued,
            running,
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }

    /// True once the worker's receiver has been dropped
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingest(user: &str) -> WorkerTask {
        WorkerTask::Ingest {
            user_id: user.to_string(),
            reset: false,
        }
    }

    #[tokio::test]
    async fn test_invoke_and_stats() {
        let (queue, mut receiver) = JobQueue::new(4);

        let first = queue.invoke(WorkerTask::Answer(QueryModel::new("nobody", "q"))).unwrap();
        let second = queue.invoke(ingest("alice")).unwrap();
        assert_ne!(first, second);

        let stats = queue.stats();
        assert_eq!(stats.queued, 2);
        assert_eq!(stats.running, 0);

        let job = receiver.recv().await.unwrap();
        assert_eq!(job.id, first);
        assert_eq!(job.task.kind(), "answer");

        queue.mark_running(first);
        assert_eq!(queue.get_progress(first).unwrap().status, JobStatus::Running);

        queue.mark_complete(first);
        queue.mark_failed(second);

        assert_eq!(
            queue.stats(),
            QueueStats {
                queued: 0,
                running: 0,
                completed: 1,
                failed: 1,
            }
        );
        assert!(queue.get_progress(first).is_none());
    }

    #[test]
    fn test_full_queue_rejects() {
        let (queue, _receiver) = JobQueue::new(1);

        tokio_test::assert_ok!(queue.invoke(ingest("a")));
        let err = tokio_test::assert_err!(queue.invoke(ingest("b")));

        assert!(matches!(err, Error::Internal(_)));
        assert_eq!(queue.stats().queued, 1);
    }

    #[test]
    fn test_closed_queue_rejects() {
        let (queue, receiver) = JobQueue::new(4);
        drop(receiver);

        assert!(queue.is_closed());
        tokio_test::assert_err!(queue.invoke(ingest("a")));
    }
}
