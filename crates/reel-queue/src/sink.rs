//! Producer-side seam used by the scheduler and manual retries.

use async_trait::async_trait;

use reel_models::GenerationJob;

use crate::error::QueueResult;
use crate::job::EnqueueOutcome;
use crate::queue::JobQueue;

/// Anything that accepts generation jobs.
#[async_trait]
pub trait JobSink: Send + Sync {
    /// Enqueue keyed by video id; in-flight duplicates are ignored.
    async fn enqueue(&self, job: &GenerationJob) -> QueueResult<EnqueueOutcome>;

    /// Drop any record for this id so the next enqueue starts fresh.
    async fn remove(&self, id: &str) -> QueueResult<bool>;
}

#[async_trait]
impl JobSink for JobQueue {
    async fn enqueue(&self, job: &GenerationJob) -> QueueResult<EnqueueOutcome> {
        JobQueue::enqueue(self, job).await
    }

    async fn remove(&self, id: &str) -> QueueResult<bool> {
        JobQueue::remove(self, id).await
    }
}

#[cfg(any(test, feature = "memory"))]
pub use memory::MemoryJobSink;

#[cfg(any(test, feature = "memory"))]
mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::job::JobState;

    /// In-process sink with the same dedup rules as [`JobQueue`].
    #[derive(Debug, Default)]
    pub struct MemoryJobSink {
        jobs: Mutex<HashMap<String, (JobState, GenerationJob)>>,
        accepted: Mutex<Vec<GenerationJob>>,
    }

    impl MemoryJobSink {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every job that was actually added, in order.
        pub fn accepted(&self) -> Vec<GenerationJob> {
            self.accepted.lock().map(|jobs| jobs.clone()).unwrap_or_default()
        }

        /// Force a job into a state, e.g. to simulate completion.
        pub fn set_state(&self, id: &str, state: JobState) {
            if let Ok(mut jobs) = self.jobs.lock() {
                if let Some(entry) = jobs.get_mut(id) {
                    entry.0 = state;
                }
            }
        }

        pub fn state(&self, id: &str) -> Option<JobState> {
            self.jobs.lock().ok()?.get(id).map(|(state, _)| *state)
        }
    }

    #[async_trait]
    impl JobSink for MemoryJobSink {
        async fn enqueue(&self, job: &GenerationJob) -> QueueResult<EnqueueOutcome> {
            let id = job.job_id().to_string();
            let mut jobs = self
                .jobs
                .lock()
                .map_err(|_| crate::QueueError::enqueue_failed("memory sink poisoned"))?;

            if let Some((state, _)) = jobs.get(&id) {
                if state.is_in_flight() {
                    return Ok(EnqueueOutcome::AlreadyQueued { id, state: *state });
                }
            }

            jobs.insert(id.clone(), (JobState::Waiting, job.clone()));
            if let Ok(mut accepted) = self.accepted.lock() {
                accepted.push(job.clone());
            }
            Ok(EnqueueOutcome::Added(id))
        }

        async fn remove(&self, id: &str) -> QueueResult<bool> {
            let mut jobs = self
                .jobs
                .lock()
                .map_err(|_| crate::QueueError::enqueue_failed("memory sink poisoned"))?;
            Ok(jobs.remove(id).is_some())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobState;
    use reel_models::VideoId;

    fn job(id: &str) -> GenerationJob {
        GenerationJob::new(VideoId::from(id), "user", "series")
    }

    #[tokio::test]
    async fn test_duplicate_enqueue_is_ignored() {
        let sink = MemoryJobSink::new();
        let first = sink.enqueue(&job("v1")).await.unwrap();
        let second = sink.enqueue(&job("v1")).await.unwrap();

        assert!(first.was_added());
        assert_eq!(
            second,
            EnqueueOutcome::AlreadyQueued {
                id: "v1".into(),
                state: JobState::Waiting
            }
        );
        assert_eq!(sink.accepted().len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_job_is_replaced() {
        let sink = MemoryJobSink::new();
        sink.enqueue(&job("v1")).await.unwrap();
        sink.set_state("v1", JobState::Failed);

        let again = sink.enqueue(&job("v1")).await.unwrap();
        assert!(again.was_added());
        assert_eq!(sink.state("v1"), Some(JobState::Waiting));
        assert_eq!(sink.accepted().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_then_enqueue() {
        let sink = MemoryJobSink::new();
        sink.enqueue(&job("v1")).await.unwrap();
        sink.set_state("v1", JobState::Active);

        assert!(sink.remove("v1").await.unwrap());
        assert!(sink.enqueue(&job("v1")).await.unwrap().was_added());
        assert!(!sink.remove("missing").await.unwrap());
    }
}
