//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use reel_models::truncate_message;
use reel_models::utils::MAX_ERROR_MESSAGE_LEN;
use reel_queue::{JobQueue, LeasedJob, RetryDecision};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::pipeline::GenerationPipeline;
use crate::retry::FailureTracker;

/// Pulls jobs off the queue and runs them through the pipeline.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    pipeline: Arc<GenerationPipeline>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    worker_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, queue: JobQueue, pipeline: GenerationPipeline) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            queue: Arc::new(queue),
            pipeline: Arc::new(pipeline),
            job_semaphore,
            shutdown,
            worker_name: format!("worker-{}", Uuid::new_v4()),
        }
    }

    /// Run until [`JobExecutor::shutdown`] is called.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.worker_name, self.config.max_concurrent_jobs
        );

        self.queue.ping().await?;

        let maintenance = tokio::spawn(Self::maintain(
            Arc::clone(&self.queue),
            self.config.maintenance_interval,
            self.shutdown.subscribe(),
        ));

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_next() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        maintenance.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "In-flight jobs still running after {:?}; their leases will expire and be recovered",
                self.config.shutdown_timeout
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    async fn consume_next(&self) -> WorkerResult<()> {
        let permit = Arc::clone(&self.job_semaphore)
            .acquire_owned()
            .await
            .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;

        let Some(leased) = self.queue.next().await? else {
            drop(permit);
            tokio::time::sleep(self.config.poll_interval).await;
            return Ok(());
        };

        debug!(video_id = %leased.id(), attempts = leased.attempts, "Leased job");
        tokio::spawn(Self::execute_job(
            Arc::clone(&self.pipeline),
            Arc::clone(&self.queue),
            leased,
            self.config.heartbeat_interval,
            permit,
        ));
        Ok(())
    }

    async fn execute_job(
        pipeline: Arc<GenerationPipeline>,
        queue: Arc<JobQueue>,
        leased: LeasedJob,
        heartbeat_interval: Duration,
        _permit: OwnedSemaphorePermit,
    ) {
        let id = leased.id().to_string();
        let heartbeat = tokio::spawn(Self::heartbeat(Arc::clone(&queue), id.clone(), heartbeat_interval));

        let result = pipeline.run(&leased.job, leased.attempts + 1).await;
        heartbeat.abort();

        match result {
            Ok(_) => {
                if let Err(e) = queue.complete(&id).await {
                    error!(video_id = %id, "Failed to complete job: {}", e);
                }
            }
            Err(e) => {
                metrics::counter!(
                    "reel_generation_failures_total",
                    "retryable" => if e.is_retryable() { "true" } else { "false" }
                )
                .increment(1);

                let message = truncate_message(&e.user_message(), MAX_ERROR_MESSAGE_LEN);
                match queue.fail(&id, &message).await {
                    Ok(RetryDecision::Retry { attempt, delay }) => {
                        info!(video_id = %id, attempt, "Job will be retried in {:?}", delay);
                    }
                    Ok(RetryDecision::Exhausted { attempts }) => {
                        warn!(video_id = %id, attempts, "Job failed permanently: {}", message);
                    }
                    Err(queue_err) => {
                        error!(video_id = %id, "Failed to record job failure: {}", queue_err);
                    }
                }
            }
        }
    }

    /// Keep the lease alive while the job runs.
    async fn heartbeat(queue: Arc<JobQueue>, id: String, every: Duration) {
        let mut tracker = FailureTracker::new(3);
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            match queue.heartbeat(&id).await {
                Ok(()) => tracker.record_success(),
                Err(e) => {
                    if tracker.record_failure() {
                        warn!(video_id = %id, "Lease heartbeat failed: {}", e);
                    }
                }
            }
        }
    }

    /// Promote due retries and recover jobs whose worker died.
    async fn maintain(queue: Arc<JobQueue>, every: Duration, mut shutdown_rx: watch::Receiver<bool>) {
        let mut tracker = FailureTracker::new(3);
        let mut interval = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    let result = async {
                        let promoted = queue.promote_due().await?;
                        let recovered = queue.recover_stalled().await?;
                        Ok::<_, reel_queue::QueueError>((promoted, recovered))
                    }
                    .await;

                    match result {
                        Ok((promoted, recovered)) => {
                            tracker.record_success();
                            if promoted > 0 {
                                debug!("Promoted {} delayed jobs", promoted);
                            }
                            if !recovered.is_empty() {
                                warn!("Recovered {} stalled jobs: {:?}", recovered.len(), recovered);
                            }
                        }
                        Err(e) => {
                            if tracker.record_failure() {
                                warn!("Queue maintenance failed: {}", e);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        while self.job_semaphore.available_permits() < self.config.max_concurrent_jobs {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
