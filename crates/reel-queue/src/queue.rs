//! Job queue on Redis lists, a delayed zset and per-job hashes.
//!
//! Key layout (prefix `reel` by default):
//! - `reel:job:{id}`: hash with `payload`, `state`, `attempts`, `error`, `updated_at`
//! - `reel:waiting`: list, pushed left and popped right
//! - `reel:active`: list of ids currently leased to a worker
//! - `reel:delayed`: zset of ids scored by due time (epoch ms)
//! - `reel:completed` / `reel:failed`: capped history lists
//! - `reel:lease:{id}`: expiring key refreshed by the worker heartbeat

use std::time::Duration;

use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use tracing::{debug, info, warn};

use reel_models::GenerationJob;

use crate::error::{QueueError, QueueResult};
use crate::job::{EnqueueOutcome, JobState, LeasedJob, QueueCounts};
use crate::retry::{RetryDecision, RetryPolicy};

/// Adds a job unless one with the same id is in flight.
const ENQUEUE_SCRIPT: &str = r#"
local state = redis.call('HGET', KEYS[1], 'state')
if state == 'waiting' or state == 'active' or state == 'delayed' then
  return {0, state}
end
redis.call('LREM', KEYS[3], 0, ARGV[1])
redis.call('LREM', KEYS[4], 0, ARGV[1])
redis.call('DEL', KEYS[1])
redis.call('HSET', KEYS[1], 'payload', ARGV[2], 'state', 'waiting', 'attempts', 0, 'updated_at', ARGV[3])
redis.call('LPUSH', KEYS[2], ARGV[1])
return {1, 'waiting'}
"#;

/// Pops the oldest waiting id into the active list and grants a lease.
const LEASE_SCRIPT: &str = r#"
local id = redis.call('RPOP', KEYS[1])
if not id then
  return false
end
redis.call('LPUSH', KEYS[2], id)
local job_key = ARGV[1] .. id
redis.call('HSET', job_key, 'state', 'active', 'updated_at', ARGV[3])
redis.call('SET', ARGV[2] .. id, '1', 'PX', ARGV[4])
local payload = redis.call('HGET', job_key, 'payload') or ''
local attempts = redis.call('HGET', job_key, 'attempts') or '0'
return {id, payload, attempts}
"#;

/// Moves due delayed ids back to waiting.
const PROMOTE_SCRIPT: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 100)
for _, id in ipairs(ids) do
  if redis.call('ZREM', KEYS[1], id) == 1 then
    redis.call('LPUSH', KEYS[2], id)
    redis.call('HSET', ARGV[2] .. id, 'state', 'waiting', 'updated_at', ARGV[1])
  end
end
return #ids
"#;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Prefix for every key
    pub key_prefix: String,
    /// Backoff and attempt limit
    pub retry: RetryPolicy,
    /// A worker that misses heartbeats for this long loses its job
    pub lease_ttl: Duration,
    /// Entries kept in the completed and failed history lists
    pub history_limit: usize,
    /// Expiry for finished job hashes
    pub finished_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "reel".to_string(),
            retry: RetryPolicy::default(),
            lease_ttl: Duration::from_secs(120),
            history_limit: 100,
            finished_ttl: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: std::env::var("QUEUE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            retry: RetryPolicy {
                max_attempts: env_parse("QUEUE_MAX_ATTEMPTS").unwrap_or(defaults.retry.max_attempts),
                base_delay: env_parse("QUEUE_BACKOFF_BASE_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.retry.base_delay),
                max_delay: env_parse("QUEUE_BACKOFF_MAX_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.retry.max_delay),
            },
            lease_ttl: env_parse("QUEUE_LEASE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.lease_ttl),
            history_limit: env_parse("QUEUE_HISTORY_LIMIT").unwrap_or(defaults.history_limit),
            finished_ttl: defaults.finished_ttl,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
    enqueue_script: Script,
    lease_script: Script,
    promote_script: Script,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            enqueue_script: Script::new(ENQUEUE_SCRIPT),
            lease_script: Script::new(LEASE_SCRIPT),
            promote_script: Script::new(PROMOTE_SCRIPT),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn conn(&self) -> QueueResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    fn key(&self, name: &str) -> String {
        format!("{}:{}", self.config.key_prefix, name)
    }

    fn job_key(&self, id: &str) -> String {
        format!("{}:job:{}", self.config.key_prefix, id)
    }

    fn lease_key(&self, id: &str) -> String {
        format!("{}:lease:{}", self.config.key_prefix, id)
    }

    /// Verify the connection.
    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    /// Enqueue a generation job keyed by its video id.
    ///
    /// If a job for the same id is waiting, active or delayed, nothing
    /// changes. A completed or failed job is replaced by the new one.
    pub async fn enqueue(&self, job: &GenerationJob) -> QueueResult<EnqueueOutcome> {
        let mut conn = self.conn().await?;
        let id = job.job_id().to_string();
        let payload = serde_json::to_string(job)?;

        let (added, state): (i64, String) = self
            .enqueue_script
            .key(self.job_key(&id))
            .key(self.key("waiting"))
            .key(self.key("completed"))
            .key(self.key("failed"))
            .arg(&id)
            .arg(payload)
            .arg(Utc::now().timestamp_millis())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;

        if added == 1 {
            metrics::counter!("reel_jobs_enqueued_total").increment(1);
            info!(video_id = %id, "Enqueued generation job");
            Ok(EnqueueOutcome::Added(id))
        } else {
            let state = state.parse().unwrap_or(JobState::Waiting);
            info!(video_id = %id, state = %state, "Job already in flight, enqueue skipped");
            Ok(EnqueueOutcome::AlreadyQueued { id, state })
        }
    }

    /// Remove a job in any state. Returns whether it existed.
    pub async fn remove(&self, id: &str) -> QueueResult<bool> {
        let mut conn = self.conn().await?;
        let (_, _, _, _, _, deleted): (i64, i64, i64, i64, i64, i64) = redis::pipe()
            .atomic()
            .lrem(self.key("waiting"), 0, id)
            .lrem(self.key("active"), 0, id)
            .zrem(self.key("delayed"), id)
            .lrem(self.key("completed"), 0, id)
            .lrem(self.key("failed"), 0, id)
            .del(vec![self.job_key(id), self.lease_key(id)])
            .query_async(&mut conn)
            .await?;

        debug!(video_id = %id, existed = deleted > 0, "Removed job");
        Ok(deleted > 0)
    }

    /// Current state of a job, if known.
    pub async fn state(&self, id: &str) -> QueueResult<Option<JobState>> {
        let mut conn = self.conn().await?;
        let state: Option<String> = conn.hget(self.job_key(id), "state").await?;
        Ok(state.and_then(|s| s.parse().ok()))
    }

    /// Lease the next waiting job, if any.
    ///
    /// Jobs with an unreadable payload are failed immediately and skipped.
    pub async fn next(&self) -> QueueResult<Option<LeasedJob>> {
        let mut conn = self.conn().await?;

        loop {
            let leased: Option<(String, String, u32)> = self
                .lease_script
                .key(self.key("waiting"))
                .key(self.key("active"))
                .arg(self.job_key(""))
                .arg(self.lease_key(""))
                .arg(Utc::now().timestamp_millis())
                .arg(self.config.lease_ttl.as_millis() as u64)
                .invoke_async(&mut conn)
                .await
                .map_err(|e| QueueError::dequeue_failed(e.to_string()))?;

            let Some((id, payload, attempts)) = leased else {
                return Ok(None);
            };

            match serde_json::from_str::<GenerationJob>(&payload) {
                Ok(job) => {
                    debug!(video_id = %id, attempts, "Leased job");
                    return Ok(Some(LeasedJob { job, attempts }));
                }
                Err(e) => {
                    warn!(video_id = %id, "Unreadable job payload, failing it: {}", e);
                    self.finish(&mut conn, &id, JobState::Failed, Some(&e.to_string()))
                        .await?;
                }
            }
        }
    }

    /// Refresh the lease of an active job.
    pub async fn heartbeat(&self, id: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        conn.pset_ex::<_, _, ()>(self.lease_key(id), "1", self.config.lease_ttl.as_millis() as u64)
            .await?;
        Ok(())
    }

    /// Mark a job completed.
    pub async fn complete(&self, id: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        self.finish(&mut conn, id, JobState::Completed, None).await?;
        metrics::counter!("reel_jobs_completed_total").increment(1);
        Ok(())
    }

    /// Record a failed attempt and schedule a retry or fail the job.
    pub async fn fail(&self, id: &str, error: &str) -> QueueResult<RetryDecision> {
        let mut conn = self.conn().await?;
        let attempts: u32 = conn.hincr(self.job_key(id), "attempts", 1).await?;
        let decision = self.config.retry.decide(attempts);

        match decision {
            RetryDecision::Retry { delay, .. } => {
                let now = Utc::now().timestamp_millis();
                let due = now + delay.as_millis() as i64;
                redis::pipe()
                    .atomic()
                    .lrem(self.key("active"), 0, id)
                    .ignore()
                    .del(self.lease_key(id))
                    .ignore()
                    .hset_multiple(
                        self.job_key(id),
                        &[
                            ("state", JobState::Delayed.as_str().to_string()),
                            ("error", error.to_string()),
                            ("updated_at", now.to_string()),
                        ],
                    )
                    .ignore()
                    .zadd(self.key("delayed"), id, due)
                    .ignore()
                    .query_async::<()>(&mut conn)
                    .await?;

                metrics::counter!("reel_jobs_retried_total").increment(1);
                warn!(video_id = %id, attempts, delay_secs = delay.as_secs(), "Job failed, retry scheduled");
            }
            RetryDecision::Exhausted { .. } => {
                self.finish(&mut conn, id, JobState::Failed, Some(error)).await?;
                metrics::counter!("reel_jobs_failed_total").increment(1);
                warn!(video_id = %id, attempts, "Job failed, attempts exhausted");
            }
        }

        Ok(decision)
    }

    /// Move a job into a terminal state and its history list.
    async fn finish(
        &self,
        conn: &mut MultiplexedConnection,
        id: &str,
        state: JobState,
        error: Option<&str>,
    ) -> QueueResult<()> {
        let history = self.key(state.as_str());
        let job_key = self.job_key(id);
        let mut fields = vec![
            ("state", state.as_str().to_string()),
            ("updated_at", Utc::now().timestamp_millis().to_string()),
        ];
        if let Some(error) = error {
            fields.push(("error", error.to_string()));
        }

        redis::pipe()
            .atomic()
            .lrem(self.key("active"), 0, id)
            .ignore()
            .del(self.lease_key(id))
            .ignore()
            .hset_multiple(&job_key, &fields)
            .ignore()
            .expire(&job_key, self.config.finished_ttl.as_secs() as i64)
            .ignore()
            .lrem(&history, 0, id)
            .ignore()
            .lpush(&history, id)
            .ignore()
            .ltrim(&history, 0, self.config.history_limit as isize - 1)
            .ignore()
            .query_async::<()>(conn)
            .await?;
        Ok(())
    }

    /// Move due delayed jobs back to waiting. Returns how many were due.
    pub async fn promote_due(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let promoted: u64 = self
            .promote_script
            .key(self.key("delayed"))
            .key(self.key("waiting"))
            .arg(Utc::now().timestamp_millis())
            .arg(self.job_key(""))
            .invoke_async(&mut conn)
            .await?;
        if promoted > 0 {
            debug!(count = promoted, "Promoted delayed jobs");
        }
        Ok(promoted)
    }

    /// Requeue active jobs whose lease expired (worker crashed or hung).
    pub async fn recover_stalled(&self) -> QueueResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let active: Vec<String> = conn.lrange(self.key("active"), 0, -1).await?;

        let mut recovered = Vec::new();
        for id in active {
            let leased: bool = conn.exists(self.lease_key(&id)).await?;
            if leased {
                continue;
            }
            let removed: i64 = conn.lrem(self.key("active"), 0, &id).await?;
            if removed == 0 {
                // Finished between the scan and now.
                continue;
            }
            // Back of the line is the right end, so it is served next.
            redis::pipe()
                .atomic()
                .rpush(self.key("waiting"), &id)
                .ignore()
                .hset(self.job_key(&id), "state", JobState::Waiting.as_str())
                .ignore()
                .query_async::<()>(&mut conn)
                .await?;
            warn!(video_id = %id, "Recovered stalled job");
            recovered.push(id);
        }

        if !recovered.is_empty() {
            metrics::counter!("reel_jobs_stalled_total").increment(recovered.len() as u64);
        }
        Ok(recovered)
    }

    /// Jobs per state.
    pub async fn counts(&self) -> QueueResult<QueueCounts> {
        let mut conn = self.conn().await?;
        let (waiting, active, delayed, completed, failed): (u64, u64, u64, u64, u64) = redis::pipe()
            .llen(self.key("waiting"))
            .llen(self.key("active"))
            .zcard(self.key("delayed"))
            .llen(self.key("completed"))
            .llen(self.key("failed"))
            .query_async(&mut conn)
            .await?;

        Ok(QueueCounts {
            waiting,
            active,
            delayed,
            completed,
            failed,
        })
    }
}
