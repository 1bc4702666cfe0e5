//! Job lifecycle states and queue results.

use std::fmt;
use std::str::FromStr;

use reel_models::GenerationJob;

/// Where a job sits in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Waiting,
    Active,
    Delayed,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Delayed => "delayed",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    /// Waiting, active or delayed. A new enqueue for the same id is a no-op.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, JobState::Waiting | JobState::Active | JobState::Delayed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(JobState::Waiting),
            "active" => Ok(JobState::Active),
            "delayed" => Ok(JobState::Delayed),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            other => Err(format!("unknown job state: {other}")),
        }
    }
}

/// Result of an enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A fresh job was added.
    Added(String),
    /// A job for this id is already in flight; nothing changed.
    AlreadyQueued { id: String, state: JobState },
}

impl EnqueueOutcome {
    pub fn id(&self) -> &str {
        match self {
            EnqueueOutcome::Added(id) => id,
            EnqueueOutcome::AlreadyQueued { id, .. } => id,
        }
    }

    pub fn was_added(&self) -> bool {
        matches!(self, EnqueueOutcome::Added(_))
    }
}

/// A job handed to a worker, with the attempts made so far.
#[derive(Debug, Clone)]
pub struct LeasedJob {
    pub job: GenerationJob,
    pub attempts: u32,
}

impl LeasedJob {
    pub fn id(&self) -> &str {
        self.job.job_id()
    }
}

/// Jobs per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub waiting: u64,
    pub active: u64,
    pub delayed: u64,
    pub completed: u64,
    pub failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_states() {
        assert!(JobState::Waiting.is_in_flight());
        assert!(JobState::Active.is_in_flight());
        assert!(JobState::Delayed.is_in_flight());
        assert!(!JobState::Completed.is_in_flight());
        assert!(!JobState::Failed.is_in_flight());
        assert!(JobState::Failed.is_terminal());
    }

    #[test]
    fn test_state_parse() {
        for state in [
            JobState::Waiting,
            JobState::Active,
            JobState::Delayed,
            JobState::Completed,
            JobState::Failed,
        ] {
            assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        }
        assert!("paused".parse::<JobState>().is_err());
    }
}
