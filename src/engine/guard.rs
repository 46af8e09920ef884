use tokio::sync::{Mutex, MutexGuard};

use super::{EngineError, Job};

/// What a job run does when another instance of the same job holds the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
    /// Block until the running instance finishes.
    #[default]
    Wait,
    /// Give up immediately with [`EngineError::Busy`].
    Skip,
}

/// Single-flight guard owned by one job.
#[derive(Debug)]
pub struct JobGuard {
    job: Job,
    policy: OverlapPolicy,
    lock: Mutex<()>,
}

impl JobGuard {
    pub fn new(job: Job, policy: OverlapPolicy) -> Self {
        Self {
            job,
            policy,
            lock: Mutex::new(()),
        }
    }

    /// Hold the guard for the duration of one run.
    pub async fn acquire(&self) -> Result<MutexGuard<'_, ()>, EngineError> {
        match self.policy {
            OverlapPolicy::Wait => Ok(self.lock.lock().await),
            OverlapPolicy::Skip => self.lock.try_lock().map_err(|_| EngineError::Busy(self.job)),
        }
    }
}
