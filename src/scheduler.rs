//! Periodic execution of the engine jobs.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::engine::{Engine, EngineError, Job};

/// Tick period of each job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobPeriods {
    pub issuance: Duration,
    pub activation: Duration,
    pub threshold: Duration,
}

impl Default for JobPeriods {
    fn default() -> Self {
        Self {
            issuance: Duration::from_secs(60),
            activation: Duration::from_secs(60),
            threshold: Duration::from_secs(300),
        }
    }
}

impl JobPeriods {
    fn of(&self, job: Job) -> Duration {
        match job {
            Job::Issuance => self.issuance,
            Job::Activation => self.activation,
            Job::ThresholdRewards => self.threshold,
        }
    }
}

pub struct Scheduler {
    engine: Arc<Engine>,
    periods: JobPeriods,
}

impl Scheduler {
    pub fn new(engine: Arc<Engine>, periods: JobPeriods) -> Self {
        Self { engine, periods }
    }

    /// Spawn one periodic task per job. Dropping the handles detaches the
    /// tasks; abort them to stop the schedule.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        [Job::Issuance, Job::Activation, Job::ThresholdRewards]
            .into_iter()
            .map(|job| {
                let engine = self.engine.clone();
                let period = self.periods.of(job);
                tokio::spawn(run_periodically(engine, job, period))
            })
            .collect()
    }
}

async fn run_periodically(engine: Arc<Engine>, job: Job, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    // a slow run delays the next tick instead of triggering a burst
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match engine.run_job(job).await {
            Ok(summary) => debug!(%job, items = summary.items.len(), "tick done"),
            Err(EngineError::Busy(_)) => debug!(%job, "previous run still active, tick skipped"),
            Err(e) => warn!(%job, reason = %e, "job run failed"),
        }
    }
}
