use tracing::info;

use crate::model::UserId;

use super::{FailureKind, Job, WalkEnd};

/// What happened to one user in a job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The user advanced to the next state.
    Completed,
    /// Issuer still processing; picked up again next run.
    Deferred,
    /// Record not actionable; left untouched.
    Skipped,
    /// Terminal failure, card fee refunded.
    Compensated(FailureKind),
    /// Failure without compensation.
    Failed(FailureKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub user_id: UserId,
    pub outcome: ItemOutcome,
    pub rewards_written: usize,
    pub rewards_failed: usize,
    /// End of the referral walk, if one was attempted.
    pub walk: Option<WalkEnd>,
}

impl ItemReport {
    pub fn new(user_id: UserId, outcome: ItemOutcome) -> Self {
        Self {
            user_id,
            outcome,
            rewards_written: 0,
            rewards_failed: 0,
            walk: None,
        }
    }
}

/// Per-item results of one job run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub job: Job,
    pub items: Vec<ItemReport>,
}

impl RunSummary {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            items: Vec::new(),
        }
    }

    pub fn push(&mut self, report: ItemReport) {
        self.items.push(report);
    }

    pub fn item(&self, user_id: UserId) -> Option<&ItemReport> {
        self.items.iter().find(|r| r.user_id == user_id)
    }

    pub fn count(&self, outcome: ItemOutcome) -> usize {
        self.items.iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn rewards_written(&self) -> usize {
        self.items.iter().map(|r| r.rewards_written).sum()
    }

    pub(super) fn log(&self) {
        let failed = self
            .items
            .iter()
            .filter(|r| matches!(r.outcome, ItemOutcome::Failed(_)))
            .count();
        let compensated = self
            .items
            .iter()
            .filter(|r| matches!(r.outcome, ItemOutcome::Compensated(_)))
            .count();
        info!(
            items = self.items.len(),
            completed = self.count(ItemOutcome::Completed),
            deferred = self.count(ItemOutcome::Deferred),
            compensated,
            failed,
            rewards = self.rewards_written(),
            "{} finished",
            self.job
        );
    }
}

/// Result of one deposit rollup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollupSummary {
    pub deposit_recorded: bool,
    pub ancestors_updated: usize,
    pub ancestors_failed: usize,
}
