//! Card issuance and commission engine.
//!
//! The engine drives three periodic jobs (issuance orchestration, activation
//! polling and the threshold reward pass) plus the deposit rollup. Each job
//! owns its own [`JobGuard`], so at most one instance of a job runs at a
//! time while different jobs may overlap. Users inside one run are handled
//! strictly one after another, and one user's failure never aborts the run.

use chrono::Utc;
use std::fmt;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

use crate::Amount;
use crate::issuer::DynCardIssuer;
use crate::model::{LedgerEvent, ReferralRecord, Reward, RewardReason, User};
use crate::repository::{DynRepository, Mutation, PersistenceError};

mod activation;
mod admin;
mod compensation;
mod guard;
mod issuance;
mod rollup;
mod summary;

pub mod rewards;

mod error;
pub use admin::{PHYSICAL_CARD, VIRTUAL_CARD};
pub use error::{DataIntegrityError, EngineError, FailureKind, PreflightError, WithdrawError};
pub use guard::{JobGuard, OverlapPolicy};
pub use issuance::{IssuanceRequest, MIN_REFERENCE_LEN, preflight};
pub use rewards::{RewardPlan, Thresholds, UserSnapshot, WalkEnd};
pub use summary::{ItemOutcome, ItemReport, RollupSummary, RunSummary};

/// The periodic jobs, each serialized by its own guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    Issuance,
    Activation,
    ThresholdRewards,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Job::Issuance => "issuance orchestration",
            Job::Activation => "activation polling",
            Job::ThresholdRewards => "threshold reward pass",
        };
        f.write_str(name)
    }
}

/// Tunables fixed for the lifetime of an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Refund for users in the base pool.
    pub base_refund: Amount,
    /// Refund for users with `vip_two` set.
    pub elevated_refund: Amount,
    /// Issuer account used when listing cards.
    pub issuer_account_id: String,
    pub overlap: OverlapPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            base_refund: Amount::from_units(10),
            elevated_refund: Amount::from_units(30),
            issuer_account_id: String::new(),
            overlap: OverlapPolicy::Wait,
        }
    }
}

pub struct Engine {
    repo: DynRepository,
    issuer: DynCardIssuer,
    settings: EngineSettings,
    issuance_guard: JobGuard,
    activation_guard: JobGuard,
    threshold_guard: JobGuard,
}

/// Public API
impl Engine {
    pub fn new(repo: DynRepository, issuer: DynCardIssuer, settings: EngineSettings) -> Self {
        let overlap = settings.overlap;
        Self {
            repo,
            issuer,
            settings,
            issuance_guard: JobGuard::new(Job::Issuance, overlap),
            activation_guard: JobGuard::new(Job::Activation, overlap),
            threshold_guard: JobGuard::new(Job::ThresholdRewards, overlap),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run one instance of the given job.
    pub async fn run_job(&self, job: Job) -> Result<RunSummary, EngineError> {
        match job {
            Job::Issuance => self.run_issuance().await,
            Job::Activation => self.run_activation_polling().await,
            Job::ThresholdRewards => self.run_threshold_rewards().await,
        }
    }

    /// Apply a stream of ledger events in order.
    pub async fn run(&self, mut stream: impl Stream<Item = LedgerEvent> + Unpin) {
        while let Some(event) = stream.next().await {
            if let Err(e) = self.apply(event).await {
                warn!(reason = %e, "ledger event skipped");
            }
        }
    }

    /// Apply a single ledger event.
    pub async fn apply(&self, event: LedgerEvent) -> Result<(), EngineError> {
        match event {
            LedgerEvent::Deposit(deposit) => {
                self.record_deposit(deposit).await?;
            }
            LedgerEvent::Activation { user_id } => {
                self.reward_activation(user_id).await?;
            }
            LedgerEvent::CardTwo { user_id } => {
                self.reward_card_two(user_id).await?;
            }
        }
        Ok(())
    }
}

/// Private API
impl Engine {
    /// Read the user table once for the current run.
    async fn snapshot(&self) -> Result<UserSnapshot, PersistenceError> {
        Ok(self.repo.all_users().await?.into_iter().collect())
    }

    /// Walk `source`'s referral chain with `plan_for` and write each payout
    /// in its own transaction. Failed writes are counted and skipped.
    async fn pay_referrers(
        &self,
        source: &User,
        reason: RewardReason,
        plan_for: impl FnOnce(&ReferralRecord) -> RewardPlan,
        report: &mut ItemReport,
    ) {
        let referral = match self.repo.referral(source.id).await {
            Ok(Some(referral)) => referral,
            Ok(None) => {
                let e = DataIntegrityError::MissingReferral(source.id);
                warn!(user = source.id, kind = %reason, reason = %e, "reward walk aborted");
                report.walk = Some(WalkEnd::Aborted(e));
                return;
            }
            Err(e) => {
                warn!(user = source.id, kind = %reason, reason = %e, "referral lookup failed");
                return;
            }
        };

        let plan = plan_for(&referral);
        for payout in &plan.payouts {
            let reward = Reward {
                user_id: payout.user_id,
                amount: payout.amount,
                reason,
                tier: payout.tier,
                address: source.address.clone(),
                created_at: Utc::now(),
            };
            match self.repo.commit(vec![Mutation::InsertReward(reward)]).await {
                Ok(()) => {
                    report.rewards_written += 1;
                    info!(
                        user = source.id,
                        payee = payout.user_id,
                        amount = %payout.amount,
                        tier = payout.tier,
                        "{reason} reward paid"
                    );
                }
                Err(e) => {
                    report.rewards_failed += 1;
                    warn!(
                        user = source.id,
                        payee = payout.user_id,
                        amount = %payout.amount,
                        reason = %e,
                        "{reason} reward skipped"
                    );
                }
            }
        }

        if let WalkEnd::Aborted(e) = &plan.end {
            warn!(user = source.id, reason = %e, "{reason} walk stopped early");
        }
        report.walk = Some(plan.end);
    }
}
