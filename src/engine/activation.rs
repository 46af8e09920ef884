//! Activation polling and the commission passes that follow it.

use tracing::{debug, info, warn};

use crate::issuer::CardStatus;
use crate::model::{CardTwo, RewardReason, User, UserId};
use crate::repository::Mutation;

use super::rewards::{differential_payouts, threshold_payouts};
use super::{
    DataIntegrityError, Engine, EngineError, FailureKind, ItemOutcome, ItemReport, Job,
    RunSummary, Thresholds, UserSnapshot,
};

/// Card ids this short cannot be queried.
const MIN_CARD_ID_LEN: usize = 3;

/// Public API
impl Engine {
    /// Poll every in-flight card order; pay the differential commission on activation.
    pub async fn run_activation_polling(&self) -> Result<RunSummary, EngineError> {
        let _guard = self.activation_guard.acquire().await?;

        let users = self.repo.users_with_order_in_flight().await?;
        let mut summary = RunSummary::new(Job::Activation);
        if users.is_empty() {
            return Ok(summary);
        }

        let snapshot = self.snapshot().await?;
        for user in &users {
            summary.push(self.poll_card(user, &snapshot).await);
        }

        summary.log();
        Ok(summary)
    }

    /// Pay the threshold commission for every card application not processed yet.
    pub async fn run_threshold_rewards(&self) -> Result<RunSummary, EngineError> {
        let _guard = self.threshold_guard.acquire().await?;

        let thresholds = self.thresholds().await?;
        let pending = self.repo.unprocessed_card_twos().await?;
        let mut summary = RunSummary::new(Job::ThresholdRewards);
        if pending.is_empty() {
            return Ok(summary);
        }

        let snapshot = self.snapshot().await?;
        for application in &pending {
            summary.push(
                self.reward_application(application, &snapshot, &thresholds)
                    .await,
            );
        }

        summary.log();
        Ok(summary)
    }

    /// Pay the differential commission for `user_id` without polling the issuer.
    pub async fn reward_activation(&self, user_id: UserId) -> Result<ItemReport, EngineError> {
        let _guard = self.activation_guard.acquire().await?;

        let snapshot = self.snapshot().await?;
        let user = snapshot
            .get(user_id)
            .ok_or(EngineError::UnknownUser(user_id))?;

        let mut report = ItemReport::new(user_id, ItemOutcome::Completed);
        self.pay_referrers(
            user,
            RewardReason::CardActivation,
            |referral| differential_payouts(user.vip_two, referral, &snapshot),
            &mut report,
        )
        .await;
        Ok(report)
    }

    /// Pay the threshold commission for `user_id` outside the application queue.
    pub async fn reward_card_two(&self, user_id: UserId) -> Result<ItemReport, EngineError> {
        let _guard = self.threshold_guard.acquire().await?;

        let thresholds = self.thresholds().await?;
        let snapshot = self.snapshot().await?;
        let user = snapshot
            .get(user_id)
            .ok_or(EngineError::UnknownUser(user_id))?;

        let mut report = ItemReport::new(user_id, ItemOutcome::Completed);
        self.pay_referrers(
            user,
            RewardReason::CardTwo,
            |referral| threshold_payouts(referral, &snapshot, &thresholds),
            &mut report,
        )
        .await;
        Ok(report)
    }
}

/// Private API
impl Engine {
    async fn thresholds(&self) -> Result<Thresholds, EngineError> {
        let entries = self.repo.config(&Thresholds::KEYS).await?;
        Ok(Thresholds::from_config(&entries))
    }

    async fn poll_card(&self, user: &User, snapshot: &UserSnapshot) -> ItemReport {
        if user.card.len() < MIN_CARD_ID_LEN {
            warn!(
                user = user.id,
                reason = %DataIntegrityError::MissingCardId(user.id),
                "card poll skipped"
            );
            return ItemReport::new(user.id, ItemOutcome::Skipped);
        }

        let info = match self.issuer.query_card(&user.card).await {
            Ok(info) => info,
            Err(e) => {
                warn!(user = user.id, card = %user.card, reason = %e, "card query failed");
                return self.compensate(user, FailureKind::Issuer).await;
            }
        };

        if info.status.is_in_flight() {
            debug!(user = user.id, card = %user.card, "card still in progress");
            return ItemReport::new(user.id, ItemOutcome::Deferred);
        }
        if let CardStatus::Other(status) = &info.status {
            warn!(user = user.id, card = %user.card, %status, "card activation failed");
            return self.compensate(user, FailureKind::Issuer).await;
        }

        let activation = Mutation::MarkCardActive {
            user_id: user.id,
            card_number: info.pan,
        };
        if let Err(e) = self.repo.commit(vec![activation]).await {
            warn!(user = user.id, card = %user.card, reason = %e, "card activation not persisted");
            return ItemReport::new(user.id, ItemOutcome::Failed(FailureKind::Persistence));
        }
        info!(user = user.id, card = %user.card, "card active");

        // the activation above stands even if some reward writes fail
        let mut report = ItemReport::new(user.id, ItemOutcome::Completed);
        self.pay_referrers(
            user,
            RewardReason::CardActivation,
            |referral| differential_payouts(user.vip_two, referral, snapshot),
            &mut report,
        )
        .await;
        report
    }

    async fn reward_application(
        &self,
        application: &CardTwo,
        snapshot: &UserSnapshot,
        thresholds: &Thresholds,
    ) -> ItemReport {
        // consumed before paying, so a failure below can never cause a second payout
        let consume = Mutation::MarkCardTwoProcessed { id: application.id };
        if let Err(e) = self.repo.commit(vec![consume]).await {
            warn!(
                application = application.id,
                user = application.user_id,
                reason = %e,
                "card application not consumed"
            );
            return ItemReport::new(
                application.user_id,
                ItemOutcome::Failed(FailureKind::Persistence),
            );
        }

        let Some(user) = snapshot.get(application.user_id) else {
            warn!(
                application = application.id,
                reason = %DataIntegrityError::MissingUser(application.user_id),
                "card application dropped"
            );
            return ItemReport::new(
                application.user_id,
                ItemOutcome::Failed(FailureKind::DataIntegrity),
            );
        };

        let mut report = ItemReport::new(user.id, ItemOutcome::Completed);
        self.pay_referrers(
            user,
            RewardReason::CardTwo,
            |referral| threshold_payouts(referral, snapshot, thresholds),
            &mut report,
        )
        .await;
        report
    }
}
