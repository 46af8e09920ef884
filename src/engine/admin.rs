//! Operator-driven operations: withdrawals, tier and config edits, card
//! synchronisation and issuer callbacks.

use chrono::Utc;
use tracing::{info, warn};

use crate::issuer::{CardListQuery, IssuerCallback};
use crate::model::{
    CardEvent, CardEventKind, CardRecord, User, UserId, Withdraw, WithdrawStatus,
};
use crate::repository::Mutation;

use super::rewards::THRESHOLD_TIER_CAP;
use super::{Engine, EngineError, WithdrawError};

/// Issuer card ids shorter than this are not synced.
const MIN_SYNC_CARD_ID_LEN: usize = 10;
const SYNC_PAGE_LIMIT: u32 = 10;

pub const PHYSICAL_CARD: &str = "PHYSICAL_CARD";
pub const VIRTUAL_CARD: &str = "VIRTUAL_CARD";

// Withdrawals
impl Engine {
    pub async fn next_withdrawal(&self) -> Result<Option<Withdraw>, EngineError> {
        Ok(self.repo.first_pending_withdraw().await?)
    }

    /// `pending -> doing`
    pub async fn start_withdrawal(&self, id: u64) -> Result<Withdraw, EngineError> {
        self.transition_withdraw(id, WithdrawStatus::Pending, WithdrawStatus::Doing)
            .await
    }

    /// `doing -> success`
    pub async fn complete_withdrawal(&self, id: u64) -> Result<Withdraw, EngineError> {
        self.transition_withdraw(id, WithdrawStatus::Doing, WithdrawStatus::Success)
            .await
    }

    async fn transition_withdraw(
        &self,
        id: u64,
        from: WithdrawStatus,
        to: WithdrawStatus,
    ) -> Result<Withdraw, EngineError> {
        let mut withdraw = self
            .repo
            .withdraw(id)
            .await?
            .ok_or(WithdrawError::NotFound(id))?;
        if withdraw.status != from {
            return Err(WithdrawError::InvalidTransition {
                id,
                from: withdraw.status,
                to,
            }
            .into());
        }

        self.repo
            .commit(vec![Mutation::SetWithdrawStatus { id, status: to }])
            .await?;
        withdraw.status = to;
        info!(withdraw = id, user = withdraw.user_id, status = %to, "withdrawal updated");
        Ok(withdraw)
    }
}

// Tiers, counters and config
impl Engine {
    /// Set a user's threshold tier. Values outside `1..=3` store 0.
    pub async fn set_vip_three(&self, user_id: UserId, tier: u64) -> Result<u64, EngineError> {
        let tier = if (1..=THRESHOLD_TIER_CAP).contains(&tier) {
            tier
        } else {
            0
        };
        self.ensure_user(user_id).await?;

        self.repo
            .commit(vec![Mutation::SetVipThree {
                user_id,
                vip_three: tier,
            }])
            .await?;
        info!(user = user_id, tier, "vip three updated");
        Ok(tier)
    }

    /// Allow or forbid the user to hold a VIP tier.
    pub async fn set_can_vip(&self, user_id: UserId, can_vip: bool) -> Result<(), EngineError> {
        self.ensure_user(user_id).await?;
        self.repo
            .commit(vec![Mutation::SetCanVip { user_id, can_vip }])
            .await?;
        info!(user = user_id, can_vip, "can vip updated");
        Ok(())
    }

    /// Count one more referred user. Returns the new count.
    pub async fn set_user_count(&self, user_id: UserId) -> Result<u64, EngineError> {
        let user = self.ensure_user(user_id).await?;
        self.repo
            .commit(vec![Mutation::IncrementUserCount { user_id }])
            .await?;
        let count = user.user_count + 1;
        info!(user = user_id, count, "user count updated");
        Ok(count)
    }

    pub async fn update_config(&self, key: &str, value: &str) -> Result<(), EngineError> {
        self.repo
            .commit(vec![Mutation::UpdateConfig {
                key: key.to_string(),
                value: value.to_string(),
            }])
            .await?;
        info!(key, value, "config updated");
        Ok(())
    }

    async fn ensure_user(&self, user_id: UserId) -> Result<User, EngineError> {
        self.repo
            .user(user_id)
            .await?
            .ok_or(EngineError::UnknownUser(user_id))
    }
}

// Card synchronisation
impl Engine {
    /// Mirror active physical cards of every card application.
    pub async fn sync_physical_cards(&self) -> Result<usize, EngineError> {
        let mut inserted = 0;
        for application in self.repo.card_twos().await? {
            if application.card_id.len() < MIN_SYNC_CARD_ID_LEN {
                warn!(
                    application = application.id,
                    card = %application.card_id,
                    "card id too short, not synced"
                );
                continue;
            }
            inserted += self
                .sync_card(
                    application.user_id,
                    Some(application.id),
                    &application.card_id,
                    PHYSICAL_CARD,
                )
                .await;
        }
        Ok(inserted)
    }

    /// Mirror active virtual cards of users with an order in flight.
    pub async fn sync_virtual_cards(&self) -> Result<usize, EngineError> {
        let mut inserted = 0;
        for user in self.repo.users_with_order_in_flight().await? {
            if user.card_number.len() < MIN_SYNC_CARD_ID_LEN {
                warn!(
                    user = user.id,
                    card = %user.card_number,
                    "card number too short, not synced"
                );
                continue;
            }
            inserted += self
                .sync_card(user.id, None, &user.card_number, VIRTUAL_CARD)
                .await;
        }
        Ok(inserted)
    }

    async fn sync_card(
        &self,
        user_id: UserId,
        application_id: Option<u64>,
        card_id: &str,
        mode: &str,
    ) -> usize {
        let query = CardListQuery {
            account_id: self.settings.issuer_account_id.clone(),
            card_id: card_id.to_string(),
            page: 1,
            limit: SYNC_PAGE_LIMIT,
        };
        let cards = match self.issuer.list_cards(&query).await {
            Ok(cards) => cards,
            Err(e) => {
                warn!(user = user_id, card = card_id, reason = %e, "card listing failed");
                return 0;
            }
        };

        let mut inserted = 0;
        for card in cards {
            if card.status != "ACTIVE" {
                continue;
            }
            if card.card_mode != mode {
                warn!(
                    user = user_id,
                    card = %card.id,
                    mode = %card.card_mode,
                    "unexpected card mode"
                );
                continue;
            }
            // a bad timestamp means the listing cannot be trusted; stop here
            let create_time = match card.create_time.parse::<i64>() {
                Ok(t) if t > 0 => t,
                _ => {
                    warn!(
                        user = user_id,
                        card = %card.id,
                        create_time = %card.create_time,
                        "invalid create time, sync stopped"
                    );
                    break;
                }
            };

            let record = CardRecord {
                card_id: card.id,
                account_id: card.account_id,
                cardholder_id: card.cardholder_id,
                currency: card.currency,
                bin: card.bin,
                status: card.status,
                card_mode: card.card_mode,
                card_last_four: card.card_last_four,
                issuer_create_time: create_time,
                user_id,
                application_id,
            };
            let card_id = record.card_id.clone();
            match self.repo.commit(vec![Mutation::InsertCardRecord(record)]).await {
                Ok(()) => inserted += 1,
                Err(e) => {
                    warn!(user = user_id, card = %card_id, reason = %e, "card record not stored")
                }
            }
        }
        inserted
    }
}

// Issuer callbacks
impl Engine {
    /// Append an issuer notification to the owning user's card event log.
    ///
    /// Returns `false` when no user owns the referenced holder or card.
    pub async fn record_callback(&self, callback: IssuerCallback) -> Result<bool, EngineError> {
        let (user, kind, remark) = match callback {
            IssuerCallback::HolderUpdated { holder_id, remark } => (
                self.repo.user_by_holder(&holder_id).await?,
                CardEventKind::Holder,
                remark,
            ),
            IssuerCallback::CardCreated { card_id, remark } => (
                self.repo.user_by_card(&card_id).await?,
                CardEventKind::CardCreated,
                remark,
            ),
            IssuerCallback::Recharged { card_id, remark } => (
                self.repo.user_by_card(&card_id).await?,
                CardEventKind::Recharge,
                remark,
            ),
        };

        let Some(user) = user else {
            warn!(kind = kind.code(), %remark, "callback for unknown user ignored");
            return Ok(false);
        };

        let event = CardEvent {
            user_id: user.id,
            kind,
            remark,
            created_at: Utc::now(),
        };
        self.repo
            .commit(vec![Mutation::InsertCardEvent(event)])
            .await?;
        info!(user = user.id, kind = kind.code(), "issuer callback recorded");
        Ok(true)
    }
}
