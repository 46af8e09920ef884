//! Persistence boundary.
//!
//! Reads are single queries. Writes are expressed as [`Mutation`]s and
//! handed to [`Repository::commit`], which applies the whole batch or none
//! of it.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::Amount;
use crate::model::{
    CardEvent, CardRecord, CardTwo, ConfigEntry, DepositRecord, ReferralRecord, Reward, User,
    UserId, Withdraw, WithdrawStatus,
};

pub type DynRepository = Arc<dyn Repository + Send + Sync>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("user {0} not found")]
    UnknownUser(UserId),

    #[error("card application {0} not found")]
    UnknownApplication(u64),

    #[error("withdrawal {0} not found")]
    UnknownWithdraw(u64),

    #[error("config key '{0}' not found")]
    UnknownConfig(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

/// A single write. A batch of them forms one transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Issuer accepted the card order; the user moves to `Doing`.
    RecordCardOrder {
        user_id: UserId,
        card_id: String,
        card_order_id: String,
    },
    /// Card went active; the user moves to `Success`.
    MarkCardActive { user_id: UserId, card_number: String },
    /// Credit the reserved card fee back and move the user to `Refunded`.
    Refund { user_id: UserId, amount: Amount },
    /// Append a ledger entry and credit the payee.
    InsertReward(Reward),
    /// Add to a user's aggregate downline volume.
    AddTeamVolume { user_id: UserId, amount: Amount },
    InsertDeposit(DepositRecord),
    /// Consume a card application for the threshold payout.
    MarkCardTwoProcessed { id: u64 },
    InsertCardRecord(CardRecord),
    InsertCardEvent(CardEvent),
    SetWithdrawStatus { id: u64, status: WithdrawStatus },
    SetVipThree { user_id: UserId, vip_three: u64 },
    SetCanVip { user_id: UserId, can_vip: bool },
    IncrementUserCount { user_id: UserId },
    UpdateConfig { key: String, value: String },
}

#[async_trait]
pub trait Repository {
    /// Users with a reserved card fee waiting for issuance.
    async fn users_requesting_card(&self) -> Result<Vec<User>, PersistenceError>;

    /// Users whose card order is placed but not yet active.
    async fn users_with_order_in_flight(&self) -> Result<Vec<User>, PersistenceError>;

    async fn all_users(&self) -> Result<Vec<User>, PersistenceError>;

    async fn user(&self, id: UserId) -> Result<Option<User>, PersistenceError>;

    async fn user_by_holder(&self, holder_id: &str) -> Result<Option<User>, PersistenceError>;

    async fn user_by_card(&self, card_id: &str) -> Result<Option<User>, PersistenceError>;

    async fn referral(&self, user_id: UserId) -> Result<Option<ReferralRecord>, PersistenceError>;

    async fn config(&self, keys: &[&str]) -> Result<Vec<ConfigEntry>, PersistenceError>;

    /// Card applications whose threshold payout has not run yet.
    async fn unprocessed_card_twos(&self) -> Result<Vec<CardTwo>, PersistenceError>;

    async fn card_twos(&self) -> Result<Vec<CardTwo>, PersistenceError>;

    async fn withdraw(&self, id: u64) -> Result<Option<Withdraw>, PersistenceError>;

    /// Oldest withdrawal still waiting for an operator.
    async fn first_pending_withdraw(&self) -> Result<Option<Withdraw>, PersistenceError>;

    /// Apply all mutations atomically.
    async fn commit(&self, mutations: Vec<Mutation>) -> Result<(), PersistenceError>;
}
