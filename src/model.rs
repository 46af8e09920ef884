//! Core domain types for the card issuance and commission engine.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::Amount;

/// User identifier.
pub type UserId = u64;

/// Where a user stands in the card issuance workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IssuanceStatus {
    /// No card requested.
    #[default]
    Idle,
    /// Card fee reserved, waiting for the orchestrator.
    Requested,
    /// Card order placed with the issuer, waiting for activation.
    Doing,
    /// Card is active.
    Success,
    /// Workflow failed and the fee was refunded.
    Refunded,
}

/// A platform user with issuance, commission and aggregate state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: UserId,
    pub address: String,

    /// Issuer-side holder reference.
    pub card_user_id: String,
    pub product_id: String,
    pub max_card_quota: u64,
    /// Issuer card identifier, set once the order is placed.
    pub card: String,
    pub card_order_id: String,
    pub card_number: String,
    pub issuance: IssuanceStatus,

    /// Tier used by the differential payout.
    pub vip: u64,
    /// Commission pool; 0 means the base pool.
    pub vip_two: u64,
    /// Tier used by the threshold payout (0..=3).
    pub vip_three: u64,
    /// Whether the user may hold a VIP tier at all.
    pub can_vip: bool,

    /// Aggregate deposit volume of the user's downline.
    pub my_total_amount: Amount,
    /// Available balance.
    pub amount: Amount,
    /// Referred users counted by the operator.
    pub user_count: u64,
}

/// A user's position in the referral tree.
///
/// `ancestors` is ordered root first, direct upline last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferralRecord {
    pub user_id: UserId,
    pub ancestors: Vec<UserId>,
}

impl ReferralRecord {
    /// Segment separator of the legacy encoded ancestry path.
    pub const LEGACY_DELIMITER: char = 'D';

    pub fn new(user_id: UserId, ancestors: Vec<UserId>) -> Self {
        Self { user_id, ancestors }
    }

    /// Convert a legacy `D`-delimited path (e.g. `"D1D7D42"`) into an explicit list.
    ///
    /// Segments that are empty, non-numeric or zero carry no ancestor and are dropped.
    pub fn from_legacy_code(user_id: UserId, code: &str) -> Self {
        let ancestors = code
            .split(Self::LEGACY_DELIMITER)
            .filter_map(|segment| segment.trim().parse::<UserId>().ok())
            .filter(|id| *id > 0)
            .collect();
        Self { user_id, ancestors }
    }

    /// Ancestors from the direct upline toward the root.
    pub fn upline_first(&self) -> impl Iterator<Item = UserId> + '_ {
        self.ancestors.iter().rev().copied()
    }
}

/// Why a ledger entry was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardReason {
    /// VIP-differential commission on a card activation.
    CardActivation,
    /// Threshold-capped commission on a second card.
    CardTwo,
}

impl RewardReason {
    pub fn code(self) -> u64 {
        match self {
            RewardReason::CardActivation => 1,
            RewardReason::CardTwo => 2,
        }
    }
}

impl fmt::Display for RewardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewardReason::CardActivation => write!(f, "card_activation"),
            RewardReason::CardTwo => write!(f, "card_two"),
        }
    }
}

/// Immutable commission ledger entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Reward {
    pub user_id: UserId,
    pub amount: Amount,
    pub reason: RewardReason,
    /// Payee tier at the time of payout.
    pub tier: u64,
    /// Address of the user whose card triggered the payout.
    pub address: String,
    pub created_at: DateTime<Utc>,
}

/// Card attributes mirrored from the issuer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardRecord {
    pub card_id: String,
    pub account_id: String,
    pub cardholder_id: String,
    pub currency: String,
    pub bin: String,
    pub status: String,
    pub card_mode: String,
    pub card_last_four: String,
    /// Issuer creation time in milliseconds.
    pub issuer_create_time: i64,
    pub user_id: UserId,
    /// CardTwo application the record was synced for, if any.
    pub application_id: Option<u64>,
}

/// A physical card application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardTwo {
    pub id: u64,
    pub user_id: UserId,
    pub card_id: String,
    /// Set once the threshold payout pass has consumed this application.
    pub processed: bool,
}

/// Mutable key/value tunable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawStatus {
    Pending,
    Doing,
    Success,
}

impl fmt::Display for WithdrawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WithdrawStatus::Pending => write!(f, "pending"),
            WithdrawStatus::Doing => write!(f, "doing"),
            WithdrawStatus::Success => write!(f, "success"),
        }
    }
}

/// A user payout request.
#[derive(Debug, Clone, PartialEq)]
pub struct Withdraw {
    pub id: u64,
    pub user_id: UserId,
    pub amount: Amount,
    pub address: String,
    pub status: WithdrawStatus,
}

/// Origin of a deposit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositSource {
    /// Credited by the platform itself; no deposit ledger entry is kept.
    System,
    /// Observed on chain under the given transaction hash.
    Chain { hash: String },
}

/// A confirmed deposit, input of the rollup.
#[derive(Debug, Clone, PartialEq)]
pub struct Deposit {
    pub user_id: UserId,
    pub amount: Amount,
    pub source: DepositSource,
}

/// Input of the ledger replay.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    Deposit(Deposit),
    /// Card of `user_id` went active; pay the differential commission.
    Activation { user_id: UserId },
    /// Second card of `user_id` was issued; pay the threshold commission.
    CardTwo { user_id: UserId },
}

/// Persisted record of an external deposit.
#[derive(Debug, Clone, PartialEq)]
pub struct DepositRecord {
    pub user_id: UserId,
    pub amount: Amount,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

/// Kind of an issuer notification kept in the card event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardEventKind {
    Holder,
    CardCreated,
    Recharge,
}

impl CardEventKind {
    pub fn code(self) -> u64 {
        match self {
            CardEventKind::Holder => 1,
            CardEventKind::CardCreated => 2,
            CardEventKind::Recharge => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CardEvent {
    pub user_id: UserId,
    pub kind: CardEventKind,
    pub remark: String,
    pub created_at: DateTime<Utc>,
}
