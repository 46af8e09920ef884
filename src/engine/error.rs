//! Error types for the issuance and commission jobs.

use thiserror::Error;

use crate::Amount;
use crate::issuer::IssuerError;
use crate::model::{UserId, WithdrawStatus};
use crate::repository::PersistenceError;

use super::Job;

/// Top-level error returned by the public engine operations.
///
/// Per-item failures inside a job run never surface here; they are recorded
/// in the run's [`RunSummary`](super::RunSummary).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Persistence(#[from] PersistenceError),

    #[error("{0}")]
    Issuer(#[from] IssuerError),

    #[error("{0}")]
    Withdraw(#[from] WithdrawError),

    #[error("user {0} not found")]
    UnknownUser(UserId),

    #[error("deposit of {amount} for user {user} is not positive")]
    NonPositiveDeposit { user: UserId, amount: Amount },

    #[error("{0} is already running")]
    Busy(Job),
}

/// Issuance prerequisites that failed before any issuer call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PreflightError {
    #[error("holder reference missing")]
    MissingHolder,
    #[error("holder reference '{0}' is not a positive integer")]
    InvalidHolder(String),
    #[error("card quota is zero")]
    NoCardQuota,
    #[error("product id missing")]
    MissingProduct,
    #[error("product id '{0}' is not a positive integer")]
    InvalidProduct(String),
}

/// Referral data that contradicts what the payout walks expect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DataIntegrityError {
    #[error("ancestor {user} has tier {tier} above pool cap {cap}")]
    TierAboveCap { user: UserId, tier: u64, cap: u64 },

    #[error("referral chain of user {referrer} references missing user {missing}")]
    MissingAncestor { referrer: UserId, missing: UserId },

    #[error("user {0} has no referral record")]
    MissingReferral(UserId),

    #[error("user {0} is missing from the user table")]
    MissingUser(UserId),

    #[error("order of user {0} has no card id")]
    MissingCardId(UserId),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WithdrawError {
    #[error("withdrawal {0} not found")]
    NotFound(u64),

    #[error("withdrawal {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: u64,
        from: WithdrawStatus,
        to: WithdrawStatus,
    },
}

/// Classification of a per-item failure, kept in run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Preflight,
    Issuer,
    Persistence,
    DataIntegrity,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Preflight => "preflight",
            FailureKind::Issuer => "issuer",
            FailureKind::Persistence => "persistence",
            FailureKind::DataIntegrity => "data integrity",
        };
        f.write_str(name)
    }
}
