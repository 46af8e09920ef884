//! Boundary of the external card issuer.
//!
//! The wire format and request signing live behind [`CardIssuer`]; the engine
//! only sees the decoded results below.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub type DynCardIssuer = Arc<dyn CardIssuer + Send + Sync>;

/// Failure reported by the issuer client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IssuerError {
    #[error("issuer rejected request with code {code}: {message}")]
    Rejected { code: i64, message: String },

    #[error("issuer transport error: {0}")]
    Transport(String),

    #[error("malformed issuer response: {0}")]
    Malformed(String),

    #[error("issuer client is not configured")]
    Unavailable,
}

/// Holder verification state on the issuer side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HolderStatus {
    Active,
    Pending,
    Other(String),
}

impl HolderStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "active" => HolderStatus::Active,
            "pending" => HolderStatus::Pending,
            other => HolderStatus::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holder {
    pub holder_id: String,
    pub status: HolderStatus,
}

/// Result of a successful card creation request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreatedCard {
    pub card_id: String,
    pub card_order_id: String,
}

/// Card lifecycle state on the issuer side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardStatus {
    Active,
    Pending,
    Progress,
    Other(String),
}

impl CardStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "ACTIVE" => CardStatus::Active,
            "PENDING" => CardStatus::Pending,
            "PROGRESS" => CardStatus::Progress,
            other => CardStatus::Other(other.to_string()),
        }
    }

    /// Order accepted but not settled yet.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, CardStatus::Pending | CardStatus::Progress)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardInfo {
    pub status: CardStatus,
    /// Full card number, present once active.
    pub pan: String,
}

/// Filter for card listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardListQuery {
    pub account_id: String,
    pub card_id: String,
    pub page: u32,
    pub limit: u32,
}

/// One entry of a card listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListedCard {
    pub id: String,
    pub account_id: String,
    pub cardholder_id: String,
    pub currency: String,
    pub bin: String,
    pub status: String,
    pub card_mode: String,
    pub card_last_four: String,
    /// Milliseconds since epoch, as sent by the issuer.
    pub create_time: String,
}

/// Notification pushed by the issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuerCallback {
    HolderUpdated { holder_id: String, remark: String },
    CardCreated { card_id: String, remark: String },
    Recharged { card_id: String, remark: String },
}

#[async_trait]
pub trait CardIssuer {
    async fn query_holder(&self, holder_id: u64, product_id: u64) -> Result<Holder, IssuerError>;

    async fn create_card(&self, product_id: u64, holder_id: u64)
    -> Result<CreatedCard, IssuerError>;

    async fn query_card(&self, card_id: &str) -> Result<CardInfo, IssuerError>;

    async fn list_cards(&self, query: &CardListQuery) -> Result<Vec<ListedCard>, IssuerError>;
}

/// Issuer used when no client is configured; every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineIssuer;

#[async_trait]
impl CardIssuer for OfflineIssuer {
    async fn query_holder(&self, _holder_id: u64, _product_id: u64) -> Result<Holder, IssuerError> {
        Err(IssuerError::Unavailable)
    }

    async fn create_card(
        &self,
        _product_id: u64,
        _holder_id: u64,
    ) -> Result<CreatedCard, IssuerError> {
        Err(IssuerError::Unavailable)
    }

    async fn query_card(&self, _card_id: &str) -> Result<CardInfo, IssuerError> {
        Err(IssuerError::Unavailable)
    }

    async fn list_cards(&self, _query: &CardListQuery) -> Result<Vec<ListedCard>, IssuerError> {
        Err(IssuerError::Unavailable)
    }
}
