#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use card_eng::issuer::{
    CardInfo, CardIssuer, CardListQuery, CardStatus, CreatedCard, Holder, HolderStatus,
    IssuerError, ListedCard,
};
use card_eng::model::{IssuanceStatus, User, UserId};

/// Issuer double answering from scripted responses. Anything unscripted is a
/// transport error.
#[derive(Default)]
pub struct ScriptedIssuer {
    holders: Mutex<HashMap<u64, Result<Holder, IssuerError>>>,
    orders: Mutex<HashMap<u64, Result<CreatedCard, IssuerError>>>,
    cards: Mutex<HashMap<String, Result<CardInfo, IssuerError>>>,
    listings: Mutex<HashMap<String, Vec<ListedCard>>>,
    holder_delay: Option<Duration>,
    calls: AtomicUsize,
    holder_queries: AtomicUsize,
}

fn unscripted(what: &str) -> IssuerError {
    IssuerError::Transport(format!("unscripted {what}"))
}

impl ScriptedIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holder(self, holder_id: u64, status: &str) -> Self {
        self.holders.lock().unwrap().insert(
            holder_id,
            Ok(Holder {
                holder_id: holder_id.to_string(),
                status: HolderStatus::parse(status),
            }),
        );
        self
    }

    pub fn holder_error(self, holder_id: u64, error: IssuerError) -> Self {
        self.holders.lock().unwrap().insert(holder_id, Err(error));
        self
    }

    pub fn creates(self, holder_id: u64, card_id: &str, card_order_id: &str) -> Self {
        self.orders.lock().unwrap().insert(
            holder_id,
            Ok(CreatedCard {
                card_id: card_id.to_string(),
                card_order_id: card_order_id.to_string(),
            }),
        );
        self
    }

    pub fn card(self, card_id: &str, status: &str, pan: &str) -> Self {
        self.cards.lock().unwrap().insert(
            card_id.to_string(),
            Ok(CardInfo {
                status: CardStatus::parse(status),
                pan: pan.to_string(),
            }),
        );
        self
    }

    pub fn card_error(self, card_id: &str, error: IssuerError) -> Self {
        self.cards
            .lock()
            .unwrap()
            .insert(card_id.to_string(), Err(error));
        self
    }

    pub fn listing(self, card_id: &str, cards: Vec<ListedCard>) -> Self {
        self.listings
            .lock()
            .unwrap()
            .insert(card_id.to_string(), cards);
        self
    }

    /// Make every holder query take `delay`.
    pub fn slow_holder_queries(mut self, delay: Duration) -> Self {
        self.holder_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn holder_queries(&self) -> usize {
        self.holder_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CardIssuer for ScriptedIssuer {
    async fn query_holder(&self, holder_id: u64, _product_id: u64) -> Result<Holder, IssuerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.holder_queries.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.holder_delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.holders.lock().unwrap().get(&holder_id).cloned();
        scripted.unwrap_or_else(|| Err(unscripted("holder")))
    }

    async fn create_card(
        &self,
        _product_id: u64,
        holder_id: u64,
    ) -> Result<CreatedCard, IssuerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.orders.lock().unwrap().get(&holder_id).cloned();
        scripted.unwrap_or_else(|| Err(unscripted("card order")))
    }

    async fn query_card(&self, card_id: &str) -> Result<CardInfo, IssuerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.cards.lock().unwrap().get(card_id).cloned();
        scripted.unwrap_or_else(|| Err(unscripted("card")))
    }

    async fn list_cards(&self, query: &CardListQuery) -> Result<Vec<ListedCard>, IssuerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.listings.lock().unwrap().get(&query.card_id).cloned();
        scripted.ok_or_else(|| unscripted("listing"))
    }
}

pub const HOLDER: u64 = 100200;
pub const PRODUCT: &str = "300400";

/// A user with a reserved card fee and valid issuer references.
pub fn requesting(id: UserId, holder_id: u64) -> User {
    User {
        id,
        address: format!("0x{id:02}"),
        card_user_id: holder_id.to_string(),
        product_id: PRODUCT.to_string(),
        max_card_quota: 1,
        issuance: IssuanceStatus::Requested,
        ..Default::default()
    }
}

/// A user whose card order is in flight.
pub fn ordered(id: UserId, card: &str) -> User {
    User {
        id,
        address: format!("0x{id:02}"),
        card: card.to_string(),
        card_order_id: format!("order-{id}"),
        issuance: IssuanceStatus::Doing,
        ..Default::default()
    }
}

/// Referral chain member with the given tiers.
pub fn member(id: UserId, vip: u64, vip_two: u64, vip_three: u64) -> User {
    User {
        id,
        address: format!("0x{id:02}"),
        vip,
        vip_two,
        vip_three,
        ..Default::default()
    }
}

pub fn listed(id: &str, status: &str, mode: &str, create_time: &str) -> ListedCard {
    ListedCard {
        id: id.to_string(),
        account_id: "acct-1".to_string(),
        cardholder_id: HOLDER.to_string(),
        currency: "USD".to_string(),
        bin: "411111".to_string(),
        status: status.to_string(),
        card_mode: mode.to_string(),
        card_last_four: "4242".to_string(),
        create_time: create_time.to_string(),
    }
}
