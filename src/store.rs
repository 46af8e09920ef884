//! In-process [`Repository`] implementation.
//!
//! Backs the replay binary and the test suites. A commit works on a copy of
//! the state and swaps it in only if every mutation applied cleanly.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use crate::model::{
    CardEvent, CardRecord, CardTwo, ConfigEntry, DepositRecord, IssuanceStatus, ReferralRecord,
    Reward, User, UserId, Withdraw, WithdrawStatus,
};
use crate::repository::{Mutation, PersistenceError, Repository};

/// Predicate selecting mutations that should fail to commit.
pub type FailurePredicate = Box<dyn Fn(&Mutation) -> bool + Send + Sync>;

#[derive(Debug, Default, Clone)]
struct State {
    users: BTreeMap<UserId, User>,
    referrals: HashMap<UserId, ReferralRecord>,
    rewards: Vec<Reward>,
    deposits: Vec<DepositRecord>,
    card_twos: BTreeMap<u64, CardTwo>,
    cards: Vec<CardRecord>,
    card_events: Vec<CardEvent>,
    withdraws: BTreeMap<u64, Withdraw>,
    config: BTreeMap<String, String>,
}

impl State {
    fn user_mut(&mut self, id: UserId) -> Result<&mut User, PersistenceError> {
        self.users
            .get_mut(&id)
            .ok_or(PersistenceError::UnknownUser(id))
    }

    fn apply(&mut self, mutation: Mutation) -> Result<(), PersistenceError> {
        match mutation {
            Mutation::RecordCardOrder {
                user_id,
                card_id,
                card_order_id,
            } => {
                let user = self.user_mut(user_id)?;
                user.card = card_id;
                user.card_order_id = card_order_id;
                user.issuance = IssuanceStatus::Doing;
            }
            Mutation::MarkCardActive {
                user_id,
                card_number,
            } => {
                let user = self.user_mut(user_id)?;
                user.card_number = card_number;
                user.issuance = IssuanceStatus::Success;
            }
            Mutation::Refund { user_id, amount } => {
                let user = self.user_mut(user_id)?;
                user.amount += amount;
                user.card.clear();
                user.card_order_id.clear();
                user.issuance = IssuanceStatus::Refunded;
            }
            Mutation::InsertReward(reward) => {
                self.user_mut(reward.user_id)?.amount += reward.amount;
                self.rewards.push(reward);
            }
            Mutation::AddTeamVolume { user_id, amount } => {
                self.user_mut(user_id)?.my_total_amount += amount;
            }
            Mutation::InsertDeposit(record) => {
                self.user_mut(record.user_id)?;
                self.deposits.push(record);
            }
            Mutation::MarkCardTwoProcessed { id } => {
                self.card_twos
                    .get_mut(&id)
                    .ok_or(PersistenceError::UnknownApplication(id))?
                    .processed = true;
            }
            Mutation::InsertCardRecord(record) => {
                self.user_mut(record.user_id)?;
                self.cards.push(record);
            }
            Mutation::InsertCardEvent(event) => {
                self.user_mut(event.user_id)?;
                self.card_events.push(event);
            }
            Mutation::SetWithdrawStatus { id, status } => {
                self.withdraws
                    .get_mut(&id)
                    .ok_or(PersistenceError::UnknownWithdraw(id))?
                    .status = status;
            }
            Mutation::SetVipThree { user_id, vip_three } => {
                self.user_mut(user_id)?.vip_three = vip_three;
            }
            Mutation::SetCanVip { user_id, can_vip } => {
                self.user_mut(user_id)?.can_vip = can_vip;
            }
            Mutation::IncrementUserCount { user_id } => {
                self.user_mut(user_id)?.user_count += 1;
            }
            Mutation::UpdateConfig { key, value } => {
                let entry = self
                    .config
                    .get_mut(&key)
                    .ok_or(PersistenceError::UnknownConfig(key))?;
                *entry = value;
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    fail_when: Mutex<Option<FailurePredicate>>,
}

/// Seeding
impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.state.get_mut().users.insert(user.id, user);
        self
    }

    pub fn with_referral(mut self, record: ReferralRecord) -> Self {
        self.state
            .get_mut()
            .referrals
            .insert(record.user_id, record);
        self
    }

    pub fn with_card_two(mut self, card_two: CardTwo) -> Self {
        self.state.get_mut().card_twos.insert(card_two.id, card_two);
        self
    }

    pub fn with_withdraw(mut self, withdraw: Withdraw) -> Self {
        self.state.get_mut().withdraws.insert(withdraw.id, withdraw);
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.state
            .get_mut()
            .config
            .insert(key.into(), value.into());
        self
    }

    /// Make every commit containing a matching mutation fail.
    pub async fn fail_when(&self, predicate: impl Fn(&Mutation) -> bool + Send + Sync + 'static) {
        *self.fail_when.lock().await = Some(Box::new(predicate));
    }

    pub async fn clear_failures(&self) {
        *self.fail_when.lock().await = None;
    }
}

/// Inspection
impl InMemoryStore {
    pub async fn rewards(&self) -> Vec<Reward> {
        self.state.lock().await.rewards.clone()
    }

    pub async fn deposits(&self) -> Vec<DepositRecord> {
        self.state.lock().await.deposits.clone()
    }

    pub async fn card_records(&self) -> Vec<CardRecord> {
        self.state.lock().await.cards.clone()
    }

    pub async fn card_events(&self) -> Vec<CardEvent> {
        self.state.lock().await.card_events.clone()
    }

    pub async fn config_value(&self, key: &str) -> Option<String> {
        self.state.lock().await.config.get(key).cloned()
    }
}

#[async_trait]
impl Repository for InMemoryStore {
    async fn users_requesting_card(&self) -> Result<Vec<User>, PersistenceError> {
        Ok(self.users_in(IssuanceStatus::Requested).await)
    }

    async fn users_with_order_in_flight(&self) -> Result<Vec<User>, PersistenceError> {
        Ok(self.users_in(IssuanceStatus::Doing).await)
    }

    async fn all_users(&self) -> Result<Vec<User>, PersistenceError> {
        Ok(self.state.lock().await.users.values().cloned().collect())
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, PersistenceError> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn user_by_holder(&self, holder_id: &str) -> Result<Option<User>, PersistenceError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| !u.card_user_id.is_empty() && u.card_user_id == holder_id)
            .cloned())
    }

    async fn user_by_card(&self, card_id: &str) -> Result<Option<User>, PersistenceError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| !u.card.is_empty() && u.card == card_id)
            .cloned())
    }

    async fn referral(&self, user_id: UserId) -> Result<Option<ReferralRecord>, PersistenceError> {
        Ok(self.state.lock().await.referrals.get(&user_id).cloned())
    }

    async fn config(&self, keys: &[&str]) -> Result<Vec<ConfigEntry>, PersistenceError> {
        let state = self.state.lock().await;
        Ok(keys
            .iter()
            .filter_map(|key| {
                state.config.get(*key).map(|value| ConfigEntry {
                    key: key.to_string(),
                    value: value.clone(),
                })
            })
            .collect())
    }

    async fn unprocessed_card_twos(&self) -> Result<Vec<CardTwo>, PersistenceError> {
        let state = self.state.lock().await;
        Ok(state
            .card_twos
            .values()
            .filter(|c| !c.processed)
            .cloned()
            .collect())
    }

    async fn card_twos(&self) -> Result<Vec<CardTwo>, PersistenceError> {
        Ok(self.state.lock().await.card_twos.values().cloned().collect())
    }

    async fn withdraw(&self, id: u64) -> Result<Option<Withdraw>, PersistenceError> {
        Ok(self.state.lock().await.withdraws.get(&id).cloned())
    }

    async fn first_pending_withdraw(&self) -> Result<Option<Withdraw>, PersistenceError> {
        let state = self.state.lock().await;
        Ok(state
            .withdraws
            .values()
            .find(|w| w.status == WithdrawStatus::Pending)
            .cloned())
    }

    async fn commit(&self, mutations: Vec<Mutation>) -> Result<(), PersistenceError> {
        if let Some(predicate) = self.fail_when.lock().await.as_ref() {
            if let Some(m) = mutations.iter().find(|m| predicate(m)) {
                return Err(PersistenceError::Storage(format!("injected failure on {m:?}")));
            }
        }

        let mut state = self.state.lock().await;
        let mut working = state.clone();
        for mutation in mutations {
            working.apply(mutation)?;
        }
        *state = working;
        Ok(())
    }
}

impl InMemoryStore {
    async fn users_in(&self, status: IssuanceStatus) -> Vec<User> {
        let state = self.state.lock().await;
        state
            .users
            .values()
            .filter(|u| u.issuance == status)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Amount;

    fn user(id: UserId) -> User {
        User {
            id,
            address: format!("0x{id:02}"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn commit_applies_batch() {
        let store = InMemoryStore::new().with_user(user(1));
        store
            .commit(vec![
                Mutation::AddTeamVolume {
                    user_id: 1,
                    amount: Amount::from_units(5),
                },
                Mutation::AddTeamVolume {
                    user_id: 1,
                    amount: Amount::from_units(7),
                },
            ])
            .await
            .unwrap();

        let u = store.user(1).await.unwrap().unwrap();
        assert_eq!(u.my_total_amount, Amount::from_units(12));
    }

    #[tokio::test]
    async fn failed_mutation_rolls_back_whole_batch() {
        let store = InMemoryStore::new().with_user(user(1));
        let result = store
            .commit(vec![
                Mutation::AddTeamVolume {
                    user_id: 1,
                    amount: Amount::from_units(5),
                },
                Mutation::AddTeamVolume {
                    user_id: 99,
                    amount: Amount::from_units(5),
                },
            ])
            .await;

        assert_eq!(result, Err(PersistenceError::UnknownUser(99)));
        let u = store.user(1).await.unwrap().unwrap();
        assert_eq!(u.my_total_amount, Amount::ZERO);
    }

    #[tokio::test]
    async fn injected_failure_blocks_matching_commits() {
        let store = InMemoryStore::new().with_user(user(1));
        store
            .fail_when(|m| matches!(m, Mutation::SetVipThree { .. }))
            .await;

        let result = store
            .commit(vec![Mutation::SetVipThree {
                user_id: 1,
                vip_three: 2,
            }])
            .await;
        assert!(matches!(result, Err(PersistenceError::Storage(_))));

        store.clear_failures().await;
        store
            .commit(vec![Mutation::SetVipThree {
                user_id: 1,
                vip_three: 2,
            }])
            .await
            .unwrap();
        assert_eq!(store.user(1).await.unwrap().unwrap().vip_three, 2);
    }

    #[tokio::test]
    async fn refund_credits_balance_and_clears_order() {
        let mut u = user(1);
        u.card = "card-1".to_string();
        u.card_order_id = "order-1".to_string();
        u.issuance = IssuanceStatus::Doing;
        let store = InMemoryStore::new().with_user(u);

        store
            .commit(vec![Mutation::Refund {
                user_id: 1,
                amount: Amount::from_units(30),
            }])
            .await
            .unwrap();

        let u = store.user(1).await.unwrap().unwrap();
        assert_eq!(u.amount, Amount::from_units(30));
        assert!(u.card.is_empty());
        assert_eq!(u.issuance, IssuanceStatus::Refunded);
        assert!(store.users_with_order_in_flight().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn config_lookup_returns_known_keys_only() {
        let store = InMemoryStore::new()
            .with_config("vip_three_one", "10")
            .with_config("vip_three_two", "30");

        let entries = store
            .config(&["vip_three_one", "vip_three_three"])
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "vip_three_one");
        assert_eq!(entries[0].value, "10");
    }

    #[tokio::test]
    async fn updating_unknown_config_fails() {
        let store = InMemoryStore::new();
        let result = store
            .commit(vec![Mutation::UpdateConfig {
                key: "missing".to_string(),
                value: "1".to_string(),
            }])
            .await;
        assert_eq!(
            result,
            Err(PersistenceError::UnknownConfig("missing".to_string()))
        );
    }
}
