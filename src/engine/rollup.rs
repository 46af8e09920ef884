use chrono::Utc;
use tracing::{debug, info, warn};

use crate::model::{Deposit, DepositRecord, DepositSource};
use crate::repository::Mutation;

use super::{Engine, EngineError, RollupSummary};

impl Engine {
    /// Record a confirmed deposit and add its amount to every ancestor's
    /// downline volume.
    ///
    /// Amounts that are zero or negative are rejected before any write. A
    /// failure on one ancestor is logged and the walk continues. Users
    /// without a referral record are roots and have nobody to update.
    pub async fn record_deposit(&self, deposit: Deposit) -> Result<RollupSummary, EngineError> {
        if !deposit.amount.is_positive() {
            return Err(EngineError::NonPositiveDeposit {
                user: deposit.user_id,
                amount: deposit.amount,
            });
        }
        let mut summary = RollupSummary::default();

        if let DepositSource::Chain { hash } = &deposit.source {
            let record = DepositRecord {
                user_id: deposit.user_id,
                amount: deposit.amount,
                hash: hash.clone(),
                created_at: Utc::now(),
            };
            if let Err(e) = self.repo.commit(vec![Mutation::InsertDeposit(record)]).await {
                warn!(
                    user = deposit.user_id,
                    amount = %deposit.amount,
                    hash = %hash,
                    reason = %e,
                    "deposit not recorded"
                );
                return Err(e.into());
            }
            summary.deposit_recorded = true;
        }

        let ancestors = match self.repo.referral(deposit.user_id).await? {
            Some(referral) => referral.ancestors,
            None => {
                debug!(user = deposit.user_id, "no referral record, nothing to roll up");
                Vec::new()
            }
        };

        for ancestor in ancestors {
            if ancestor == 0 {
                continue;
            }
            let volume = Mutation::AddTeamVolume {
                user_id: ancestor,
                amount: deposit.amount,
            };
            match self.repo.commit(vec![volume]).await {
                Ok(()) => summary.ancestors_updated += 1,
                Err(e) => {
                    summary.ancestors_failed += 1;
                    warn!(
                        user = deposit.user_id,
                        ancestor,
                        amount = %deposit.amount,
                        reason = %e,
                        "team volume not updated"
                    );
                }
            }
        }

        info!(
            user = deposit.user_id,
            amount = %deposit.amount,
            updated = summary.ancestors_updated,
            failed = summary.ancestors_failed,
            "deposit rolled up"
        );
        Ok(summary)
    }
}
