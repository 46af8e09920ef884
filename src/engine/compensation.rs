use tracing::{info, warn};

use crate::Amount;
use crate::model::User;
use crate::repository::Mutation;

use super::{Engine, FailureKind, ItemOutcome, ItemReport};

impl Engine {
    /// Refund owed to `user` when the issuance workflow fails.
    ///
    /// Depends only on whether the user sits in an elevated pool.
    pub fn refund_amount(&self, user: &User) -> Amount {
        if user.vip_two > 0 {
            self.settings.elevated_refund
        } else {
            self.settings.base_refund
        }
    }

    /// Credit the card fee back to `user` after a terminal failure of kind `cause`.
    ///
    /// Callers invoke this once per terminal transition.
    pub(super) async fn compensate(&self, user: &User, cause: FailureKind) -> ItemReport {
        let amount = self.refund_amount(user);
        let refund = Mutation::Refund {
            user_id: user.id,
            amount,
        };
        match self.repo.commit(vec![refund]).await {
            Ok(()) => {
                info!(user = user.id, amount = %amount, cause = %cause, "card fee refunded");
                ItemReport::new(user.id, ItemOutcome::Compensated(cause))
            }
            Err(e) => {
                warn!(
                    user = user.id,
                    amount = %amount,
                    cause = %cause,
                    reason = %e,
                    "card fee refund failed"
                );
                ItemReport::new(user.id, ItemOutcome::Failed(FailureKind::Persistence))
            }
        }
    }
}
