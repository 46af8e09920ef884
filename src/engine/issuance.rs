//! Card issuance orchestration.
//!
//! Per user and run: preflight, holder query, card creation, then the order
//! is persisted and the user leaves this job's scope until the activation
//! poller picks it up.

use tracing::{info, warn};

use crate::issuer::HolderStatus;
use crate::model::User;
use crate::repository::Mutation;

use super::{
    Engine, EngineError, FailureKind, ItemOutcome, ItemReport, Job, PreflightError, RunSummary,
};

/// Holder references and product ids shorter than this are treated as missing.
pub const MIN_REFERENCE_LEN: usize = 5;

/// Validated issuer identifiers of one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuanceRequest {
    pub holder_id: u64,
    pub product_id: u64,
}

/// Check the prerequisites of card issuance without contacting the issuer.
pub fn preflight(user: &User) -> Result<IssuanceRequest, PreflightError> {
    if user.card_user_id.len() < MIN_REFERENCE_LEN {
        return Err(PreflightError::MissingHolder);
    }
    let holder_id = parse_positive(&user.card_user_id)
        .ok_or_else(|| PreflightError::InvalidHolder(user.card_user_id.clone()))?;

    if user.max_card_quota == 0 {
        return Err(PreflightError::NoCardQuota);
    }

    if user.product_id.len() < MIN_REFERENCE_LEN {
        return Err(PreflightError::MissingProduct);
    }
    let product_id = parse_positive(&user.product_id)
        .ok_or_else(|| PreflightError::InvalidProduct(user.product_id.clone()))?;

    Ok(IssuanceRequest {
        holder_id,
        product_id,
    })
}

fn parse_positive(value: &str) -> Option<u64> {
    value.parse::<u64>().ok().filter(|v| *v > 0)
}

impl Engine {
    /// Advance every user with a reserved card fee through the issuance workflow.
    pub async fn run_issuance(&self) -> Result<RunSummary, EngineError> {
        let _guard = self.issuance_guard.acquire().await?;

        let users = self.repo.users_requesting_card().await?;
        let mut summary = RunSummary::new(Job::Issuance);
        for user in &users {
            summary.push(self.issue_card(user).await);
        }

        summary.log();
        Ok(summary)
    }

    async fn issue_card(&self, user: &User) -> ItemReport {
        let request = match preflight(user) {
            Ok(request) => request,
            Err(e) => {
                warn!(user = user.id, reason = %e, "issuance preflight failed");
                return self.compensate(user, FailureKind::Preflight).await;
            }
        };

        match self
            .issuer
            .query_holder(request.holder_id, request.product_id)
            .await
        {
            Ok(holder) => match holder.status {
                HolderStatus::Active => {}
                HolderStatus::Pending => {
                    info!(user = user.id, holder = request.holder_id, "holder pending");
                    return ItemReport::new(user.id, ItemOutcome::Deferred);
                }
                HolderStatus::Other(status) => {
                    warn!(user = user.id, holder = request.holder_id, %status, "holder rejected");
                    return self.compensate(user, FailureKind::Issuer).await;
                }
            },
            Err(e) => {
                warn!(
                    user = user.id,
                    holder = request.holder_id,
                    reason = %e,
                    "holder query failed"
                );
                return self.compensate(user, FailureKind::Issuer).await;
            }
        }

        let created = match self
            .issuer
            .create_card(request.product_id, request.holder_id)
            .await
        {
            Ok(created) if !created.card_id.is_empty() && !created.card_order_id.is_empty() => {
                created
            }
            Ok(created) => {
                warn!(
                    user = user.id,
                    card = %created.card_id,
                    order = %created.card_order_id,
                    "card order incomplete"
                );
                return self.compensate(user, FailureKind::Issuer).await;
            }
            Err(e) => {
                warn!(user = user.id, reason = %e, "card creation failed");
                return self.compensate(user, FailureKind::Issuer).await;
            }
        };

        let order = Mutation::RecordCardOrder {
            user_id: user.id,
            card_id: created.card_id.clone(),
            card_order_id: created.card_order_id.clone(),
        };
        match self.repo.commit(vec![order]).await {
            Ok(()) => {
                info!(
                    user = user.id,
                    card = %created.card_id,
                    order = %created.card_order_id,
                    "card order placed"
                );
                ItemReport::new(user.id, ItemOutcome::Completed)
            }
            Err(e) => {
                // the order exists upstream, so the fee is not refunded
                warn!(
                    user = user.id,
                    card = %created.card_id,
                    reason = %e,
                    "card order not persisted"
                );
                ItemReport::new(user.id, ItemOutcome::Failed(FailureKind::Persistence))
            }
        }
    }
}
