//! Referral commission walks.
//!
//! Both walks start at the direct upline and move toward the root. The
//! running state (`last_tier`, `last_amount`) is only meaningful in that
//! order.

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::Amount;
use crate::model::{ConfigEntry, ReferralRecord, User, UserId};

use super::DataIntegrityError;

/// Commission pool whose ancestors may hold tiers up to 30.
pub const ELEVATED_POOL: u64 = 30;
pub const BASE_TIER_CAP: u64 = 10;
pub const ELEVATED_TIER_CAP: u64 = 30;

/// Highest `vip_three` tier the threshold walk pays.
pub const THRESHOLD_TIER_CAP: u64 = 3;

/// Read-through copy of the user table, taken once per run.
///
/// Writes made by other jobs after the snapshot was taken are not visible;
/// tiers may therefore be stale for the duration of one run.
#[derive(Debug, Default, Clone)]
pub struct UserSnapshot {
    users: HashMap<UserId, User>,
}

impl UserSnapshot {
    pub fn get(&self, id: UserId) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl FromIterator<User> for UserSnapshot {
    fn from_iter<I: IntoIterator<Item = User>>(iter: I) -> Self {
        Self {
            users: iter.into_iter().map(|u| (u.id, u)).collect(),
        }
    }
}

/// One ancestor's share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payout {
    pub user_id: UserId,
    pub amount: Amount,
    /// Payee's `vip` at the time of payout, recorded on the ledger entry.
    pub tier: u64,
}

/// How a walk terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEnd {
    /// Every ancestor was visited.
    Exhausted,
    /// The shared pool was fully paid out.
    CapReached,
    /// An ancestor violated a tier invariant; more distant ancestors are unpaid.
    Aborted(DataIntegrityError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardPlan {
    pub payouts: Vec<Payout>,
    pub end: WalkEnd,
}

impl RewardPlan {
    pub fn total(&self) -> Amount {
        self.payouts.iter().map(|p| p.amount).sum()
    }
}

/// Tier cap of the pool the activating user belongs to.
pub fn tier_cap(vip_two: u64) -> u64 {
    if vip_two == ELEVATED_POOL {
        ELEVATED_TIER_CAP
    } else {
        BASE_TIER_CAP
    }
}

/// VIP-differential walk.
///
/// Only ancestors in the activating user's pool (`vip_two`) take part. Each
/// one whose `vip` exceeds the highest tier paid so far receives the
/// difference; lower or equal tiers are compressed away. A tier above the
/// pool cap stops the walk.
pub fn differential_payouts(
    vip_two: u64,
    referral: &ReferralRecord,
    users: &UserSnapshot,
) -> RewardPlan {
    let cap = tier_cap(vip_two);
    let mut last_tier = 0;
    let mut payouts = Vec::new();

    for id in referral.upline_first() {
        if id == 0 {
            continue;
        }
        let Some(ancestor) = users.get(id) else {
            let reason = DataIntegrityError::MissingAncestor {
                referrer: referral.user_id,
                missing: id,
            };
            warn!(%reason, "differential walk skipped ancestor");
            continue;
        };
        if ancestor.vip_two != vip_two {
            debug!(ancestor = id, pool = ancestor.vip_two, "different pool, skipped");
            continue;
        }
        if ancestor.vip > cap {
            return RewardPlan {
                payouts,
                end: WalkEnd::Aborted(DataIntegrityError::TierAboveCap {
                    user: id,
                    tier: ancestor.vip,
                    cap,
                }),
            };
        }
        if ancestor.vip <= last_tier {
            continue;
        }

        payouts.push(Payout {
            user_id: id,
            amount: Amount::from_units(ancestor.vip - last_tier),
            tier: ancestor.vip,
        });
        last_tier = ancestor.vip;
    }

    RewardPlan {
        payouts,
        end: WalkEnd::Exhausted,
    }
}

/// Cumulative payout ceilings of the threshold walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Thresholds {
    pub tier_one: Amount,
    pub tier_two: Amount,
    pub tier_three: Amount,
}

impl Thresholds {
    pub const TIER_ONE_KEY: &'static str = "vip_three_one";
    pub const TIER_TWO_KEY: &'static str = "vip_three_two";
    pub const TIER_THREE_KEY: &'static str = "vip_three_three";

    pub const KEYS: [&'static str; 3] = [
        Self::TIER_ONE_KEY,
        Self::TIER_TWO_KEY,
        Self::TIER_THREE_KEY,
    ];

    pub fn new(tier_one: u64, tier_two: u64, tier_three: u64) -> Self {
        Self {
            tier_one: Amount::from_units(tier_one),
            tier_two: Amount::from_units(tier_two),
            tier_three: Amount::from_units(tier_three),
        }
    }

    /// Build from config rows. Missing, unparsable or out of range values
    /// read as zero.
    pub fn from_config(entries: &[ConfigEntry]) -> Self {
        let mut thresholds = Thresholds::default();
        for entry in entries {
            let parsed = entry.value.trim().parse::<u64>().ok();
            let value = match parsed.and_then(Amount::checked_from_units) {
                Some(value) => value,
                None => {
                    warn!(key = %entry.key, value = %entry.value, "invalid threshold, using 0");
                    Amount::ZERO
                }
            };
            match entry.key.as_str() {
                Self::TIER_ONE_KEY => thresholds.tier_one = value,
                Self::TIER_TWO_KEY => thresholds.tier_two = value,
                Self::TIER_THREE_KEY => thresholds.tier_three = value,
                _ => {}
            }
        }
        let increasing = thresholds.tier_one < thresholds.tier_two
            && thresholds.tier_two < thresholds.tier_three;
        if !increasing {
            warn!(
                tier_one = %thresholds.tier_one,
                tier_two = %thresholds.tier_two,
                tier_three = %thresholds.tier_three,
                "thresholds are not strictly increasing"
            );
        }
        thresholds
    }

    fn for_tier(&self, tier: u64) -> Option<Amount> {
        match tier {
            1 => Some(self.tier_one),
            2 => Some(self.tier_two),
            3 => Some(self.tier_three),
            _ => None,
        }
    }
}

/// Threshold-capped walk.
///
/// The whole chain shares one pool bounded by `tier_three`. An ancestor at
/// `vip_three` N is topped up to threshold N; once the cumulative payout
/// reaches `tier_three` nobody further up is paid.
pub fn threshold_payouts(
    referral: &ReferralRecord,
    users: &UserSnapshot,
    thresholds: &Thresholds,
) -> RewardPlan {
    let mut last_tier = 0;
    let mut last_amount = Amount::ZERO;
    let mut payouts = Vec::new();

    for id in referral.upline_first() {
        if last_amount >= thresholds.tier_three {
            break;
        }
        if id == 0 {
            continue;
        }
        let Some(ancestor) = users.get(id) else {
            let reason = DataIntegrityError::MissingAncestor {
                referrer: referral.user_id,
                missing: id,
            };
            warn!(%reason, "threshold walk skipped ancestor");
            continue;
        };
        if ancestor.vip_three > THRESHOLD_TIER_CAP {
            warn!(ancestor = id, tier = ancestor.vip_three, "tier above cap, skipped");
            continue;
        }
        if ancestor.vip_three <= last_tier {
            continue;
        }
        last_tier = ancestor.vip_three;

        let Some(threshold) = thresholds.for_tier(ancestor.vip_three) else {
            continue;
        };
        if threshold <= last_amount {
            debug!(ancestor = id, %threshold, %last_amount, "threshold already covered");
            continue;
        }

        payouts.push(Payout {
            user_id: id,
            amount: threshold - last_amount,
            tier: ancestor.vip,
        });
        last_amount = threshold;
    }

    let end = if last_amount >= thresholds.tier_three {
        WalkEnd::CapReached
    } else {
        WalkEnd::Exhausted
    };
    RewardPlan { payouts, end }
}

#[cfg(test)]
mod tests {
    use super::*;

    // test utils

    fn ancestor(id: UserId, vip: u64, vip_two: u64, vip_three: u64) -> User {
        User {
            id,
            address: format!("0x{id:02}"),
            vip,
            vip_two,
            vip_three,
            ..Default::default()
        }
    }

    /// Chain given direct upline first, as the scenarios read; stored root first.
    fn chain(user_id: UserId, upline_first: &[UserId]) -> ReferralRecord {
        ReferralRecord::new(user_id, upline_first.iter().rev().copied().collect())
    }

    fn units(plan: &RewardPlan) -> Vec<(UserId, Amount)> {
        plan.payouts.iter().map(|p| (p.user_id, p.amount)).collect()
    }

    // Differential

    #[test]
    fn differential_compresses_and_stops_above_cap() {
        let users: UserSnapshot = [
            ancestor(1, 5, 0, 0),
            ancestor(2, 5, 0, 0),
            ancestor(3, 12, 0, 0),
            ancestor(4, 40, 0, 0),
        ]
        .into_iter()
        .collect();

        let plan = differential_payouts(0, &chain(99, &[1, 2, 3, 4]), &users);

        assert_eq!(units(&plan), vec![(1, Amount::from_units(5))]);
        assert_eq!(
            plan.end,
            WalkEnd::Aborted(DataIntegrityError::TierAboveCap {
                user: 3,
                tier: 12,
                cap: 10
            })
        );
    }

    #[test]
    fn differential_pays_marginal_difference() {
        let users: UserSnapshot = [
            ancestor(1, 2, 0, 0),
            ancestor(2, 1, 0, 0),
            ancestor(3, 6, 0, 0),
            ancestor(4, 10, 0, 0),
        ]
        .into_iter()
        .collect();

        let plan = differential_payouts(0, &chain(99, &[1, 2, 3, 4]), &users);

        assert_eq!(
            units(&plan),
            vec![
                (1, Amount::from_units(2)),
                (3, Amount::from_units(4)),
                (4, Amount::from_units(4)),
            ]
        );
        assert_eq!(plan.total(), Amount::from_units(10));
        assert_eq!(plan.end, WalkEnd::Exhausted);
    }

    #[test]
    fn differential_total_equals_highest_qualifying_tier() {
        let cases: [&[u64]; 4] = [&[3, 7, 7, 9], &[9, 3, 7], &[0, 0, 4], &[10, 10, 10]];
        for tiers in cases {
            let users: UserSnapshot = tiers
                .iter()
                .enumerate()
                .map(|(i, vip)| ancestor(i as UserId + 1, *vip, 0, 0))
                .collect();
            let ids: Vec<UserId> = (1..=tiers.len() as UserId).collect();

            let plan = differential_payouts(0, &chain(99, &ids), &users);

            let highest = *tiers.iter().max().unwrap();
            assert_eq!(plan.total(), Amount::from_units(highest.min(BASE_TIER_CAP)));
            assert!(plan.payouts.iter().all(|p| p.amount.is_positive()));
            assert!(plan.payouts.windows(2).all(|w| w[0].tier < w[1].tier));
        }
    }

    #[test]
    fn differential_ignores_other_pools() {
        let users: UserSnapshot = [
            ancestor(1, 4, 30, 0),
            ancestor(2, 25, 0, 0), // other pool, tier above base cap must not abort
            ancestor(3, 8, 0, 0),
        ]
        .into_iter()
        .collect();

        let plan = differential_payouts(0, &chain(99, &[1, 2, 3]), &users);

        assert_eq!(units(&plan), vec![(3, Amount::from_units(8))]);
        assert_eq!(plan.end, WalkEnd::Exhausted);
    }

    #[test]
    fn elevated_pool_allows_tiers_up_to_thirty() {
        let users: UserSnapshot = [ancestor(1, 12, 30, 0), ancestor(2, 30, 30, 0)]
            .into_iter()
            .collect();

        let plan = differential_payouts(30, &chain(99, &[1, 2]), &users);

        assert_eq!(
            units(&plan),
            vec![(1, Amount::from_units(12)), (2, Amount::from_units(18))]
        );
    }

    #[test]
    fn differential_skips_missing_and_zero_ids() {
        let users: UserSnapshot = [ancestor(2, 3, 0, 0)].into_iter().collect();

        let plan = differential_payouts(0, &chain(99, &[0, 7, 2]), &users);

        assert_eq!(units(&plan), vec![(2, Amount::from_units(3))]);
    }

    #[test]
    fn root_user_has_nothing_to_pay() {
        let plan = differential_payouts(
            0,
            &ReferralRecord::new(1, vec![]),
            &UserSnapshot::default(),
        );
        assert!(plan.payouts.is_empty());
        assert_eq!(plan.end, WalkEnd::Exhausted);
    }

    // Threshold

    #[test]
    fn threshold_pays_up_to_shared_ceiling() {
        let users: UserSnapshot = [
            ancestor(1, 0, 0, 1),
            ancestor(2, 0, 0, 2),
            ancestor(3, 0, 0, 3),
            ancestor(4, 0, 0, 1),
        ]
        .into_iter()
        .collect();

        let plan = threshold_payouts(
            &chain(99, &[1, 2, 3, 4]),
            &users,
            &Thresholds::new(10, 30, 60),
        );

        assert_eq!(
            units(&plan),
            vec![
                (1, Amount::from_units(10)),
                (2, Amount::from_units(20)),
                (3, Amount::from_units(30)),
            ]
        );
        assert_eq!(plan.end, WalkEnd::CapReached);
    }

    #[test]
    fn threshold_skips_tier_zero_and_out_of_range() {
        let users: UserSnapshot = [
            ancestor(1, 0, 0, 0),
            ancestor(2, 0, 0, 7),
            ancestor(3, 0, 0, 2),
        ]
        .into_iter()
        .collect();

        let plan = threshold_payouts(
            &chain(99, &[1, 2, 3]),
            &users,
            &Thresholds::new(10, 30, 60),
        );

        assert_eq!(units(&plan), vec![(3, Amount::from_units(30))]);
        assert_eq!(plan.end, WalkEnd::Exhausted);
    }

    #[test]
    fn threshold_jumps_straight_to_top_tier() {
        let users: UserSnapshot = [ancestor(1, 0, 0, 3), ancestor(2, 0, 0, 3)]
            .into_iter()
            .collect();

        let plan = threshold_payouts(
            &chain(99, &[1, 2]),
            &users,
            &Thresholds::new(10, 30, 60),
        );

        assert_eq!(units(&plan), vec![(1, Amount::from_units(60))]);
        assert_eq!(plan.end, WalkEnd::CapReached);
    }

    #[test]
    fn threshold_lower_tier_after_higher_is_compressed() {
        let users: UserSnapshot = [ancestor(1, 0, 0, 2), ancestor(2, 0, 0, 1)]
            .into_iter()
            .collect();

        let plan = threshold_payouts(
            &chain(99, &[1, 2]),
            &users,
            &Thresholds::new(10, 30, 60),
        );

        assert_eq!(units(&plan), vec![(1, Amount::from_units(30))]);
    }

    #[test]
    fn threshold_with_unset_ceiling_pays_nothing() {
        let users: UserSnapshot = [ancestor(1, 0, 0, 1)].into_iter().collect();

        let plan = threshold_payouts(&chain(99, &[1]), &users, &Thresholds::default());

        assert!(plan.payouts.is_empty());
        assert_eq!(plan.end, WalkEnd::CapReached);
    }

    #[test]
    fn threshold_monotonic_and_positive() {
        let users: UserSnapshot = [
            ancestor(1, 0, 0, 1),
            ancestor(2, 0, 0, 1),
            ancestor(3, 0, 0, 3),
        ]
        .into_iter()
        .collect();

        let plan = threshold_payouts(
            &chain(99, &[1, 2, 3]),
            &users,
            &Thresholds::new(10, 30, 60),
        );

        assert!(plan.payouts.iter().all(|p| p.amount.is_positive()));
        assert!(plan.total() <= Amount::from_units(60));
        assert_eq!(plan.total(), Amount::from_units(60));
    }

    #[test]
    fn thresholds_from_config() {
        let entries = vec![
            ConfigEntry {
                key: "vip_three_one".to_string(),
                value: "10".to_string(),
            },
            ConfigEntry {
                key: "vip_three_two".to_string(),
                value: " 30 ".to_string(),
            },
            ConfigEntry {
                key: "vip_three_three".to_string(),
                value: "lots".to_string(),
            },
        ];

        let thresholds = Thresholds::from_config(&entries);

        assert_eq!(thresholds.tier_one, Amount::from_units(10));
        assert_eq!(thresholds.tier_two, Amount::from_units(30));
        assert_eq!(thresholds.tier_three, Amount::ZERO);
    }

    #[test]
    fn out_of_range_threshold_reads_as_zero() {
        let entries = vec![
            ConfigEntry {
                key: "vip_three_two".to_string(),
                value: "30".to_string(),
            },
            ConfigEntry {
                key: "vip_three_three".to_string(),
                value: "1000000000000000".to_string(),
            },
        ];

        let thresholds = Thresholds::from_config(&entries);

        assert_eq!(thresholds.tier_two, Amount::from_units(30));
        assert_eq!(thresholds.tier_three, Amount::ZERO);
    }

    #[test]
    fn threshold_payout_records_payee_vip() {
        let users: UserSnapshot = [ancestor(1, 7, 0, 1), ancestor(2, 4, 0, 3)]
            .into_iter()
            .collect();

        let plan = threshold_payouts(
            &chain(99, &[1, 2]),
            &users,
            &Thresholds::new(10, 30, 60),
        );

        let tiers: Vec<u64> = plan.payouts.iter().map(|p| p.tier).collect();
        assert_eq!(tiers, vec![7, 4]);
    }
}
