//! Process configuration.

use clap::Parser;
use std::path::PathBuf;

use crate::engine::Thresholds;

#[derive(Parser, Debug, Clone)]
#[command(name = "card-eng", version, about = "Replay a card commission ledger")]
pub struct Settings {
    /// User snapshot: id,address,vip,vip_two,vip_three,balance,referral
    pub users: PathBuf,

    /// Ledger events: type,user,amount,hash
    pub events: PathBuf,

    /// Threshold of the first VipThree tier
    #[arg(long, env = "CARD_ENG_TIER_ONE", default_value_t = 0)]
    pub tier_one: u64,

    #[arg(long, env = "CARD_ENG_TIER_TWO", default_value_t = 0)]
    pub tier_two: u64,

    #[arg(long, env = "CARD_ENG_TIER_THREE", default_value_t = 0)]
    pub tier_three: u64,
}

impl Settings {
    /// Threshold config entries to seed the store with, keyed as the
    /// threshold pass reads them.
    pub fn threshold_config(&self) -> [(&'static str, String); 3] {
        [
            (Thresholds::TIER_ONE_KEY, self.tier_one.to_string()),
            (Thresholds::TIER_TWO_KEY, self.tier_two.to_string()),
            (Thresholds::TIER_THREE_KEY, self.tier_three.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConfigEntry;

    fn entries(settings: &Settings) -> Vec<ConfigEntry> {
        settings
            .threshold_config()
            .into_iter()
            .map(|(key, value)| ConfigEntry {
                key: key.to_string(),
                value,
            })
            .collect()
    }

    #[test]
    fn defaults() {
        let settings = Settings::try_parse_from(["card-eng", "users.csv", "events.csv"]).unwrap();
        assert_eq!(settings.users, PathBuf::from("users.csv"));
        assert_eq!(settings.events, PathBuf::from("events.csv"));
        assert_eq!(
            Thresholds::from_config(&entries(&settings)),
            Thresholds::default()
        );
    }

    #[test]
    fn tier_flags_seed_thresholds() {
        let settings = Settings::try_parse_from([
            "card-eng",
            "u.csv",
            "e.csv",
            "--tier-one",
            "10",
            "--tier-two",
            "30",
            "--tier-three",
            "60",
        ])
        .unwrap();
        assert_eq!(
            Thresholds::from_config(&entries(&settings)),
            Thresholds::new(10, 30, 60)
        );
    }

    #[test]
    fn replay_has_no_job_flags() {
        for flag in ["--overlap", "--base-refund", "--issuance-period"] {
            let result = Settings::try_parse_from(["card-eng", "u", "e", flag, "1"]);
            assert!(result.is_err(), "{flag} should be rejected");
        }
    }

    #[test]
    fn rejects_bad_tier() {
        let result = Settings::try_parse_from(["card-eng", "u", "e", "--tier-one", "ten"]);
        assert!(result.is_err());
    }
}
