use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::Amount;
use crate::model::{Deposit, DepositSource, LedgerEvent, ReferralRecord, User, UserId};

/// Errors that can occur when reading or writing replay csv files
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("cannot open {path}: {source}")]
    Open { path: String, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized event type '{event_type}'")]
    UnrecognizedType { line: usize, event_type: String },

    #[error("line {line}: {event_type} missing amount")]
    MissingAmount { line: usize, event_type: String },

    #[error("line {line}: invalid amount '{value}'")]
    InvalidAmount { line: usize, value: String },

    #[error("failed to write row: {0}")]
    Write(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Deserialize)]
struct UserRow {
    id: UserId,
    address: String,
    vip: u64,
    vip_two: u64,
    vip_three: u64,
    balance: Option<String>,
    /// Legacy `D`-delimited ancestry path, root first.
    referral: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventRow {
    r#type: String,
    user: UserId,
    amount: Option<String>,
    hash: Option<String>,
}

#[derive(Debug, Serialize)]
struct AccountRow<'a> {
    user: UserId,
    address: &'a str,
    balance: String,
    team_volume: String,
}

fn open(path: &Path) -> Result<csv::Reader<std::fs::File>, CsvError> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.display().to_string(),
            source,
        })
}

fn parse_amount(line: usize, value: &str) -> Result<Amount, CsvError> {
    Amount::parse(value).ok_or_else(|| CsvError::InvalidAmount {
        line,
        value: value.to_string(),
    })
}

/// Read a user snapshot with each user's referral record
///
/// The returned iterator owns its reader and does not borrow `path`.
pub fn read_users(
    path: &Path,
) -> Result<impl Iterator<Item = Result<(User, ReferralRecord), CsvError>> + use<>, CsvError> {
    let reader = open(path)?;

    Ok(reader
        .into_deserialize::<UserRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            let amount = match row.balance.as_deref() {
                Some(balance) if !balance.is_empty() => parse_amount(line, balance)?,
                _ => Amount::ZERO,
            };
            let referral =
                ReferralRecord::from_legacy_code(row.id, row.referral.as_deref().unwrap_or(""));
            let user = User {
                id: row.id,
                address: row.address,
                vip: row.vip,
                vip_two: row.vip_two,
                vip_three: row.vip_three,
                amount,
                ..Default::default()
            };
            Ok((user, referral))
        }))
}

/// Read ledger events in file order. Deposits must carry a positive amount.
pub fn read_events(
    path: &Path,
) -> Result<impl Iterator<Item = Result<LedgerEvent, CsvError>> + use<>, CsvError> {
    let reader = open(path)?;

    Ok(reader
        .into_deserialize::<EventRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2;
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            match row.r#type.as_str() {
                "deposit" => {
                    let amount = match row.amount.as_deref() {
                        Some(amount) if !amount.is_empty() => {
                            let parsed = parse_amount(line, amount)?;
                            if !parsed.is_positive() {
                                return Err(CsvError::InvalidAmount {
                                    line,
                                    value: amount.to_string(),
                                });
                            }
                            parsed
                        }
                        _ => {
                            return Err(CsvError::MissingAmount {
                                line,
                                event_type: "deposit".to_string(),
                            });
                        }
                    };
                    let source = match row.hash {
                        Some(hash) if !hash.is_empty() => DepositSource::Chain { hash },
                        _ => DepositSource::System,
                    };
                    Ok(LedgerEvent::Deposit(Deposit {
                        user_id: row.user,
                        amount,
                        source,
                    }))
                }
                "activate" => Ok(LedgerEvent::Activation { user_id: row.user }),
                "threshold" => Ok(LedgerEvent::CardTwo { user_id: row.user }),
                other => Err(CsvError::UnrecognizedType {
                    line,
                    event_type: other.to_string(),
                }),
            }
        }))
}

/// Write accounts in csv format
pub fn write_accounts<'a>(
    users: impl IntoIterator<Item = &'a User>,
    out: impl io::Write,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(out);

    for user in users {
        writer.serialize(AccountRow {
            user: user.id,
            address: &user.address,
            balance: user.amount.to_string(),
            team_volume: user.my_total_amount.to_string(),
        })?;
    }

    writer.flush()?;
    Ok(())
}
