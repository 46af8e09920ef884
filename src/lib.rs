pub mod amount;
pub mod config;
pub mod csv;
pub mod engine;
pub mod issuer;
pub mod model;
pub mod repository;
pub mod scheduler;
pub mod store;

pub use amount::Amount;
pub use engine::Engine;
pub use model::{LedgerEvent, ReferralRecord, User, UserId};
