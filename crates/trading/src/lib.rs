//! Paper-trading Ledger
//!
//! Use cases over the store ports:
//! - [`TradeEngine`]: validate, price and atomically apply one trade
//! - [`AccountService`]: account bootstrap and read paths
//! - [`ValuationJob`]: hourly portfolio valuation snapshots
//!
//! `infrastructure` holds the in-memory adapters used for local runs and tests.

pub mod accounts;
pub mod config;
pub mod engine;
pub mod error;
pub mod infrastructure;
pub mod validation;
pub mod valuation;

pub use accounts::AccountService;
pub use config::{TradeEngineConfig, ValuationConfig};
pub use engine::{TradeEngine, TradeOutcome, TradeRequest};
pub use error::TradeError;
pub use infrastructure::{InMemoryStore, InMemoryTradeHistoryCache};
pub use valuation::{ValuationJob, ValuationReport, truncate_to_hour};
