//! Paper-trading Core Domain
//!
//! Pure domain types for the paper-trading ledger.
//! This crate contains no async, no I/O, and is 100% unit testable.

pub mod amount;
pub mod entities;
pub mod market;
pub mod values;

// Re-export commonly used types at crate root
pub use amount::{Amount, AmountError, NANOS_PER_UNIT};
pub use entities::{
    Portfolio, PortfolioError, Quote, TradeAction, TradeRecord, TradeStats, User,
    ValuationHistory,
};
pub use market::{DEFAULT_STARTING_CASH, SUPPORTED_SYMBOLS, is_supported};
pub use values::{Symbol, Timestamp};
