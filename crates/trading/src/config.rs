//! Ledger and valuation settings
//!
//! Durations are kept as integer milliseconds/hours so the JSON form stays
//! flat; use the accessor methods to get [`Duration`]s.

use papertrade_core::{Amount, DEFAULT_STARTING_CASH, SUPPORTED_SYMBOLS, Symbol};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_symbols() -> Vec<Symbol> {
    SUPPORTED_SYMBOLS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeEngineConfig {
    /// Symbols users may trade; also the positions seeded into new portfolios
    pub supported_symbols: Vec<Symbol>,

    /// Cash of a newly created portfolio
    pub starting_cash: Amount,

    /// Max wait for a fresh quote before giving up
    pub quote_deadline_ms: u64,

    /// Max time for the portfolio read-modify-write
    pub trade_deadline_ms: u64,

    /// Oldest quote a trade may execute at
    pub max_quote_age_ms: u64,

    /// Trade log entries kept per user when pruning
    pub max_trade_history: usize,

    /// Chance that a trade prunes its user's trade log afterwards
    pub history_prune_probability: f64,

    /// How long a cached trade history is served
    pub trade_history_ttl_secs: u64,
}

impl Default for TradeEngineConfig {
    fn default() -> Self {
        Self {
            supported_symbols: default_symbols(),
            starting_cash: DEFAULT_STARTING_CASH,
            quote_deadline_ms: 2_000,
            trade_deadline_ms: 1_000,
            max_quote_age_ms: 10_000,
            max_trade_history: 300,
            history_prune_probability: 0.01,
            trade_history_ttl_secs: 6 * 60 * 60,
        }
    }
}

impl TradeEngineConfig {
    pub fn quote_deadline(&self) -> Duration {
        Duration::from_millis(self.quote_deadline_ms)
    }

    pub fn trade_deadline(&self) -> Duration {
        Duration::from_millis(self.trade_deadline_ms)
    }

    pub fn max_quote_age(&self) -> Duration {
        Duration::from_millis(self.max_quote_age_ms)
    }

    pub fn trade_history_ttl(&self) -> Duration {
        Duration::from_secs(self.trade_history_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuationConfig {
    /// Time between valuation runs
    pub interval_secs: u64,

    /// Wait before retrying a run that failed as a whole
    pub retry_backoff_secs: u64,

    /// Snapshots older than this are deleted
    pub max_history_hours: i64,

    /// Users valued concurrently
    pub parallelism: usize,

    /// Users fetched per store scan
    pub page_size: usize,

    /// Max wait for each symbol's quote
    pub quote_deadline_ms: u64,

    /// Oldest quote a valuation may use
    pub max_quote_age_ms: u64,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3_600,
            retry_backoff_secs: 60,
            max_history_hours: 31 * 24,
            parallelism: 10,
            page_size: 100,
            quote_deadline_ms: 2_000,
            max_quote_age_ms: 10_000,
        }
    }
}

impl ValuationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    pub fn max_history(&self) -> chrono::Duration {
        chrono::Duration::hours(self.max_history_hours)
    }

    pub fn quote_deadline(&self) -> Duration {
        Duration::from_millis(self.quote_deadline_ms)
    }

    pub fn max_quote_age(&self) -> Duration {
        Duration::from_millis(self.max_quote_age_ms)
    }
}
