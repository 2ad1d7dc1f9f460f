use serde::{Deserialize, Serialize};
use std::fmt;

use crate::amount::Amount;
use crate::values::{Symbol, Timestamp};

/// Trade direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    /// Left unset by the caller; never executable
    #[default]
    Unspecified,
    Buy,
    Sell,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TradeAction::Unspecified => "UNSPECIFIED",
            TradeAction::Buy => "BUY",
            TradeAction::Sell => "SELL",
        };
        f.write_str(s)
    }
}

/// Immutable audit entry for an executed trade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: Timestamp,
    pub symbol: Symbol,
    pub action: TradeAction,
    pub size: Amount,
    pub price: Amount,
}

/// Per-user trade counters, updated in the same transaction as the portfolio
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeStats {
    pub last_trade: Option<Timestamp>,
    pub count: u64,
}

impl TradeStats {
    pub fn record(&mut self, at: Timestamp) {
        self.last_trade = Some(at);
        self.count += 1;
    }
}
