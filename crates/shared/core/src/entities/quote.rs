use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::values::{Symbol, Timestamp};

/// Normalized price observation for one symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,
    pub price: Amount,
    /// Time reported by the feed
    pub observed_at: Timestamp,
}

impl Quote {
    pub fn new(symbol: impl Into<Symbol>, price: Amount, observed_at: Timestamp) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            observed_at,
        }
    }
}
