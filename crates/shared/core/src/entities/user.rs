use serde::{Deserialize, Serialize};

use super::{Portfolio, TradeStats};
use crate::values::Timestamp;

/// A player account with its single portfolio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable key derived from the authenticated identity
    pub id: String,
    pub display_name: String,
    pub profile_url: String,
    pub created_at: Timestamp,
    pub portfolio: Portfolio,
    #[serde(default)]
    pub trade_stats: TradeStats,
}

impl User {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        profile_url: impl Into<String>,
        created_at: Timestamp,
        portfolio: Portfolio,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            profile_url: profile_url.into(),
            created_at,
            portfolio,
            trade_stats: TradeStats::default(),
        }
    }
}
