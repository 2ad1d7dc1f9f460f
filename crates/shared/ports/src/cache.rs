use async_trait::async_trait;
use papertrade_core::TradeRecord;

use crate::error::StoreError;

/// Result of a trade history cache read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryLookup {
    Hit(Vec<TradeRecord>),
    /// Nothing fresh cached. Pass `generation` back to
    /// [`TradeHistoryCache::save`]; the fill is dropped if the entry was
    /// invalidated in between.
    Miss { generation: u64 },
}

impl HistoryLookup {
    pub fn hit(self) -> Option<Vec<TradeRecord>> {
        match self {
            HistoryLookup::Hit(trades) => Some(trades),
            HistoryLookup::Miss { .. } => None,
        }
    }
}

/// Read-through cache for a user's recent trades.
///
/// The trade engine invalidates an entry after each committed trade.
#[async_trait]
pub trait TradeHistoryCache: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<HistoryLookup, StoreError>;

    /// Store `trades` read after a miss at `generation`. Returns false if the
    /// entry was invalidated since, leaving the cache untouched.
    async fn save(
        &self,
        user_id: &str,
        generation: u64,
        trades: &[TradeRecord],
    ) -> Result<bool, StoreError>;

    async fn invalidate(&self, user_id: &str) -> Result<(), StoreError>;
}
