use async_trait::async_trait;
use papertrade_core::{Timestamp, TradeRecord, User, ValuationHistory};

use crate::error::StoreError;

/// A stored value together with the version it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// User documents with optimistic concurrency control.
///
/// Every successful write bumps the version. A write made against a stale
/// version fails with [`StoreError::Conflict`] and changes nothing, which
/// gives per-account serializable read-modify-write.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, id: &str) -> Result<Option<Versioned<User>>, StoreError>;

    /// Insert a new user; fails with [`StoreError::AlreadyExists`] if the id is taken
    async fn create_user(&self, user: User) -> Result<Versioned<User>, StoreError>;

    /// Replace the user only if it is still at `expected_version`
    async fn compare_and_set(
        &self,
        id: &str,
        expected_version: u64,
        user: User,
    ) -> Result<Versioned<User>, StoreError>;

    /// One page of users ordered by id, starting after `after`
    async fn list_users(&self, after: Option<&str>, limit: usize) -> Result<Vec<User>, StoreError>;
}

/// Append-only per-user trade log
#[async_trait]
pub trait TradeLogRepository: Send + Sync {
    async fn append_trade(&self, user_id: &str, record: TradeRecord) -> Result<(), StoreError>;

    /// Trades newest first
    async fn list_trades(&self, user_id: &str) -> Result<Vec<TradeRecord>, StoreError>;

    /// Keep only the newest `keep` trades, returning how many were removed
    async fn prune_trades(&self, user_id: &str, keep: usize) -> Result<usize, StoreError>;
}

/// Per-user hourly valuation snapshots
#[async_trait]
pub trait ValuationRepository: Send + Sync {
    /// Insert or overwrite the snapshot at `snapshot.timestamp`
    async fn put_valuation(
        &self,
        user_id: &str,
        snapshot: ValuationHistory,
    ) -> Result<(), StoreError>;

    /// Snapshots oldest first
    async fn list_valuations(&self, user_id: &str) -> Result<Vec<ValuationHistory>, StoreError>;

    async fn delete_valuations_before(
        &self,
        user_id: &str,
        cutoff: Timestamp,
    ) -> Result<usize, StoreError>;
}
