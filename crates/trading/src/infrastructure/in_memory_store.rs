use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use papertrade_core::{Amount, Timestamp, TradeRecord, User, ValuationHistory};
use papertrade_ports::{
    StoreError, TradeLogRepository, UserRepository, ValuationRepository, Versioned,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// In-memory document store
///
/// Thread-safe storage for users, trade logs and valuation snapshots using
/// DashMap. Versioned user writes give the same optimistic concurrency a real
/// document store would. Clones share the same data.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    users: Arc<DashMap<String, Versioned<User>>>,
    /// Per user, oldest first
    trades: Arc<DashMap<String, Vec<TradeRecord>>>,
    valuations: Arc<DashMap<String, BTreeMap<Timestamp, Amount>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn get_user(&self, id: &str) -> Result<Option<Versioned<User>>, StoreError> {
        Ok(self.users.get(id).map(|u| u.value().clone()))
    }

    async fn create_user(&self, user: User) -> Result<Versioned<User>, StoreError> {
        match self.users.entry(user.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(user.id)),
            Entry::Vacant(slot) => {
                let stored = Versioned {
                    version: 1,
                    value: user,
                };
                slot.insert(stored.clone());
                Ok(stored)
            }
        }
    }

    async fn compare_and_set(
        &self,
        id: &str,
        expected_version: u64,
        user: User,
    ) -> Result<Versioned<User>, StoreError> {
        let mut stored = self
            .users
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if stored.version != expected_version {
            return Err(StoreError::Conflict(id.to_string()));
        }
        stored.version += 1;
        stored.value = user;
        Ok(stored.clone())
    }

    async fn list_users(&self, after: Option<&str>, limit: usize) -> Result<Vec<User>, StoreError> {
        let mut page: Vec<User> = self
            .users
            .iter()
            .filter(|u| after.is_none_or(|after| u.key().as_str() > after))
            .map(|u| u.value().value.clone())
            .collect();
        page.sort_by(|a, b| a.id.cmp(&b.id));
        page.truncate(limit);
        Ok(page)
    }
}

#[async_trait]
impl TradeLogRepository for InMemoryStore {
    async fn append_trade(&self, user_id: &str, record: TradeRecord) -> Result<(), StoreError> {
        self.trades
            .entry(user_id.to_string())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn list_trades(&self, user_id: &str) -> Result<Vec<TradeRecord>, StoreError> {
        Ok(self
            .trades
            .get(user_id)
            .map(|log| log.iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn prune_trades(&self, user_id: &str, keep: usize) -> Result<usize, StoreError> {
        let Some(mut log) = self.trades.get_mut(user_id) else {
            return Ok(0);
        };
        let excess = log.len().saturating_sub(keep);
        log.drain(..excess);
        Ok(excess)
    }
}

#[async_trait]
impl ValuationRepository for InMemoryStore {
    async fn put_valuation(
        &self,
        user_id: &str,
        snapshot: ValuationHistory,
    ) -> Result<(), StoreError> {
        self.valuations
            .entry(user_id.to_string())
            .or_default()
            .insert(snapshot.timestamp, snapshot.value);
        Ok(())
    }

    async fn list_valuations(&self, user_id: &str) -> Result<Vec<ValuationHistory>, StoreError> {
        Ok(self
            .valuations
            .get(user_id)
            .map(|history| {
                history
                    .iter()
                    .map(|(timestamp, value)| ValuationHistory {
                        timestamp: *timestamp,
                        value: *value,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_valuations_before(
        &self,
        user_id: &str,
        cutoff: Timestamp,
    ) -> Result<usize, StoreError> {
        let Some(mut history) = self.valuations.get_mut(user_id) else {
            return Ok(0);
        };
        let kept = history.split_off(&cutoff);
        let removed = history.len();
        *history = kept;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use papertrade_core::{DEFAULT_STARTING_CASH, Portfolio, TradeAction};

    fn user(id: &str) -> User {
        User::new(
            id,
            id.to_uppercase(),
            "",
            Utc::now(),
            Portfolio::seeded(DEFAULT_STARTING_CASH, &["BTC"]),
        )
    }

    fn record(units: i64) -> TradeRecord {
        TradeRecord {
            timestamp: Utc::now(),
            symbol: "BTC".into(),
            action: TradeAction::Buy,
            size: Amount::from_units(units),
            price: Amount::from_units(1),
        }
    }

    #[tokio::test]
    async fn test_create_is_exclusive() {
        let store = InMemoryStore::new();
        let created = store.create_user(user("alice")).await.unwrap();
        assert_eq!(created.version, 1);

        let again = store.create_user(user("alice")).await;
        assert_eq!(again, Err(StoreError::AlreadyExists("alice".into())));
    }

    #[tokio::test]
    async fn test_compare_and_set_versions() {
        let store = InMemoryStore::new();
        store.create_user(user("alice")).await.unwrap();

        let mut changed = user("alice");
        changed.display_name = "Alice".into();
        let stored = store.compare_and_set("alice", 1, changed.clone()).await.unwrap();
        assert_eq!(stored.version, 2);

        // stale writer loses and changes nothing
        let stale = store.compare_and_set("alice", 1, user("alice")).await;
        assert_eq!(stale, Err(StoreError::Conflict("alice".into())));
        let current = store.get_user("alice").await.unwrap().unwrap();
        assert_eq!(current.value.display_name, "Alice");

        let missing = store.compare_and_set("bob", 1, user("bob")).await;
        assert_eq!(missing, Err(StoreError::NotFound("bob".into())));
    }

    #[tokio::test]
    async fn test_list_users_pages_in_id_order() {
        let store = InMemoryStore::new();
        for id in ["carol", "alice", "dave", "bob", "erin"] {
            store.create_user(user(id)).await.unwrap();
        }

        let first = store.list_users(None, 2).await.unwrap();
        let ids: Vec<_> = first.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, ["alice", "bob"]);

        let rest = store.list_users(Some("bob"), 10).await.unwrap();
        let ids: Vec<_> = rest.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, ["carol", "dave", "erin"]);
    }

    #[tokio::test]
    async fn test_trade_log_newest_first_and_prune() {
        let store = InMemoryStore::new();
        for i in 1..=5 {
            store.append_trade("alice", record(i)).await.unwrap();
        }

        let trades = store.list_trades("alice").await.unwrap();
        assert_eq!(trades[0].size, Amount::from_units(5));

        assert_eq!(store.prune_trades("alice", 2).await.unwrap(), 3);
        let trades = store.list_trades("alice").await.unwrap();
        let sizes: Vec<_> = trades.iter().map(|t| t.size.units).collect();
        assert_eq!(sizes, [5, 4]);

        assert_eq!(store.prune_trades("alice", 2).await.unwrap(), 0);
        assert_eq!(store.prune_trades("nobody", 2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_valuations_idempotent_and_pruned_by_age() {
        let store = InMemoryStore::new();
        let base = Utc.with_ymd_and_hms(2021, 5, 1, 0, 0, 0).unwrap();
        for h in 0..4 {
            let snapshot = ValuationHistory {
                timestamp: base + Duration::hours(h),
                value: Amount::from_units(h),
            };
            store.put_valuation("alice", snapshot).await.unwrap();
        }
        // same hour again overwrites
        store
            .put_valuation(
                "alice",
                ValuationHistory {
                    timestamp: base,
                    value: Amount::from_units(42),
                },
            )
            .await
            .unwrap();

        let history = store.list_valuations("alice").await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].value, Amount::from_units(42));

        let removed = store
            .delete_valuations_before("alice", base + Duration::hours(2))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        let history = store.list_valuations("alice").await.unwrap();
        assert_eq!(history[0].timestamp, base + Duration::hours(2));
    }
}
