use log::{debug, info, warn};
use papertrade_core::{Amount, Portfolio, Symbol, TradeRecord, User, ValuationHistory};
use papertrade_ports::{
    AuthenticatedUser, Clock, HistoryLookup, StoreError, TradeHistoryCache, TradeLogRepository,
    UserRepository, ValuationRepository,
};
use std::sync::Arc;

use crate::config::TradeEngineConfig;
use crate::error::TradeError;
use crate::valuation::truncate_to_hour;

/// Account bootstrap and the read side of the ledger
pub struct AccountService<K, U, L, V, H>
where
    K: Clock,
    U: UserRepository,
    L: TradeLogRepository,
    V: ValuationRepository,
    H: TradeHistoryCache,
{
    clock: Arc<K>,
    users: Arc<U>,
    trade_log: Arc<L>,
    valuations: Arc<V>,
    history_cache: Arc<H>,
    starting_cash: Amount,
    symbols: Vec<Symbol>,
}

impl<K, U, L, V, H> AccountService<K, U, L, V, H>
where
    K: Clock,
    U: UserRepository,
    L: TradeLogRepository,
    V: ValuationRepository,
    H: TradeHistoryCache,
{
    pub fn new(
        clock: Arc<K>,
        users: Arc<U>,
        trade_log: Arc<L>,
        valuations: Arc<V>,
        history_cache: Arc<H>,
        config: &TradeEngineConfig,
    ) -> Self {
        Self {
            clock,
            users,
            trade_log,
            valuations,
            history_cache,
            starting_cash: config.starting_cash,
            symbols: config.supported_symbols.clone(),
        }
    }

    /// Get the caller's account, creating it on first access.
    ///
    /// A new account starts with the configured cash, a zero position in every
    /// supported symbol and one valuation snapshot worth its starting cash.
    pub async fn ensure_account(&self, identity: &dyn AuthenticatedUser) -> Result<User, TradeError> {
        let key = identity.db_key();
        if let Some(existing) = self.users.get_user(&key).await? {
            return Ok(existing.value);
        }

        let now = self.clock.now();
        let user = User::new(
            key.clone(),
            identity.display_name(),
            identity.profile_url(),
            now,
            Portfolio::seeded(self.starting_cash, &self.symbols),
        );

        match self.users.create_user(user).await {
            Ok(created) => {
                info!("Created account {} ({})", key, created.value.display_name);
                let snapshot = ValuationHistory {
                    timestamp: truncate_to_hour(now),
                    value: self.starting_cash,
                };
                if let Err(e) = self.valuations.put_valuation(&key, snapshot).await {
                    warn!("Failed to write initial valuation for {}: {}", key, e);
                }
                Ok(created.value)
            }
            // another request created it first
            Err(StoreError::AlreadyExists(_)) => self
                .users
                .get_user(&key)
                .await?
                .map(|stored| stored.value)
                .ok_or_else(|| TradeError::Internal(format!("account {} vanished", key))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn portfolio(&self, user_id: &str) -> Result<Portfolio, TradeError> {
        self.users
            .get_user(user_id)
            .await?
            .map(|stored| stored.value.portfolio)
            .ok_or_else(|| TradeError::Validation(format!("no account for {}", user_id)))
    }

    /// Recent trades, newest first, read through the history cache.
    ///
    /// A cache failure falls back to the trade log; the fresh list is cached
    /// only when no trade committed while it was being read.
    pub async fn trade_history(&self, user_id: &str) -> Result<Vec<TradeRecord>, TradeError> {
        let generation = match self.history_cache.get(user_id).await {
            Ok(HistoryLookup::Hit(trades)) => return Ok(trades),
            Ok(HistoryLookup::Miss { generation }) => Some(generation),
            Err(e) => {
                warn!("Trade history cache read failed for {}: {}", user_id, e);
                None
            }
        };

        let trades = self.trade_log.list_trades(user_id).await?;
        if let Some(generation) = generation {
            match self.history_cache.save(user_id, generation, &trades).await {
                Ok(true) => {}
                Ok(false) => debug!("Trade history of {} changed while reading, not cached", user_id),
                Err(e) => warn!("Trade history cache write failed for {}: {}", user_id, e),
            }
        }
        Ok(trades)
    }

    /// Valuation snapshots, oldest first
    pub async fn valuation_history(
        &self,
        user_id: &str,
    ) -> Result<Vec<ValuationHistory>, TradeError> {
        Ok(self.valuations.list_valuations(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{TradeEngine, TradeRequest};
    use crate::infrastructure::{InMemoryStore, InMemoryTradeHistoryCache};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use papertrade_clock::ManualClock;
    use papertrade_core::TradeAction;
    use papertrade_ports::{QuoteError, QuoteSource, StaticUser};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    type Service =
        AccountService<ManualClock, InMemoryStore, InMemoryStore, InMemoryStore, InMemoryTradeHistoryCache>;

    fn clock() -> ManualClock {
        ManualClock::starting_at(Utc.with_ymd_and_hms(2021, 5, 1, 12, 34, 56).unwrap())
    }

    fn service() -> (Service, InMemoryStore, InMemoryTradeHistoryCache) {
        let store = InMemoryStore::new();
        let cache = InMemoryTradeHistoryCache::new();
        let service = AccountService::new(
            Arc::new(clock()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(cache.clone()),
            &TradeEngineConfig::default(),
        );
        (service, store, cache)
    }

    fn alice() -> StaticUser {
        StaticUser::new("github_1", "alice", "https://github.com/alice")
    }

    fn sell_record() -> TradeRecord {
        TradeRecord {
            timestamp: Utc.with_ymd_and_hms(2021, 5, 1, 12, 0, 0).unwrap(),
            symbol: "BTC".into(),
            action: TradeAction::Sell,
            size: Amount::from_units(1),
            price: Amount::from_units(2),
        }
    }

    /// Counts reads and can hold the next `list_trades` result until released
    #[derive(Default)]
    struct GatedLog {
        inner: InMemoryStore,
        reads: AtomicUsize,
        armed: AtomicBool,
        read_done: Notify,
        release: Notify,
    }

    impl GatedLog {
        fn new(inner: InMemoryStore) -> Self {
            Self {
                inner,
                ..Self::default()
            }
        }

        fn hold_next_read(&self) {
            self.armed.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl TradeLogRepository for GatedLog {
        async fn append_trade(&self, user_id: &str, record: TradeRecord) -> Result<(), StoreError> {
            self.inner.append_trade(user_id, record).await
        }

        async fn list_trades(&self, user_id: &str) -> Result<Vec<TradeRecord>, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let trades = self.inner.list_trades(user_id).await?;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.read_done.notify_one();
                self.release.notified().await;
            }
            Ok(trades)
        }

        async fn prune_trades(&self, user_id: &str, keep: usize) -> Result<usize, StoreError> {
            self.inner.prune_trades(user_id, keep).await
        }
    }

    /// Cache backend that is down
    struct BrokenCache;

    #[async_trait]
    impl TradeHistoryCache for BrokenCache {
        async fn get(&self, _user_id: &str) -> Result<HistoryLookup, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn save(
            &self,
            _user_id: &str,
            _generation: u64,
            _trades: &[TradeRecord],
        ) -> Result<bool, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn invalidate(&self, _user_id: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }
    }

    struct OnePrice(Amount);

    #[async_trait]
    impl QuoteSource for OnePrice {
        async fn fresh_quote(&self, _symbol: &str, _max_age: Duration) -> Result<Amount, QuoteError> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn test_ensure_account_creates_once() {
        let (service, store, _) = service();

        let user = service.ensure_account(&alice()).await.unwrap();
        assert_eq!(user.id, "github_1");
        assert_eq!(user.portfolio.cash, Amount::from_units(100_000));
        assert_eq!(user.portfolio.positions.len(), 3);

        let history = store.list_valuations("github_1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].timestamp,
            Utc.with_ymd_and_hms(2021, 5, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(history[0].value, Amount::from_units(100_000));

        // second access returns the stored account untouched
        let mut changed = user.clone();
        changed.portfolio.cash = Amount::from_units(5);
        store.compare_and_set("github_1", 1, changed).await.unwrap();
        let again = service.ensure_account(&alice()).await.unwrap();
        assert_eq!(again.portfolio.cash, Amount::from_units(5));
    }

    #[tokio::test]
    async fn test_concurrent_first_access_creates_one_account() {
        let (service, store, _) = service();
        let service = Arc::new(service);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.ensure_account(&alice()).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        assert_eq!(store.list_users(None, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_trade_history_reads_through_cache() {
        let (service, store, cache) = service();
        let record = sell_record();
        store.append_trade("github_1", record.clone()).await.unwrap();

        assert!(cache.is_empty());
        let trades = service.trade_history("github_1").await.unwrap();
        assert_eq!(trades, vec![record.clone()]);
        assert_eq!(cache.get("github_1").await.unwrap().hit(), Some(vec![record]));

        // served from cache until invalidated
        store.append_trade("github_1", trades[0].clone()).await.unwrap();
        assert_eq!(service.trade_history("github_1").await.unwrap().len(), 1);
        cache.invalidate("github_1").await.unwrap();
        assert_eq!(service.trade_history("github_1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_the_trade_log() {
        let store = InMemoryStore::new();
        store.append_trade("github_1", sell_record()).await.unwrap();
        let log = Arc::new(GatedLog::new(store.clone()));
        let service = AccountService::new(
            Arc::new(clock()),
            Arc::new(store.clone()),
            log.clone(),
            Arc::new(store.clone()),
            Arc::new(InMemoryTradeHistoryCache::new()),
            &TradeEngineConfig::default(),
        );

        for _ in 0..3 {
            assert_eq!(service.trade_history("github_1").await.unwrap().len(), 1);
        }
        assert_eq!(log.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_history_is_cached_too() {
        let (service, _, cache) = service();
        assert!(service.trade_history("github_1").await.unwrap().is_empty());
        assert_eq!(cache.get("github_1").await.unwrap().hit(), Some(vec![]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_history_is_read_again() {
        let store = InMemoryStore::new();
        let cache = InMemoryTradeHistoryCache::with_ttl(Duration::from_secs(60));
        let service = AccountService::new(
            Arc::new(clock()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(cache.clone()),
            &TradeEngineConfig::default(),
        );

        assert!(service.trade_history("github_1").await.unwrap().is_empty());
        // written behind the cache's back; only expiry can surface it
        store.append_trade("github_1", sell_record()).await.unwrap();
        assert!(service.trade_history("github_1").await.unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(service.trade_history("github_1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_broken_cache_falls_back_to_trade_log() {
        let store = InMemoryStore::new();
        store.append_trade("github_1", sell_record()).await.unwrap();
        let service = AccountService::new(
            Arc::new(clock()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(BrokenCache),
            &TradeEngineConfig::default(),
        );

        assert_eq!(
            service.trade_history("github_1").await.unwrap(),
            vec![sell_record()]
        );
    }

    #[tokio::test]
    async fn test_history_read_racing_a_trade_is_not_cached() {
        let _ = env_logger::builder().is_test(true).try_init();
        let store = InMemoryStore::new();
        let log = Arc::new(GatedLog::new(store.clone()));
        let cache = InMemoryTradeHistoryCache::new();
        let config = TradeEngineConfig::default();
        let clock = Arc::new(clock());

        let service = Arc::new(AccountService::new(
            clock.clone(),
            Arc::new(store.clone()),
            log.clone(),
            Arc::new(store.clone()),
            Arc::new(cache.clone()),
            &config,
        ));
        let engine = TradeEngine::new(
            clock,
            Arc::new(store.clone()),
            log.clone(),
            Arc::new(OnePrice(Amount::from_units(30_000))),
            Arc::new(cache.clone()),
            config,
        );
        let user = service.ensure_account(&alice()).await.unwrap();

        // the reader misses and reads the empty log, then stalls before caching
        log.hold_next_read();
        let reader = tokio::spawn({
            let service = service.clone();
            let user_id = user.id.clone();
            async move { service.trade_history(&user_id).await }
        });
        log.read_done.notified().await;

        // a trade commits and invalidates while the reader is stalled
        engine
            .execute(&user.id, TradeRequest::buy("BTC", Amount::from_units(1)))
            .await
            .unwrap();
        log.release.notify_one();

        assert!(reader.await.unwrap().unwrap().is_empty());
        assert!(cache.is_empty());

        let history = service.trade_history(&user.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, TradeAction::Buy);
    }

    #[tokio::test]
    async fn test_portfolio_of_unknown_user() {
        let (service, _, _) = service();
        assert!(matches!(
            service.portfolio("nobody").await,
            Err(TradeError::Validation(_))
        ));
    }
}
