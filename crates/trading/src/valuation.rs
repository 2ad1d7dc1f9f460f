//! Hourly portfolio valuation
//!
//! Each run marks every user's portfolio to market at the start of the current
//! hour and drops snapshots past the retention window. Writing the same hour
//! twice overwrites, so a rerun within the hour is harmless.

use chrono::{DurationRound, TimeDelta};
use log::{error, info, warn};
use papertrade_core::{Amount, Symbol, Timestamp, User, ValuationHistory};
use papertrade_ports::{Clock, QuoteSource, Shutdown, UserRepository, ValuationRepository};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep_until, timeout};

use crate::config::ValuationConfig;
use crate::error::TradeError;

/// Start of the hour containing `at`
pub fn truncate_to_hour(at: Timestamp) -> Timestamp {
    at.duration_trunc(TimeDelta::hours(1)).unwrap_or(at)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValuationReport {
    pub valued: usize,
    pub failed: usize,
    /// Expired snapshots deleted across all users
    pub pruned: usize,
}

pub struct ValuationJob<K, U, V, Q>
where
    K: Clock,
    U: UserRepository,
    V: ValuationRepository,
    Q: QuoteSource,
{
    clock: Arc<K>,
    users: Arc<U>,
    valuations: Arc<V>,
    quotes: Arc<Q>,
    symbols: Vec<Symbol>,
    config: ValuationConfig,
}

impl<K, U, V, Q> ValuationJob<K, U, V, Q>
where
    K: Clock,
    U: UserRepository,
    V: ValuationRepository + 'static,
    Q: QuoteSource,
{
    pub fn new(
        clock: Arc<K>,
        users: Arc<U>,
        valuations: Arc<V>,
        quotes: Arc<Q>,
        symbols: Vec<Symbol>,
        config: ValuationConfig,
    ) -> Self {
        Self {
            clock,
            users,
            valuations,
            quotes,
            symbols,
            config,
        }
    }

    /// Value every user once at the hour containing `now`.
    ///
    /// Fails as a whole only if a quote or a user page cannot be fetched;
    /// single-user failures are logged and counted.
    pub async fn run_once(&self, now: Timestamp) -> Result<ValuationReport, TradeError> {
        let at = truncate_to_hour(now);
        let cutoff = at - self.config.max_history();
        let quotes = Arc::new(self.fetch_quotes().await?);

        let permits = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let page_size = self.config.page_size.max(1);
        let mut tasks = JoinSet::new();
        let mut after: Option<String> = None;

        loop {
            let page = self.users.list_users(after.as_deref(), page_size).await?;
            let full_page = page.len() == page_size;
            after = page.last().map(|u| u.id.clone());

            for user in page {
                let permit = permits
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| TradeError::Internal(e.to_string()))?;
                let valuations = self.valuations.clone();
                let quotes = quotes.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    let result = value_user(valuations.as_ref(), &user, &quotes, at, cutoff).await;
                    (user.id, result)
                });
            }

            if !full_page {
                break;
            }
        }

        let mut report = ValuationReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(pruned))) => {
                    report.valued += 1;
                    report.pruned += pruned;
                }
                Ok((user_id, Err(e))) => {
                    warn!("Valuation of {} failed: {}", user_id, e);
                    report.failed += 1;
                }
                Err(e) => {
                    error!("Valuation task panicked: {}", e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Valuation at {}: {} valued, {} failed, {} expired snapshots removed",
            at, report.valued, report.failed, report.pruned
        );
        Ok(report)
    }

    /// Run on a fixed interval until `shutdown` fires, abandoning a run in
    /// progress. The first run is immediate; a run that fails as a whole is
    /// retried after the configured backoff instead of a full interval.
    pub async fn run(&self, interval: Duration, shutdown: Shutdown) {
        let retry = self.config.retry_backoff().min(interval);
        let mut next = Instant::now();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep_until(next) => {}
            }
            let started = Instant::now();
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.run_once(self.clock.now()) => {
                    next = match result {
                        Ok(_) => started + interval,
                        Err(e) => {
                            error!("Valuation run failed, retrying in {:?}: {}", retry, e);
                            Instant::now() + retry
                        }
                    };
                }
            }
        }
        info!("Valuation job stopped");
    }

    async fn fetch_quotes(&self) -> Result<HashMap<Symbol, Amount>, TradeError> {
        let mut quotes = HashMap::with_capacity(self.symbols.len());
        for symbol in &self.symbols {
            let fetch = self
                .quotes
                .fresh_quote(symbol, self.config.max_quote_age());
            let price = match timeout(self.config.quote_deadline(), fetch).await {
                Ok(price) => price?,
                Err(_) => {
                    return Err(TradeError::Unavailable(format!(
                        "no fresh {} quote for valuation",
                        symbol
                    )));
                }
            };
            quotes.insert(symbol.clone(), price);
        }
        Ok(quotes)
    }
}

async fn value_user<V: ValuationRepository>(
    valuations: &V,
    user: &User,
    quotes: &HashMap<Symbol, Amount>,
    at: Timestamp,
    cutoff: Timestamp,
) -> Result<usize, TradeError> {
    let value = user.portfolio.valuation(quotes)?;
    valuations
        .put_valuation(&user.id, ValuationHistory { timestamp: at, value })
        .await?;
    Ok(valuations.delete_valuations_before(&user.id, cutoff).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::InMemoryStore;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use papertrade_clock::ManualClock;
    use papertrade_core::{DEFAULT_STARTING_CASH, Portfolio, TradeAction};
    use papertrade_ports::QuoteError;

    struct FixedQuotes(HashMap<String, Amount>);

    #[async_trait]
    impl QuoteSource for FixedQuotes {
        async fn fresh_quote(&self, symbol: &str, _max_age: Duration) -> Result<Amount, QuoteError> {
            match self.0.get(symbol) {
                Some(price) => Ok(*price),
                None => std::future::pending().await,
            }
        }
    }

    /// Prices that can be published after the job has started
    #[derive(Default)]
    struct LateQuotes(dashmap::DashMap<String, Amount>);

    #[async_trait]
    impl QuoteSource for LateQuotes {
        async fn fresh_quote(&self, symbol: &str, _max_age: Duration) -> Result<Amount, QuoteError> {
            match self.0.get(symbol) {
                Some(price) => Ok(*price),
                None => std::future::pending().await,
            }
        }
    }

    fn start() -> Timestamp {
        Utc.with_ymd_and_hms(2021, 5, 1, 12, 34, 56).unwrap()
    }

    fn symbols() -> Vec<Symbol> {
        vec!["BTC".to_string(), "ETH".to_string()]
    }

    async fn seed_users(store: &InMemoryStore, count: usize) {
        for i in 0..count {
            let mut portfolio = Portfolio::seeded(DEFAULT_STARTING_CASH, &symbols());
            portfolio
                .apply_trade(TradeAction::Buy, "BTC", Amount::from_units(30_000), Amount::from_units(1))
                .unwrap();
            let user = User::new(format!("user{:03}", i), "", "", start(), portfolio);
            store.create_user(user).await.unwrap();
        }
    }

    fn job(
        store: &InMemoryStore,
        prices: &[(&str, i64)],
        config: ValuationConfig,
    ) -> ValuationJob<ManualClock, InMemoryStore, InMemoryStore, FixedQuotes> {
        let quotes = prices
            .iter()
            .map(|(s, p)| (s.to_string(), Amount::from_units(*p)))
            .collect();
        ValuationJob::new(
            Arc::new(ManualClock::starting_at(start())),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(FixedQuotes(quotes)),
            symbols(),
            config,
        )
    }

    #[test]
    fn test_truncate_to_hour() {
        assert_eq!(
            truncate_to_hour(start()),
            Utc.with_ymd_and_hms(2021, 5, 1, 12, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_values_every_user_across_pages() {
        let store = InMemoryStore::new();
        seed_users(&store, 25).await;
        let config = ValuationConfig {
            page_size: 10,
            parallelism: 3,
            ..ValuationConfig::default()
        };
        let job = job(&store, &[("BTC", 40_000), ("ETH", 2_000)], config);

        let report = job.run_once(start()).await.unwrap();
        assert_eq!(report.valued, 25);
        assert_eq!(report.failed, 0);

        let history = store.list_valuations("user024").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].timestamp, truncate_to_hour(start()));
        // 70000 cash + 1 BTC @ 40000
        assert_eq!(history[0].value, Amount::from_units(110_000));
    }

    #[tokio::test]
    async fn test_rerun_in_same_hour_overwrites() {
        let store = InMemoryStore::new();
        seed_users(&store, 1).await;
        let job = job(&store, &[("BTC", 40_000), ("ETH", 2_000)], ValuationConfig::default());

        job.run_once(start()).await.unwrap();
        job.run_once(start() + chrono::Duration::minutes(20)).await.unwrap();
        assert_eq!(store.list_valuations("user000").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_old_snapshots_expire() {
        let store = InMemoryStore::new();
        seed_users(&store, 1).await;
        let old = truncate_to_hour(start()) - chrono::Duration::days(32);
        store
            .put_valuation(
                "user000",
                ValuationHistory {
                    timestamp: old,
                    value: Amount::from_units(1),
                },
            )
            .await
            .unwrap();

        let job = job(&store, &[("BTC", 40_000), ("ETH", 2_000)], ValuationConfig::default());
        let report = job.run_once(start()).await.unwrap();
        assert_eq!(report.pruned, 1);

        let history = store.list_valuations("user000").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].timestamp, truncate_to_hour(start()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_quote_fails_the_run() {
        let store = InMemoryStore::new();
        seed_users(&store, 2).await;
        let job = job(&store, &[("BTC", 40_000)], ValuationConfig::default());

        let result = job.run_once(start()).await;
        assert!(matches!(result, Err(TradeError::Unavailable(_))));
        assert!(store.list_valuations("user000").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_repeats_until_shutdown() {
        let store = InMemoryStore::new();
        seed_users(&store, 1).await;
        let job = Arc::new(job(&store, &[("BTC", 40_000), ("ETH", 2_000)], ValuationConfig::default()));
        let (handle, shutdown) = Shutdown::new();

        let runner = tokio::spawn({
            let job = job.clone();
            async move { job.run(Duration::from_secs(3_600), shutdown).await }
        });

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.list_valuations("user000").await.unwrap().len(), 1);

        handle.trigger();
        runner.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_is_retried_before_the_next_interval() {
        let store = InMemoryStore::new();
        seed_users(&store, 1).await;
        let quotes = Arc::new(LateQuotes::default());
        let job = Arc::new(ValuationJob::new(
            Arc::new(ManualClock::starting_at(start())),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            quotes.clone(),
            symbols(),
            ValuationConfig::default(),
        ));
        let (handle, shutdown) = Shutdown::new();

        let runner = tokio::spawn({
            let job = job.clone();
            async move { job.run(Duration::from_secs(3_600), shutdown).await }
        });

        // the startup run finds no quotes yet and gives up at its deadline
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(store.list_valuations("user000").await.unwrap().is_empty());

        quotes.0.insert("BTC".to_string(), Amount::from_units(40_000));
        quotes.0.insert("ETH".to_string(), Amount::from_units(2_000));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.list_valuations("user000").await.unwrap().len(), 1);

        handle.trigger();
        runner.await.unwrap();
    }
}
