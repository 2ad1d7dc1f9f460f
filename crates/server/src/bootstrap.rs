//! Process wiring
//!
//! Builds the store, quote pipeline, ledger and valuation job from a
//! [`ServerConfig`] and runs the background tasks:
//! - the cache sync loop, which holds one subscription on the quote bus so
//!   trades always have fresh prices
//! - the hourly valuation job

use log::{info, warn};
use papertrade_clock::SystemClock;
use papertrade_ports::{IdentityProvider, QuoteFeed, Shutdown, ShutdownHandle};
use papertrade_quotes::{
    BinanceFeed, CoinbaseFeed, IngestorConfig, IngestorUpstream, QuoteCache, QuoteIngestor,
};
use papertrade_trading::{
    AccountService, InMemoryStore, InMemoryTradeHistoryCache, TradeEngine, ValuationJob,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use crate::config::{FeedConfig, FeedProvider, ServerConfig};
use crate::service::{Fanout, PaperTradeService};

/// Upstream feed adapter for the configured provider
pub fn feed_for(config: &FeedConfig) -> Arc<dyn QuoteFeed> {
    match config.provider {
        FeedProvider::Coinbase => Arc::new(CoinbaseFeed::new(config.url())),
        FeedProvider::Binance => Arc::new(BinanceFeed::new(config.url())),
    }
}

/// A running paper-trading process
pub struct PaperTrade {
    pub service: Arc<PaperTradeService>,
    pub cache: Arc<QuoteCache>,
    pub store: InMemoryStore,
    stop: ShutdownHandle,
    tasks: JoinSet<()>,
}

impl PaperTrade {
    /// Wire every component and spawn the background tasks.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(
        config: ServerConfig,
        feed: Arc<dyn QuoteFeed>,
        identities: Arc<dyn IdentityProvider>,
    ) -> Self {
        let symbols = config.trading.supported_symbols.clone();
        info!(
            "Starting paper trading on {} feed for {:?}",
            feed.name(),
            symbols
        );

        let clock = Arc::new(SystemClock::new());
        let store = InMemoryStore::new();
        let history_cache = Arc::new(InMemoryTradeHistoryCache::with_ttl(
            config.trading.trade_history_ttl(),
        ));
        let cache = Arc::new(QuoteCache::new());

        let ingestor = Arc::new(QuoteIngestor::new(
            feed,
            IngestorConfig {
                reconnect_backoff: config.feed.reconnect_backoff(),
                buffer: config.feed.buffer,
            },
        ));
        let fanout = Arc::new(Fanout::new(
            IngestorUpstream::new(ingestor, symbols.clone()),
            config.quotes.bus_capacity,
        ));

        let engine = Arc::new(TradeEngine::new(
            clock.clone(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            cache.clone(),
            history_cache.clone(),
            config.trading.clone(),
        ));
        let accounts = Arc::new(AccountService::new(
            clock.clone(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            history_cache,
            &config.trading,
        ));
        let valuation = ValuationJob::new(
            clock,
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            cache.clone(),
            symbols,
            config.valuation.clone(),
        );

        let (stop, shutdown) = Shutdown::new();
        let mut tasks = JoinSet::new();
        tasks.spawn(keep_cache_warm(
            fanout.clone(),
            cache.clone(),
            config.quotes.resubscribe_backoff(),
            shutdown.clone(),
        ));
        let interval = config.valuation.interval();
        tasks.spawn(async move { valuation.run(interval, shutdown).await });

        let service = Arc::new(PaperTradeService::new(
            identities,
            accounts,
            engine,
            fanout,
            config.quotes,
        ));

        Self {
            service,
            cache,
            store,
            stop,
            tasks,
        }
    }

    /// Stop the background tasks and wait for them to finish
    pub async fn shutdown(mut self) {
        info!("Shutting down");
        self.stop.trigger();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Background task failed: {}", e);
            }
        }
    }
}

/// Keep the cache subscribed to the quote bus, resubscribing whenever the
/// bus goes away
async fn keep_cache_warm(
    fanout: Arc<Fanout>,
    cache: Arc<QuoteCache>,
    backoff: Duration,
    shutdown: Shutdown,
) {
    loop {
        match fanout.subscribe().await {
            Ok(subscription) => {
                tokio::select! {
                    _ = cache.sync(subscription) => warn!("Quote cache lost its stream, resubscribing"),
                    _ = shutdown.cancelled() => break,
                }
            }
            Err(e) => warn!("Quote upstream unavailable: {}", e),
        }

        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = shutdown.cancelled() => break,
        }
    }
    info!("Quote cache sync stopped");
}
