//! Quote ingestion with indefinite reconnection
//!
//! ```text
//! Connecting ──► Streaming ──► Disconnected ──(backoff)──► Connecting ...
//!      │              │              │
//!      └──────────────┴──────────────┴──► Terminated (shutdown / consumer gone)
//! ```
//!
//! Only the very first connection attempt can fail the caller. After that
//! every upstream end or failed reconnect is retried after a fixed backoff.

use futures_util::Stream;
use log::{debug, info, warn};
use papertrade_core::{Amount, AmountError, Quote, Symbol, is_supported};
use papertrade_ports::{FeedError, QuoteFeed, RawTick, Shutdown, TickReceiver};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct IngestorConfig {
    /// Wait between a disconnection and the next connection attempt
    pub reconnect_backoff: Duration,
    /// Quotes buffered between the ingestor and its consumer
    pub buffer: usize,
}

impl Default for IngestorConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
            buffer: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestorState {
    Disconnected,
    Connecting,
    Streaming,
    /// Absorbing; the ingestor task has exited
    Terminated,
}

/// Connection counters for monitoring
#[derive(Debug, Default)]
pub struct IngestorStats {
    connects: AtomicU64,
    failed_connects: AtomicU64,
    disconnects: AtomicU64,
    quotes: AtomicU64,
    rejected: AtomicU64,
}

impl IngestorStats {
    fn record_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failed_connect(&self) {
        self.failed_connects.fetch_add(1, Ordering::Relaxed);
    }

    fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    fn record_quote(&self) {
        self.quotes.fetch_add(1, Ordering::Relaxed);
    }

    fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Successful connections, the initial one included
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    pub fn failed_connects(&self) -> u64 {
        self.failed_connects.load(Ordering::Relaxed)
    }

    pub fn disconnects(&self) -> u64 {
        self.disconnects.load(Ordering::Relaxed)
    }

    /// Quotes forwarded to the consumer
    pub fn quotes(&self) -> u64 {
        self.quotes.load(Ordering::Relaxed)
    }

    /// Ticks dropped because they could not be decoded
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

#[derive(Error, Debug)]
enum TickError {
    #[error("unknown symbol {0:?}")]
    UnknownSymbol(Symbol),

    #[error("bad {symbol} price: {source}")]
    Price {
        symbol: Symbol,
        #[source]
        source: AmountError,
    },
}

fn decode_tick(symbols: &[Symbol], raw: RawTick) -> Result<Quote, TickError> {
    if !is_supported(symbols, &raw.symbol) {
        return Err(TickError::UnknownSymbol(raw.symbol));
    }
    let price = match Amount::parse(&raw.price) {
        Ok(price) => price,
        Err(source) => {
            return Err(TickError::Price {
                symbol: raw.symbol,
                source,
            });
        }
    };
    Ok(Quote::new(raw.symbol, price, raw.timestamp))
}

/// Turns one [`QuoteFeed`] into a never-ending stream of decoded quotes
pub struct QuoteIngestor {
    feed: Arc<dyn QuoteFeed>,
    config: IngestorConfig,
}

impl QuoteIngestor {
    pub fn new(feed: Arc<dyn QuoteFeed>, config: IngestorConfig) -> Self {
        Self { feed, config }
    }

    pub fn feed_name(&self) -> &str {
        self.feed.name()
    }

    /// Open the feed and spawn the ingestion task.
    ///
    /// Fails only if the initial connection fails. The returned stream ends
    /// once `shutdown` fires; dropping it stops the task as well.
    pub async fn connect(
        &self,
        symbols: &[Symbol],
        shutdown: Shutdown,
    ) -> Result<IngestorStream, FeedError> {
        if symbols.is_empty() {
            return Err(FeedError::NoSymbols);
        }

        let ticks = self.feed.connect(symbols).await?;
        info!("Connected to {} feed for {:?}", self.feed.name(), symbols);

        let stats = Arc::new(IngestorStats::default());
        stats.record_connect();
        let (state_tx, state_rx) = watch::channel(IngestorState::Streaming);
        let (tx, rx) = mpsc::channel(self.config.buffer);

        let worker = Worker {
            feed: self.feed.clone(),
            symbols: symbols.to_vec(),
            backoff: self.config.reconnect_backoff,
            out: tx,
            state: state_tx,
            stats: stats.clone(),
            shutdown,
        };
        tokio::spawn(worker.run(ticks));

        Ok(IngestorStream {
            rx,
            state: state_rx,
            stats,
        })
    }
}

struct Worker {
    feed: Arc<dyn QuoteFeed>,
    symbols: Vec<Symbol>,
    backoff: Duration,
    out: mpsc::Sender<Quote>,
    state: watch::Sender<IngestorState>,
    stats: Arc<IngestorStats>,
    shutdown: Shutdown,
}

impl Worker {
    async fn run(self, first: TickReceiver) {
        let mut ticks = first;
        loop {
            self.state.send_replace(IngestorState::Streaming);
            if !self.pump(&mut ticks).await {
                break;
            }

            self.stats.record_disconnect();
            self.state.send_replace(IngestorState::Disconnected);
            warn!(
                "{} feed disconnected, reconnecting in {:?}",
                self.feed.name(),
                self.backoff
            );

            match self.reconnect().await {
                Some(next) => ticks = next,
                None => break,
            }
        }

        self.state.send_replace(IngestorState::Terminated);
        info!("{} feed ingestor terminated", self.feed.name());
    }

    /// Forward ticks until the upstream ends.
    ///
    /// Returns false when the ingestor has to stop instead of reconnecting.
    async fn pump(&self, ticks: &mut TickReceiver) -> bool {
        loop {
            let raw = tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                _ = self.out.closed() => return false,
                raw = ticks.recv() => raw,
            };
            let Some(raw) = raw else {
                return true;
            };

            let quote = match decode_tick(&self.symbols, raw) {
                Ok(quote) => quote,
                Err(e) => {
                    self.stats.record_rejected();
                    warn!("Dropping tick from {} feed: {}", self.feed.name(), e);
                    continue;
                }
            };
            debug!("{} {}", quote.symbol, quote.price);

            tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                sent = self.out.send(quote) => {
                    if sent.is_err() {
                        return false;
                    }
                    self.stats.record_quote();
                }
            }
        }
    }

    /// Back off and connect again until it works. None means stop.
    async fn reconnect(&self) -> Option<TickReceiver> {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                _ = self.out.closed() => return None,
                _ = tokio::time::sleep(self.backoff) => {}
            }

            self.state.send_replace(IngestorState::Connecting);
            let attempt = tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                attempt = self.feed.connect(&self.symbols) => attempt,
            };

            match attempt {
                Ok(ticks) => {
                    self.stats.record_connect();
                    info!("Reconnected to {} feed", self.feed.name());
                    return Some(ticks);
                }
                Err(e) => {
                    self.stats.record_failed_connect();
                    self.state.send_replace(IngestorState::Disconnected);
                    warn!("Reconnect to {} feed failed: {}", self.feed.name(), e);
                }
            }
        }
    }
}

/// Consumer side of a running ingestor
pub struct IngestorStream {
    rx: mpsc::Receiver<Quote>,
    state: watch::Receiver<IngestorState>,
    stats: Arc<IngestorStats>,
}

impl IngestorStream {
    pub async fn recv(&mut self) -> Option<Quote> {
        self.rx.recv().await
    }

    pub fn state(&self) -> IngestorState {
        *self.state.borrow()
    }

    /// Follow state transitions
    pub fn watch_state(&self) -> watch::Receiver<IngestorState> {
        self.state.clone()
    }

    pub fn stats(&self) -> Arc<IngestorStats> {
        self.stats.clone()
    }
}

impl Stream for IngestorStream {
    type Item = Quote;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Quote>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::ChannelFeed;
    use chrono::Utc;

    fn tick(symbol: &str, price: &str) -> RawTick {
        RawTick {
            symbol: symbol.to_string(),
            price: price.to_string(),
            timestamp: Utc::now(),
        }
    }

    fn symbols() -> Vec<Symbol> {
        vec!["BTC".to_string(), "ETH".to_string()]
    }

    #[tokio::test]
    async fn test_initial_connect_failure_is_returned() {
        let (feed, controller) = ChannelFeed::new(16);
        controller.fail_next(1);
        let ingestor = QuoteIngestor::new(Arc::new(feed), IngestorConfig::default());

        let result = ingestor.connect(&symbols(), Shutdown::never()).await;
        assert!(matches!(result, Err(FeedError::Connect(_))));
    }

    #[tokio::test]
    async fn test_bad_ticks_are_dropped() {
        let (feed, mut controller) = ChannelFeed::new(16);
        let ingestor = QuoteIngestor::new(Arc::new(feed), IngestorConfig::default());
        let mut stream = ingestor
            .connect(&symbols(), Shutdown::never())
            .await
            .unwrap();
        let upstream = controller.accept().await.unwrap();

        upstream.send(tick("BTC", "not-a-price")).await.unwrap();
        upstream.send(tick("XRP", "1.0")).await.unwrap();
        upstream.send(tick("BTC", "57469.71")).await.unwrap();

        let quote = stream.recv().await.unwrap();
        assert_eq!(quote.symbol, "BTC");
        assert_eq!(quote.price, Amount::new(57_469, 710_000_000));
        assert_eq!(stream.stats().rejected(), 2);
        assert_eq!(stream.state(), IngestorState::Streaming);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_upstream_closes() {
        let (feed, mut controller) = ChannelFeed::new(16);
        let ingestor = QuoteIngestor::new(Arc::new(feed), IngestorConfig::default());
        let mut stream = ingestor
            .connect(&symbols(), Shutdown::never())
            .await
            .unwrap();

        let first = controller.accept().await.unwrap();
        first.send(tick("ETH", "2000")).await.unwrap();
        assert_eq!(stream.recv().await.unwrap().symbol, "ETH");
        drop(first);

        let second = controller.accept().await.unwrap();
        second.send(tick("BTC", "30000")).await.unwrap();
        assert_eq!(stream.recv().await.unwrap().symbol, "BTC");

        let stats = stream.stats();
        assert_eq!(stats.connects(), 2);
        assert_eq!(stats.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reconnects_are_retried() {
        let (feed, mut controller) = ChannelFeed::new(16);
        let ingestor = QuoteIngestor::new(Arc::new(feed), IngestorConfig::default());
        let mut stream = ingestor
            .connect(&symbols(), Shutdown::never())
            .await
            .unwrap();

        controller.fail_next(3);
        drop(controller.accept().await.unwrap());

        let upstream = controller.accept().await.unwrap();
        upstream.send(tick("BTC", "1")).await.unwrap();
        assert!(stream.recv().await.is_some());

        assert_eq!(stream.stats().failed_connects(), 3);
        assert_eq!(controller.connect_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_terminates() {
        let (feed, mut controller) = ChannelFeed::new(16);
        let ingestor = QuoteIngestor::new(Arc::new(feed), IngestorConfig::default());
        let (handle, shutdown) = Shutdown::new();
        let mut stream = ingestor.connect(&symbols(), shutdown).await.unwrap();
        let upstream = controller.accept().await.unwrap();
        let mut state = stream.watch_state();

        handle.trigger();

        assert!(stream.recv().await.is_none());
        state
            .wait_for(|s| *s == IngestorState::Terminated)
            .await
            .unwrap();
        // the feed connection is released with the task
        upstream.closed().await;
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_feed() {
        let (feed, mut controller) = ChannelFeed::new(16);
        let ingestor = QuoteIngestor::new(Arc::new(feed), IngestorConfig::default());
        let stream = ingestor
            .connect(&symbols(), Shutdown::never())
            .await
            .unwrap();
        let upstream = controller.accept().await.unwrap();

        drop(stream);
        upstream.closed().await;
    }
}
