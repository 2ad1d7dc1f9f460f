//! Last known price per symbol
//!
//! Entries are aged from the moment this process received them, not from the
//! feed's timestamp, so a lagging feed clock cannot make a stale price look
//! fresh.

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use log::{debug, info};
use papertrade_core::{Amount, Quote, Symbol};
use papertrade_ports::{QuoteError, QuoteSource, Shutdown};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CachedQuote {
    quote: Quote,
    received: Instant,
}

#[derive(Default)]
pub struct QuoteCache {
    entries: Mutex<HashMap<Symbol, CachedQuote>>,
    updated: Notify,
}

impl QuoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the entry for `quote.symbol` and wake every waiting reader
    pub fn update(&self, quote: Quote) {
        let entry = CachedQuote {
            quote,
            received: Instant::now(),
        };
        self.entries.lock().insert(entry.quote.symbol.clone(), entry);
        self.updated.notify_waiters();
    }

    /// Latest quote regardless of age
    pub fn latest(&self, symbol: &str) -> Option<Quote> {
        self.entries.lock().get(symbol).map(|e| e.quote.clone())
    }

    fn fresh(&self, symbol: &str, max_age: Duration) -> Option<Amount> {
        let entries = self.entries.lock();
        let entry = entries.get(symbol)?;
        (entry.received.elapsed() < max_age).then_some(entry.quote.price)
    }

    /// Price received less than `max_age` ago, waiting for one if needed
    pub async fn get(
        &self,
        symbol: &str,
        max_age: Duration,
        shutdown: &Shutdown,
    ) -> Result<Amount, QuoteError> {
        loop {
            // register before checking so an update in between is not missed
            let notified = self.updated.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(price) = self.fresh(symbol, max_age) {
                return Ok(price);
            }
            debug!("No fresh {} quote, waiting", symbol);

            tokio::select! {
                _ = &mut notified => {}
                _ = shutdown.cancelled() => return Err(QuoteError::Cancelled),
            }
        }
    }

    /// Feed the cache from a quote stream until it ends
    pub async fn sync<S>(&self, stream: S)
    where
        S: Stream<Item = Quote>,
    {
        let mut stream = std::pin::pin!(stream);
        let mut count = 0u64;
        while let Some(quote) = stream.next().await {
            self.update(quote);
            count += 1;
        }
        info!("Quote stream ended after {} updates", count);
    }
}

#[async_trait]
impl QuoteSource for QuoteCache {
    async fn fresh_quote(&self, symbol: &str, max_age: Duration) -> Result<Amount, QuoteError> {
        self.get(symbol, max_age, &Shutdown::never()).await
    }
}
