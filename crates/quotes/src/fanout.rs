//! Lazily started, shared quote bus
//!
//! The upstream connection only exists while somebody is watching: the first
//! subscriber opens it, the bus closes it after the last subscriber leaves,
//! and a later subscriber opens a fresh one.

use async_trait::async_trait;
use futures_util::Stream;
use log::info;
use papertrade_core::{Quote, Symbol};
use papertrade_ports::{FeedError, Shutdown};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::bus::{QuoteBus, Subscription};
use crate::ingestor::{IngestorStream, QuoteIngestor};

/// Opens the upstream quote stream for a new bus.
///
/// The stream must end once `shutdown` fires.
#[async_trait]
pub trait UpstreamFactory: Send + Sync {
    type Upstream: Stream<Item = Quote> + Send + 'static;

    async fn open(&self, shutdown: Shutdown) -> Result<Self::Upstream, FeedError>;
}

/// Ingestor-backed upstream for a fixed symbol set
pub struct IngestorUpstream {
    ingestor: Arc<QuoteIngestor>,
    symbols: Vec<Symbol>,
}

impl IngestorUpstream {
    pub fn new(ingestor: Arc<QuoteIngestor>, symbols: Vec<Symbol>) -> Self {
        Self { ingestor, symbols }
    }
}

#[async_trait]
impl UpstreamFactory for IngestorUpstream {
    type Upstream = IngestorStream;

    async fn open(&self, shutdown: Shutdown) -> Result<IngestorStream, FeedError> {
        self.ingestor.connect(&self.symbols, shutdown).await
    }
}

pub struct QuoteFanout<F> {
    factory: F,
    capacity: usize,
    current: Mutex<Option<Arc<QuoteBus>>>,
}

impl<F: UpstreamFactory> QuoteFanout<F> {
    /// `capacity` is the per-subscriber buffer of each bus
    pub fn new(factory: F, capacity: usize) -> Self {
        Self {
            factory,
            capacity,
            current: Mutex::new(None),
        }
    }

    /// Join the live bus, starting one if none is running
    pub async fn subscribe(&self) -> Result<Subscription, FeedError> {
        let mut current = self.current.lock().await;
        if let Some(subscription) = current.as_ref().and_then(|bus| bus.subscribe()) {
            return Ok(subscription);
        }

        let (handle, shutdown) = Shutdown::new();
        let upstream = self.factory.open(shutdown).await?;
        info!("Quote upstream opened");

        let bus = QuoteBus::new(upstream, self.capacity, move || {
            info!("Quote bus closed, releasing upstream");
            handle.trigger();
        });
        let subscription = bus
            .subscribe()
            .ok_or_else(|| FeedError::Connect("upstream closed before first subscriber".into()))?;
        *current = Some(bus);
        Ok(subscription)
    }

    /// Whether a bus is currently open
    pub async fn is_active(&self) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .is_some_and(|bus| !bus.is_closed())
    }

    pub async fn subscriber_count(&self) -> usize {
        match self.current.lock().await.as_ref() {
            Some(bus) => bus.subscriber_count(),
            None => 0,
        }
    }
}
