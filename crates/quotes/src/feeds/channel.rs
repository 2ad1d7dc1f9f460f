//! In-process feed driven by the test harness
//!
//! Every `connect` opens a fresh channel and hands its sending half to the
//! [`FeedController`]. Dropping that sender simulates the upstream closing the
//! connection.

use async_trait::async_trait;
use papertrade_core::Symbol;
use papertrade_ports::{FeedError, QuoteFeed, RawTick, TickReceiver};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::mpsc;

pub struct ChannelFeed {
    buffer: usize,
    connections: mpsc::UnboundedSender<mpsc::Sender<RawTick>>,
    pending_failures: Arc<AtomicUsize>,
    connects: Arc<AtomicU64>,
}

/// Test-side handle of a [`ChannelFeed`]
pub struct FeedController {
    connections: mpsc::UnboundedReceiver<mpsc::Sender<RawTick>>,
    pending_failures: Arc<AtomicUsize>,
    connects: Arc<AtomicU64>,
}

impl ChannelFeed {
    pub fn new(buffer: usize) -> (Self, FeedController) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending_failures = Arc::new(AtomicUsize::new(0));
        let connects = Arc::new(AtomicU64::new(0));
        (
            Self {
                buffer,
                connections: tx,
                pending_failures: pending_failures.clone(),
                connects: connects.clone(),
            },
            FeedController {
                connections: rx,
                pending_failures,
                connects,
            },
        )
    }
}

#[async_trait]
impl QuoteFeed for ChannelFeed {
    async fn connect(&self, symbols: &[Symbol]) -> Result<TickReceiver, FeedError> {
        if symbols.is_empty() {
            return Err(FeedError::NoSymbols);
        }
        self.connects.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(FeedError::Connect("scripted failure".to_string()));
        }

        let (tx, rx) = mpsc::channel(self.buffer);
        self.connections
            .send(tx)
            .map_err(|_| FeedError::Connect("controller dropped".to_string()))?;
        Ok(rx)
    }

    fn name(&self) -> &str {
        "channel"
    }
}

impl FeedController {
    /// Sender for the next successful connection
    pub async fn accept(&mut self) -> Option<mpsc::Sender<RawTick>> {
        self.connections.recv().await
    }

    /// Make the next `n` connection attempts fail
    pub fn fail_next(&self, n: usize) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Connection attempts so far, failed ones included
    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }
}
