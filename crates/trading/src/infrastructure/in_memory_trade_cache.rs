use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::debug;
use papertrade_core::TradeRecord;
use papertrade_ports::{HistoryLookup, StoreError, TradeHistoryCache};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// How long a cached trade list is served before it is read again
pub const DEFAULT_TRADE_HISTORY_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Expired lists are swept once every this many saves
const PURGE_EVERY: u64 = 256;

#[derive(Default)]
struct Slot {
    /// Bumped by every invalidation
    generation: u64,
    cached: Option<Cached>,
}

struct Cached {
    trades: Vec<TradeRecord>,
    saved_at: Instant,
}

/// In-memory trade history cache, shared between clones.
///
/// Lists expire after the TTL. A user's slot outlives its list once the user
/// has been invalidated, so a fill started before an invalidation can still
/// be recognised as stale.
#[derive(Clone)]
pub struct InMemoryTradeHistoryCache {
    slots: Arc<DashMap<String, Slot>>,
    saves: Arc<AtomicU64>,
    ttl: Duration,
}

impl InMemoryTradeHistoryCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TRADE_HISTORY_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            saves: Arc::new(AtomicU64::new(0)),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of users with a cached list, expired or not
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.cached.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired lists, and the slots that no longer carry anything.
    /// Returns the number of lists dropped.
    pub fn purge_expired(&self) -> usize {
        let mut dropped = 0;
        self.slots.retain(|_, slot| {
            if slot
                .cached
                .as_ref()
                .is_some_and(|cached| cached.saved_at.elapsed() >= self.ttl)
            {
                slot.cached = None;
                dropped += 1;
            }
            // generation 0 means never invalidated, so forgetting it is safe
            slot.cached.is_some() || slot.generation != 0
        });
        if dropped > 0 {
            debug!("Dropped {} expired trade histories", dropped);
        }
        dropped
    }
}

impl Default for InMemoryTradeHistoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TradeHistoryCache for InMemoryTradeHistoryCache {
    async fn get(&self, user_id: &str) -> Result<HistoryLookup, StoreError> {
        let Some(mut slot) = self.slots.get_mut(user_id) else {
            return Ok(HistoryLookup::Miss { generation: 0 });
        };
        if let Some(cached) = slot.cached.take() {
            if cached.saved_at.elapsed() < self.ttl {
                let trades = cached.trades.clone();
                slot.cached = Some(cached);
                return Ok(HistoryLookup::Hit(trades));
            }
        }
        Ok(HistoryLookup::Miss {
            generation: slot.generation,
        })
    }

    async fn save(
        &self,
        user_id: &str,
        generation: u64,
        trades: &[TradeRecord],
    ) -> Result<bool, StoreError> {
        let cached = Cached {
            trades: trades.to_vec(),
            saved_at: Instant::now(),
        };
        let stored = match self.slots.entry(user_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                if slot.generation == generation {
                    slot.cached = Some(cached);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) if generation == 0 => {
                vacant.insert(Slot {
                    generation,
                    cached: Some(cached),
                });
                true
            }
            Entry::Vacant(_) => false,
        };

        if self.saves.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
            self.purge_expired();
        }
        Ok(stored)
    }

    async fn invalidate(&self, user_id: &str) -> Result<(), StoreError> {
        let mut slot = self.slots.entry(user_id.to_string()).or_default();
        slot.generation += 1;
        slot.cached = None;
        Ok(())
    }
}
