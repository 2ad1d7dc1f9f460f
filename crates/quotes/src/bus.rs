//! Non-blocking fan-out of one quote stream to many subscribers
//!
//! The dispatch task never waits on a subscriber: each one has a bounded
//! private buffer and a full buffer loses the event for that subscriber only.
//! Subscriber set changes and dispatch happen under the same lock, so a
//! subscriber sees an ordered stream with possible gaps but no duplicates.
//!
//! The bus closes when its upstream ends or its last subscriber leaves. On
//! close every subscription stream ends and the teardown hook runs once.

use futures_util::{Stream, StreamExt};
use log::{debug, info};
use papertrade_core::Quote;
use papertrade_ports::{Shutdown, ShutdownHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};

type Teardown = Box<dyn FnOnce() + Send>;

struct Subscribers {
    senders: HashMap<u64, mpsc::Sender<Quote>>,
    next_id: u64,
    closed: bool,
    on_teardown: Option<Teardown>,
}

impl Subscribers {
    /// Mark closed and hand back the teardown hook if it has not run yet
    fn close(&mut self) -> Option<Teardown> {
        if self.closed {
            return None;
        }
        self.closed = true;
        // dropping the senders ends every subscription stream
        self.senders.clear();
        self.on_teardown.take()
    }
}

pub struct QuoteBus {
    subscribers: Mutex<Subscribers>,
    capacity: usize,
    stop: ShutdownHandle,
}

impl QuoteBus {
    /// Start dispatching `upstream` to subscribers with `capacity` buffered
    /// quotes each. `on_teardown` runs exactly once when the bus closes.
    pub fn new<S, F>(upstream: S, capacity: usize, on_teardown: F) -> Arc<Self>
    where
        S: Stream<Item = Quote> + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        let (stop, stopped) = Shutdown::new();
        let bus = Arc::new(Self {
            subscribers: Mutex::new(Subscribers {
                senders: HashMap::new(),
                next_id: 0,
                closed: false,
                on_teardown: Some(Box::new(on_teardown)),
            }),
            capacity: capacity.max(1),
            stop,
        });
        tokio::spawn(dispatch(Arc::downgrade(&bus), upstream, stopped));
        bus
    }

    /// Open a private ordered stream. None once the bus has closed.
    pub fn subscribe(self: &Arc<Self>) -> Option<Subscription> {
        let mut subscribers = self.subscribers.lock();
        if subscribers.closed {
            return None;
        }
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        let (tx, rx) = mpsc::channel(self.capacity);
        subscribers.senders.insert(id, tx);
        debug!("Subscriber {} joined ({} total)", id, subscribers.senders.len());

        Some(Subscription {
            id,
            rx,
            bus: Arc::downgrade(self),
        })
    }

    /// Remove a subscription and end its stream.
    ///
    /// Removing the last subscriber closes the bus.
    pub fn unsubscribe(&self, id: u64) {
        let teardown = {
            let mut subscribers = self.subscribers.lock();
            if subscribers.senders.remove(&id).is_none() {
                return;
            }
            debug!("Subscriber {} left ({} remain)", id, subscribers.senders.len());
            if subscribers.senders.is_empty() {
                info!("Last subscriber left, closing quote bus");
                subscribers.close()
            } else {
                None
            }
        };
        self.finish(teardown);
    }

    pub fn is_closed(&self) -> bool {
        self.subscribers.lock().closed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().senders.len()
    }

    pub(crate) fn publish(&self, quote: &Quote) {
        let subscribers = self.subscribers.lock();
        if subscribers.closed {
            return;
        }
        for (id, tx) in &subscribers.senders {
            match tx.try_send(quote.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!("Subscriber {} is behind, dropped {} quote", id, quote.symbol);
                }
                // the subscription is being dropped and will unsubscribe itself
                Err(TrySendError::Closed(_)) => {}
            }
        }
    }

    fn close(&self) {
        let teardown = self.subscribers.lock().close();
        self.finish(teardown);
    }

    fn finish(&self, teardown: Option<Teardown>) {
        if let Some(teardown) = teardown {
            self.stop.trigger();
            teardown();
        }
    }
}

async fn dispatch<S>(bus: Weak<QuoteBus>, upstream: S, stopped: Shutdown)
where
    S: Stream<Item = Quote>,
{
    let mut upstream = std::pin::pin!(upstream);
    loop {
        let next = tokio::select! {
            _ = stopped.cancelled() => return,
            next = upstream.next() => next,
        };
        let Some(live) = bus.upgrade() else {
            return;
        };
        match next {
            Some(quote) => live.publish(&quote),
            None => {
                info!("Quote upstream closed, closing quote bus");
                live.close();
                return;
            }
        }
    }
}

/// One subscriber's view of a [`QuoteBus`]. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Quote>,
    bus: Weak<QuoteBus>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next quote, or None once the bus has closed or dropped this subscriber
    pub async fn recv(&mut self) -> Option<Quote> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = Quote;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Quote>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}
