//! Cooperative cancellation signal
//!
//! A [`ShutdownHandle`] fires once; every [`Shutdown`] cloned from it observes
//! the signal. Dropping every handle counts as firing it, so a task can never
//! outlive the owner that was supposed to stop it.

use std::sync::Arc;
use tokio::sync::watch;

/// Owner side of a shutdown signal
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Observer side of a shutdown signal
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
    // keeps `never()` signals from firing on drop
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl Shutdown {
    /// Create a new signal pair
    pub fn new() -> (ShutdownHandle, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (
            ShutdownHandle { tx: Arc::new(tx) },
            Shutdown {
                rx,
                _keepalive: None,
            },
        )
    }

    /// A signal that never fires
    pub fn never() -> Shutdown {
        let (tx, rx) = watch::channel(false);
        Shutdown {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once the signal fires
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // Err means every handle is gone
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl ShutdownHandle {
    /// Fire the signal. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Another observer of this signal
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
            _keepalive: None,
        }
    }
}
