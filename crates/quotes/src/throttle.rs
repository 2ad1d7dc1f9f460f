//! Per-subscriber rate cap
//!
//! Token bucket with a burst of one: the first item passes immediately, then
//! at most one item per interval. Items arriving without a token are dropped,
//! never queued, so a throttled watcher always sees recent prices.

use futures_util::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;
use tokio::time::Instant;

pin_project! {
    /// Stream adapter returned by [`ThrottleExt::throttle`]
    #[must_use = "streams do nothing unless polled"]
    pub struct Throttled<S> {
        #[pin]
        inner: S,
        interval: Duration,
        next_token: Option<Instant>,
    }
}

impl<S> Throttled<S> {
    pub fn new(inner: S, interval: Duration) -> Self {
        Self {
            inner,
            interval,
            next_token: None,
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Stream> Stream for Throttled<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S::Item>> {
        let mut this = self.project();
        loop {
            let Some(item) = ready!(this.inner.as_mut().poll_next(cx)) else {
                return Poll::Ready(None);
            };
            let now = Instant::now();
            if this.next_token.is_none_or(|at| now >= at) {
                *this.next_token = Some(now + *this.interval);
                return Poll::Ready(Some(item));
            }
        }
    }
}

pub trait ThrottleExt: Stream + Sized {
    /// Deliver at most one item per `interval`, discarding the rest
    fn throttle(self, interval: Duration) -> Throttled<Self> {
        Throttled::new(self, interval)
    }
}

impl<S: Stream> ThrottleExt for S {}
