//! Bounded job queue (C4) — buffers translated payloads between the ingest
//! port (C3) and the batcher (C5).
//!
//! A plain `VecDeque` behind a `tokio::sync::Mutex`, woken by two `Notify`
//! handles, rather than a `tokio::sync::mpsc` channel: C7 needs to be able
//! to close the queue from outside the task that owns the consuming end,
//! and mpsc's `Receiver::close()` is only callable by whoever holds the
//! receiver. Keeping this as its own small type also gives `offer`/`take`
//! exactly the block-vs-drop and drain-then-EOF semantics spec.md §4.4
//! describes, instead of approximating them on top of channel semantics.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::otel::OTelPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressurePolicy {
    Block,
    DropOnFull,
}

struct Inner {
    buf: Mutex<VecDeque<OTelPayload>>,
    capacity: usize,
    closed: AtomicBool,
    not_full: Notify,
    not_empty: Notify,
}

#[derive(Clone)]
pub struct JobQueue(Arc<Inner>);

pub fn bounded(capacity: usize) -> JobQueue {
    JobQueue(Arc::new(Inner {
        buf: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        capacity,
        closed: AtomicBool::new(false),
        not_full: Notify::new(),
        not_empty: Notify::new(),
    }))
}

impl JobQueue {
    /// Enqueue `item` under the given backpressure policy.
    ///
    /// `Block` waits for space (observing `cancel`); `DropOnFull` returns
    /// `Ok(false)` immediately instead of waiting. Offering to a closed
    /// queue is always an error, per spec.md §4.4.
    pub async fn offer(
        &self,
        item: OTelPayload,
        policy: BackpressurePolicy,
        cancel: &CancellationToken,
    ) -> Result<bool, GatewayError> {
        let mut item = Some(item);
        loop {
            let not_full = self.0.not_full.notified();
            {
                let mut buf = self.0.buf.lock().await;
                if self.0.closed.load(Ordering::Acquire) {
                    return Err(GatewayError::QueueClosed);
                }
                if buf.len() < self.0.capacity {
                    buf.push_back(item.take().expect("item consumed once"));
                    self.0.not_empty.notify_one();
                    return Ok(true);
                }
                if policy == BackpressurePolicy::DropOnFull {
                    return Ok(false);
                }
            }
            tokio::select! {
                _ = not_full => {}
                _ = cancel.cancelled() => return Err(GatewayError::QueueClosed),
            }
        }
    }

    /// Take the next item, blocking until one is available or the queue is
    /// closed and drained, in which case `None` is returned (end-of-stream).
    pub async fn take(&self) -> Option<OTelPayload> {
        loop {
            let not_empty = self.0.not_empty.notified();
            {
                let mut buf = self.0.buf.lock().await;
                if let Some(item) = buf.pop_front() {
                    self.0.not_full.notify_one();
                    return Some(item);
                }
                if self.0.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            not_empty.await;
        }
    }

    /// Signal end-of-stream: further `offer`s fail, `take` drains whatever
    /// remains in the buffer and then starts returning `None`.
    pub fn close(&self) {
        self.0.closed.store(true, Ordering::Release);
        self.0.not_full.notify_waiters();
        self.0.not_empty.notify_waiters();
    }

    pub async fn len(&self) -> usize {
        self.0.buf.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::otel::{Resource, ResourceSpan, ScopeSpans};

    fn payload() -> OTelPayload {
        OTelPayload {
            resource_spans: vec![ResourceSpan {
                resource: Resource { attributes: vec![] },
                scope_spans: vec![ScopeSpans { spans: vec![] }],
            }],
        }
    }

    #[tokio::test]
    async fn offer_then_take_round_trips() {
        let q = bounded(4);
        let cancel = CancellationToken::new();
        assert!(q.offer(payload(), BackpressurePolicy::Block, &cancel).await.unwrap());
        assert!(q.take().await.is_some());
    }

    #[tokio::test]
    async fn drop_on_full_reports_failure_without_blocking() {
        let q = bounded(1);
        let cancel = CancellationToken::new();
        assert!(q.offer(payload(), BackpressurePolicy::DropOnFull, &cancel).await.unwrap());
        let accepted = q
            .offer(payload(), BackpressurePolicy::DropOnFull, &cancel)
            .await
            .unwrap();
        assert!(!accepted);
    }

    #[tokio::test]
    async fn close_drains_then_reports_end_of_stream() {
        let q = bounded(4);
        let cancel = CancellationToken::new();
        q.offer(payload(), BackpressurePolicy::Block, &cancel).await.unwrap();
        q.close();
        assert!(q.take().await.is_some(), "buffered item must still drain");
        assert!(q.take().await.is_none(), "drained queue reports EOF");
    }

    #[tokio::test]
    async fn offer_to_closed_queue_is_an_error() {
        let q = bounded(4);
        let cancel = CancellationToken::new();
        q.close();
        let res = q.offer(payload(), BackpressurePolicy::Block, &cancel).await;
        assert!(matches!(res, Err(GatewayError::QueueClosed)));
    }

    #[tokio::test]
    async fn cancellation_releases_a_blocked_offer() {
        let q = bounded(1);
        let cancel = CancellationToken::new();
        q.offer(payload(), BackpressurePolicy::Block, &cancel).await.unwrap();
        let cancel2 = cancel.clone();
        let blocked = tokio::spawn(async move { q.offer(payload(), BackpressurePolicy::Block, &cancel2).await });
        tokio::task::yield_now().await;
        cancel.cancel();
        let res = blocked.await.unwrap();
        assert!(matches!(res, Err(GatewayError::QueueClosed)));
    }
}
