//! Batcher (C5) — single consumer of the bounded job queue (C4), single
//! producer into the sender pool's internal channel (C6).
//!
//! Flush triggers, whichever fires first: buffer length >= `batch_size`,
//! a timer tick with a non-empty buffer, the shutdown signal, or upstream
//! end-of-stream (spec.md §4.5).

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::otel::OTelPayload;
use crate::queue::JobQueue;

pub async fn run(
    queue: JobQueue,
    downstream: mpsc::Sender<OTelPayload>,
    batch_size: usize,
    flush_period: Duration,
    cancel: CancellationToken,
) {
    let mut buf: Vec<OTelPayload> = Vec::with_capacity(batch_size);
    let mut ticker = tokio::time::interval(flush_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // the first tick fires immediately; discard it

    loop {
        tokio::select! {
            item = queue.take() => {
                match item {
                    Some(payload) => {
                        buf.push(payload);
                        if buf.len() >= batch_size {
                            flush(&mut buf, &downstream, &cancel).await;
                        }
                    }
                    None => {
                        tracing::debug!("upstream end-of-stream, flushing final batch");
                        flush(&mut buf, &downstream, &cancel).await;
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                if !buf.is_empty() {
                    flush(&mut buf, &downstream, &cancel).await;
                }
            }
            _ = cancel.cancelled() => {
                tracing::debug!("shutdown signal received, flushing final batch");
                flush(&mut buf, &downstream, &cancel).await;
                break;
            }
        }
    }
    // Dropping `downstream` here closes the sender pool's channel, letting
    // the senders drain what's already queued and exit (spec.md §4.7).
}

/// Merge the resource-spans lists of every buffered payload, in enqueue
/// order, into one combined payload (spec.md §4.5/§8).
pub fn merge_payloads(payloads: Vec<OTelPayload>) -> OTelPayload {
    let mut resource_spans = Vec::new();
    for payload in payloads {
        resource_spans.extend(payload.resource_spans);
    }
    OTelPayload { resource_spans }
}

async fn flush(buf: &mut Vec<OTelPayload>, downstream: &mpsc::Sender<OTelPayload>, cancel: &CancellationToken) {
    if buf.is_empty() {
        return;
    }
    let merged = merge_payloads(std::mem::take(buf));
    tokio::select! {
        biased;
        res = downstream.send(merged) => {
            if res.is_err() {
                tracing::warn!("sender pool channel closed, dropping flushed batch");
            }
        }
        _ = cancel.cancelled() => {
            tracing::warn!("shutdown fired while flush was blocked on a full sender channel, dropping batch");
        }
    }
}
