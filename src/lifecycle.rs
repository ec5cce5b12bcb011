//! Lifecycle controller (C7) — wires C3 through C6 together, owns the
//! process's only `CancellationToken`, and drives the shutdown sequence
//! spec.md §4.7 documents: stop accepting new HTTP work (bounded by
//! `shutdownTimeout`), close the queue, let the batcher drain and flush, let
//! the senders drain, each stage bounded by the same `shutdownTimeout`.
//!
//! Signal handling follows the teacher's `tokio::select!`-driven background
//! tasks (`main.rs`'s stale-trace cleanup loop); the app-context grouping
//! follows spec.md §9's design note to avoid ad hoc singletons.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::batcher;
use crate::config::Config;
use crate::ingest::{self, AppContext};
use crate::queue;
use crate::sender;

/// Sender-pool input channel capacity. A handful of in-flight batches is
/// enough slack to smooth over a slow backend without growing unbounded —
/// backpressure belongs to the job queue (C4), not this internal hop.
const SENDER_CHANNEL_CAPACITY: usize = 64;

pub async fn run(config: Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    let http_client = sender::build_client(config.http_timeout())?;
    let job_queue = queue::bounded(config.queue_size);

    let (batch_tx, batch_rx) = mpsc::channel(SENDER_CHANNEL_CAPACITY);
    let shared_rx: sender::SharedReceiver = Arc::new(Mutex::new(batch_rx));

    let batcher_handle = tokio::spawn(batcher::run(
        job_queue.clone(),
        batch_tx,
        config.batch_size,
        config.batch_flush(),
        cancel.clone(),
    ));

    let worker_count = config.worker_count();
    let mut sender_handles = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        sender_handles.push(tokio::spawn(sender::run_worker(
            worker_id,
            shared_rx.clone(),
            http_client.clone(),
            config.collector_url.clone(),
        )));
    }

    let receiver_addr = config.receiver_addr();
    let shutdown_timeout = config.shutdown_timeout();

    let ctx = Arc::new(AppContext {
        config,
        queue: job_queue.clone(),
        http_client,
        cancel: cancel.clone(),
        drop_count: std::sync::atomic::AtomicU64::new(0),
    });
    let app = ingest::router(ctx);

    let listener = tokio::net::TcpListener::bind(&receiver_addr)
        .await
        .map_err(crate::error::GatewayError::Bind)?;
    tracing::info!(addr = %receiver_addr, "ingest port listening");

    let shutdown_cancel = cancel.clone();
    let serve = axum::serve(listener, app).with_graceful_shutdown(wait_for_shutdown_signal(shutdown_cancel));
    match tokio::time::timeout(shutdown_timeout, serve).await {
        Ok(result) => result?,
        Err(_) => {
            tracing::warn!("http server did not finish graceful shutdown within shutdownTimeout, forcing drain");
        }
    }

    tracing::info!("http server stopped accepting connections, draining pipeline");
    job_queue.close();
    cancel.cancel();

    drain(batcher_handle, sender_handles, shutdown_timeout).await;

    tracing::info!("shutdown complete");
    Ok(())
}

/// Wait for the batcher and every sender worker to exit on their own, up to
/// `timeout`; anything still running past that is abandoned in place so the
/// process can exit (spec.md §4.7: shutdown must not hang indefinitely).
async fn drain(
    batcher_handle: tokio::task::JoinHandle<()>,
    sender_handles: Vec<tokio::task::JoinHandle<()>>,
    timeout: Duration,
) {
    let deadline = tokio::time::Instant::now() + timeout;

    if tokio::time::timeout_at(deadline, batcher_handle).await.is_err() {
        tracing::warn!("batcher did not finish draining within shutdownTimeout");
    }

    for (worker_id, handle) in sender_handles.into_iter().enumerate() {
        if tokio::time::timeout_at(deadline, handle).await.is_err() {
            tracing::warn!(worker_id, "sender worker did not exit within shutdownTimeout");
        }
    }
}

/// Resolve once either Ctrl-C or, on unix, SIGTERM arrives, and fire the
/// shared cancellation token so the batcher and queue react immediately
/// instead of waiting on axum's own shutdown future.
async fn wait_for_shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
    cancel.cancel();
}
