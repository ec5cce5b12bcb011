//! Sender pool (C6) — `workerCount` concurrent workers POSTing merged
//! batches to the OTLP JSON backend, each with a single immediate retry.
//!
//! Workers share only the input channel and the HTTP client (spec.md §4.6).
//! The input channel is a plain `tokio::sync::mpsc::Receiver` guarded by an
//! async `Mutex` so several worker tasks can pull from the same queue —
//! `mpsc` itself is single-consumer, and this is the smallest way to get
//! fan-out without inventing per-worker channels.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::error::GatewayError;
use crate::otel::OTelPayload;

pub type SharedReceiver = Arc<Mutex<mpsc::Receiver<OTelPayload>>>;

pub async fn run_worker(worker_id: usize, rx: SharedReceiver, client: reqwest::Client, collector_url: String) {
    loop {
        let payload = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };
        let Some(payload) = payload else {
            tracing::debug!(worker_id, "sender channel closed, worker exiting");
            break;
        };

        send_with_retry(worker_id, &client, &collector_url, &payload).await;
    }
}

async fn send_with_retry(worker_id: usize, client: &reqwest::Client, url: &str, payload: &OTelPayload) {
    match send_once(client, url, payload).await {
        Ok(()) => return,
        Err(e) => tracing::warn!(worker_id, error = %e, "send failed, retrying once"),
    }

    if let Err(e) = send_once(client, url, payload).await {
        tracing::error!(worker_id, error = %e, "retry failed, dropping batch");
    }
}

async fn send_once(client: &reqwest::Client, url: &str, payload: &OTelPayload) -> Result<(), GatewayError> {
    let resp = client
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .json(payload)
        .send()
        .await?;

    if resp.status().as_u16() >= 300 {
        return Err(GatewayError::BackendRejected(resp.status().to_string()));
    }
    Ok(())
}

/// Build the process-wide HTTP client shared by every sender worker
/// (spec.md §4.6: keep-alive, HTTP/2 attempted, a large idle pool, bounded
/// idle timeout, per-request timeout).
pub fn build_client(request_timeout: std::time::Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(request_timeout)
        .pool_max_idle_per_host(1000)
        .pool_idle_timeout(std::time::Duration::from_secs(90))
        .build()
}
