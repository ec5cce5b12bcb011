//! Ingest port (C3) — HTTP router exposing the five endpoints spec.md §4.3
//! documents. Grounded in `ws.rs`'s `Router`/`with_state` shape; the
//! teacher's WebSocket/broadcast plumbing has no counterpart here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::clrmetrics;
use crate::config::Config;
use crate::error::GatewayError;
use crate::otel::{self, TranslateOptions};
use crate::queue::{BackpressurePolicy, JobQueue};
use crate::remote_write;
use crate::skywalking;

pub struct AppContext {
    pub config: Config,
    pub queue: JobQueue,
    pub http_client: reqwest::Client,
    pub cancel: CancellationToken,
    /// Segments dropped under drop-on-full backpressure (spec.md §4.3/§7/§8).
    pub drop_count: AtomicU64,
}

type SharedCtx = Arc<AppContext>;

pub fn router(ctx: SharedCtx) -> Router {
    Router::new()
        .route("/v3/segments", post(segments_handler))
        .route("/v3/management/reportProperties", post(report_properties_handler))
        .route("/v3/management/keepAlive", post(keep_alive_handler))
        .route("/v3/clrMetricReports", post(clr_metrics_handler))
        .route("/health", get(health_handler))
        .with_state(ctx)
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Accept a batch of SkyWalking-style trace segments, translate each to
/// OTLP JSON, and enqueue it onto the bounded job queue (C4).
///
/// Per spec.md §4.3, a malformed body is rejected outright (400) before
/// anything is enqueued; once decoding succeeds, each segment is translated
/// and offered independently so a downed downstream doesn't fail decode.
async fn segments_handler(
    State(ctx): State<SharedCtx>,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, GatewayError> {
    let segments = skywalking::decode_segments(&body)?;
    let opts = TranslateOptions::from(&ctx.config);
    let policy = if ctx.config.queue_drop_on_full {
        BackpressurePolicy::DropOnFull
    } else {
        BackpressurePolicy::Block
    };

    let mut enqueued = 0usize;
    let mut dropped = 0usize;
    for segment in &segments {
        let payload = otel::translate_segment(segment, opts);
        if ctx.queue.offer(payload, policy, &ctx.cancel).await? {
            enqueued += 1;
        } else {
            dropped += 1;
        }
    }

    if dropped > 0 {
        ctx.drop_count.fetch_add(dropped as u64, Ordering::Relaxed);
        tracing::warn!(dropped, "queue full, dropped segments from this batch");
    }

    Ok((StatusCode::OK, Json(json!({"status": "queued", "enqueued": enqueued}))))
}

/// SkyWalking agents poll these two management endpoints; the gateway only
/// needs to acknowledge them (spec.md §4.3 Non-goals: no property storage,
/// no liveness tracking).
async fn report_properties_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "received"})))
}

async fn keep_alive_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "alive"})))
}

/// Decode a CLR metric report, flatten it, and forward it synchronously to
/// the Prometheus remote-write endpoint (spec.md §4.8: this path bypasses
/// C4/C5/C6 entirely — it is not trace data and carries its own backend).
async fn clr_metrics_handler(
    State(ctx): State<SharedCtx>,
    Json(payload): Json<clrmetrics::Payload>,
) -> Result<impl IntoResponse, GatewayError> {
    let timestamp_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64;

    let series = clrmetrics::flatten(&payload, timestamp_ms);
    remote_write::send(&ctx.http_client, &ctx.config.clr_remotewrite_url, series).await?;

    Ok((StatusCode::OK, Json(json!({"status": "ok"}))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ctx() -> SharedCtx {
        Arc::new(AppContext {
            config: Config {
                receiver_port: 0,
                collector_url: "http://127.0.0.1:0/v1/traces".to_string(),
                clr_remotewrite_url: "http://127.0.0.1:0/v1/metrics".to_string(),
                queue_size: 16,
                workers: Some(1),
                batch_size: 200,
                batch_flush_ms: 100,
                http_timeout_ms: 1000,
                shutdown_timeout_ms: 1000,
                queue_drop_on_full: false,
                prescan_parents: false,
                preserve_trace_id: false,
            },
            queue: crate::queue::bounded(16),
            http_client: reqwest::Client::new(),
            cancel: CancellationToken::new(),
            drop_count: AtomicU64::new(0),
        })
    }

    #[tokio::test]
    async fn segments_handler_enqueues_valid_batch() {
        let ctx = test_ctx();
        let body = br#"[{"traceId":"t","service":"svc","serviceInstance":"inst","traceSegmentId":"seg","spans":[
            {"spanId":0,"parentSpanId":-1,"operationName":"op","spanType":"0","isError":false,"startTime":1,"endTime":2}
        ]}]"#;
        let result = segments_handler(State(ctx.clone()), axum::body::Bytes::from_static(body)).await;
        assert!(result.is_ok());
        assert_eq!(ctx.queue.len().await, 1);
    }

    #[tokio::test]
    async fn segments_handler_rejects_malformed_body() {
        let ctx = test_ctx();
        let result = segments_handler(State(ctx), axum::body::Bytes::from_static(b"not json")).await;
        assert!(matches!(result, Err(GatewayError::Decode(_))));
    }

    #[tokio::test]
    async fn drop_on_full_increments_drop_counter() {
        let mut ctx = test_ctx();
        Arc::get_mut(&mut ctx).unwrap().config.queue_drop_on_full = true;
        Arc::get_mut(&mut ctx).unwrap().queue = crate::queue::bounded(1);

        let body = br#"[{"traceId":"t","service":"svc","serviceInstance":"inst","traceSegmentId":"seg","spans":[
            {"spanId":0,"parentSpanId":-1,"operationName":"a","spanType":"0","isError":false,"startTime":1,"endTime":2}
        ]},{"traceId":"t","service":"svc","serviceInstance":"inst","traceSegmentId":"seg2","spans":[
            {"spanId":0,"parentSpanId":-1,"operationName":"b","spanType":"0","isError":false,"startTime":1,"endTime":2}
        ]}]"#;
        segments_handler(State(ctx.clone()), axum::body::Bytes::from_static(body))
            .await
            .unwrap();
        assert_eq!(ctx.drop_count.load(Ordering::Relaxed), 1);
    }
}
