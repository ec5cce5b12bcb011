//! Prometheus remote-write v0.1.0 wire encoding: protobuf via `prost`
//! (generated at build time from `proto/remote_write.proto`), snappy-framed
//! per spec.md §6. This satisfies the CLR metrics flattener's (C8) egress;
//! nothing else in the gateway depends on it.

pub mod proto {
    #![allow(clippy::all)]
    include!(concat!(env!("OUT_DIR"), "/prometheus.rs"));
}

use prost::Message;

use crate::error::GatewayError;
pub use proto::{Label, Sample, TimeSeries, WriteRequest};

pub fn time_series(name: &str, service: &str, service_instance: &str, timestamp_ms: i64, value: f64) -> TimeSeries {
    TimeSeries {
        labels: vec![
            Label {
                name: "__name__".to_string(),
                value: name.to_string(),
            },
            Label {
                name: "service".to_string(),
                value: service.to_string(),
            },
            Label {
                name: "service_instance".to_string(),
                value: service_instance.to_string(),
            },
        ],
        samples: vec![Sample {
            value,
            timestamp: timestamp_ms,
        }],
    }
}

/// POST a batch of time series to a Prometheus remote-write endpoint.
///
/// Per spec.md §9 (REDESIGN FLAG / open question 3), a non-2xx response is
/// surfaced as a real error — `original_source/clrmetrics/remote.go`
/// returns `resp.StatusCode/100 != 2 { return err }` where `err` is still
/// `nil` at that point, silently swallowing the failure.
pub async fn send(client: &reqwest::Client, url: &str, series: Vec<TimeSeries>) -> Result<(), GatewayError> {
    let req = WriteRequest { timeseries: series };
    let mut buf = Vec::with_capacity(req.encoded_len());
    req.encode(&mut buf).expect("encoding into a growable Vec cannot fail");

    let compressed = snap::raw::Encoder::new()
        .compress_vec(&buf)
        .expect("snappy block compression of a bounded buffer cannot fail");

    let resp = client
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, "application/x-protobuf")
        .header(reqwest::header::CONTENT_ENCODING, "snappy")
        .header("X-Prometheus-Remote-Write-Version", "0.1.0")
        .body(compressed)
        .send()
        .await?;

    if resp.status().as_u16() / 100 != 2 {
        return Err(GatewayError::BackendRejected(resp.status().to_string()));
    }
    Ok(())
}
