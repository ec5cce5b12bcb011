//! Source-schema (SkyWalking-style) trace segment model and decoder (C1).
//!
//! Mirrors `original_source/skywalking/skywalking.go`, with the wire
//! leniency spec.md §4.1 requires layered on top: `isError` accepts a bool
//! or a 0/1 int, and a reference's `headers` accepts a JSON-encoded string
//! or an already-decoded object.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TraceSegment {
    #[serde(rename = "traceId")]
    pub trace_id: String,
    pub service: String,
    #[serde(rename = "serviceInstance")]
    pub service_instance: String,
    #[serde(rename = "traceSegmentId")]
    pub trace_segment_id: String,
    #[serde(rename = "isSizeLimited", default)]
    pub is_size_limited: bool,
    pub spans: Vec<Span>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Span {
    #[serde(rename = "spanId")]
    pub span_id: i64,
    #[serde(rename = "parentSpanId")]
    pub parent_span_id: i64,
    #[serde(rename = "operationName")]
    pub operation_name: String,
    #[serde(rename = "spanType")]
    pub span_type: String,
    #[serde(rename = "isError", deserialize_with = "deserialize_is_error", default)]
    pub is_error: bool,
    #[serde(rename = "startTime")]
    pub start_time: i64,
    #[serde(rename = "endTime")]
    pub end_time: i64,
    #[serde(default)]
    pub peer: String,
    #[serde(rename = "componentId", default)]
    pub component_id: i64,
    #[serde(rename = "spanLayer", default)]
    pub span_layer: String,
    #[serde(rename = "skipAnalysis", default)]
    pub skip_analysis: bool,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub logs: Vec<Log>,
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(rename = "methodName", default)]
    pub method_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Log {
    pub time: i64,
    pub data: Vec<Tag>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Reference {
    #[serde(rename = "traceId")]
    pub trace_id: String,
    pub headers: Headers,
}

/// A reference's `headers` field, which legacy agents encode either as a
/// JSON-encoded string or as an already-decoded object (spec.md §3/§4.1).
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Headers {
    Encoded(String),
    Decoded(serde_json::Value),
}

impl<'de> Deserialize<'de> for Headers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // `untagged` alone would try String first and could misparse an
        // object as a string if serde_json ever coerced it; being explicit
        // here keeps the precedence documented: object-shaped wins, string
        // is the legacy-agent fallback.
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(s) => Ok(Headers::Encoded(s)),
            other => Ok(Headers::Decoded(other)),
        }
    }
}

impl Headers {
    /// Decode to a `serde_json::Value` regardless of wire shape.
    pub fn decoded(&self) -> Option<serde_json::Value> {
        match self {
            Headers::Decoded(v) => Some(v.clone()),
            Headers::Encoded(s) => serde_json::from_str(s).ok(),
        }
    }
}

fn deserialize_is_error<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Bool(b) => Ok(b),
        serde_json::Value::Number(n) => Ok(n.as_i64().map(|i| i != 0).unwrap_or(false)),
        other => Err(de::Error::custom(format!(
            "isError must be a bool or 0/1 int, got {other}"
        ))),
    }
}

/// Decode a batch of source segments from a raw HTTP body.
///
/// A malformed outer JSON document, or an undecodable span anywhere in the
/// batch, fails the whole request (spec.md §4.1) — serde's all-or-nothing
/// parse of `Vec<TraceSegment>` already gives us that for free.
pub fn decode_segments(body: &[u8]) -> Result<Vec<TraceSegment>, GatewayError> {
    serde_json::from_slice(body).map_err(GatewayError::Decode)
}
