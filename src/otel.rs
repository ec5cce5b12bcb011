//! Target-schema (OTLP-style) payload model and the segment translator (C2).
//!
//! Grounded in `original_source/otel/otel.go` and
//! `original_source/converter/converter.go`, extended with the attribute
//! ordering and `db.type` → `db.system` rewrite spec.md §3 requires.

use std::collections::HashMap;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::skywalking::{Span as SwSpan, TraceSegment};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OTelPayload {
    #[serde(rename = "resourceSpans")]
    pub resource_spans: Vec<ResourceSpan>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceSpan {
    pub resource: Resource,
    #[serde(rename = "scopeSpans")]
    pub scope_spans: Vec<ScopeSpans>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScopeSpans {
    pub spans: Vec<OTelSpan>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OTelSpan {
    #[serde(rename = "traceId")]
    pub trace_id: String,
    #[serde(rename = "spanId")]
    pub span_id: String,
    #[serde(rename = "parentSpanId")]
    pub parent_span_id: String,
    pub name: String,
    pub kind: String,
    #[serde(rename = "startTimeUnixNano")]
    pub start_time_unix_nano: String,
    #[serde(rename = "endTimeUnixNano")]
    pub end_time_unix_nano: String,
    pub attributes: Vec<Attribute>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attribute {
    pub key: String,
    pub value: AttributeVal,
}

/// A tagged value carrying exactly one of {string, int64, bool}. Wire form
/// omits whichever fields are empty/zero, matching
/// `original_source/otel/otel.go`'s `json:"...,omitempty"` tags.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeVal {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl Serialize for AttributeVal {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            AttributeVal::Str(s) => map.serialize_entry("stringValue", s)?,
            AttributeVal::Int(i) => map.serialize_entry("intValue", i)?,
            AttributeVal::Bool(b) => map.serialize_entry("boolValue", b)?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AttributeVal {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(rename = "stringValue", default)]
            string_value: Option<String>,
            #[serde(rename = "intValue", default)]
            int_value: Option<i64>,
            #[serde(rename = "boolValue", default)]
            bool_value: Option<bool>,
        }
        let raw = Raw::deserialize(deserializer)?;
        if let Some(s) = raw.string_value {
            Ok(AttributeVal::Str(s))
        } else if let Some(i) = raw.int_value {
            Ok(AttributeVal::Int(i))
        } else {
            Ok(AttributeVal::Bool(raw.bool_value.unwrap_or(false)))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub name: String,
    #[serde(rename = "timeUnixNano")]
    pub time_unix_nano: String,
    pub attributes: Vec<Attribute>,
}

pub fn map_span_type_to_kind(span_type: &str) -> &'static str {
    match span_type {
        "0" => "SPAN_KIND_SERVER",
        "1" => "SPAN_KIND_CLIENT",
        "2" => "SPAN_KIND_INTERNAL",
        _ => "SPAN_KIND_INTERNAL",
    }
}

/// Translator behavior toggles resolving spec.md §9's open questions.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranslateOptions {
    pub prescan_parents: bool,
    pub preserve_trace_id: bool,
}

impl From<&Config> for TranslateOptions {
    fn from(cfg: &Config) -> Self {
        TranslateOptions {
            prescan_parents: cfg.prescan_parents,
            preserve_trace_id: cfg.preserve_trace_id,
        }
    }
}

fn random_hex(len_bytes: usize) -> String {
    let mut buf = vec![0u8; len_bytes];
    if let Err(e) = rand::rngs::OsRng.try_fill_bytes(&mut buf) {
        tracing::error!(error = %e, "rng failure generating id, falling back to zero-filled id");
        buf.iter_mut().for_each(|b| *b = 0);
    }
    hex::encode(buf)
}

fn is_valid_lowercase_hex32(s: &str) -> bool {
    s.len() == 32 && s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Parse the sum-type `service` field: a plain string, or a single-quoted
/// JSON object `{name,teamID,type}`. Falls back to the raw string on any
/// parse failure, matching `original_source/converter/converter.go`.
fn resolve_service_name(raw: &str) -> String {
    #[derive(Deserialize)]
    struct ServiceParsed {
        name: String,
    }
    let corrected = raw.replace('\'', "\"");
    match serde_json::from_str::<ServiceParsed>(&corrected) {
        Ok(parsed) => parsed.name,
        Err(e) => {
            tracing::debug!(error = %e, "service field not object-shaped, using raw string");
            raw.to_string()
        }
    }
}

fn build_span_attributes(sw_span: &SwSpan) -> Vec<Attribute> {
    let mut attrs = Vec::new();

    for tag in &sw_span.tags {
        let key = if tag.key == "db.type" {
            "db.system".to_string()
        } else {
            tag.key.clone()
        };
        attrs.push(Attribute {
            key,
            value: AttributeVal::Str(tag.value.clone()),
        });
    }

    if !sw_span.peer.is_empty() {
        attrs.push(Attribute {
            key: "peer".to_string(),
            value: AttributeVal::Str(sw_span.peer.clone()),
        });
    }

    if sw_span.component_id != 0 {
        attrs.push(Attribute {
            key: "component.id".to_string(),
            value: AttributeVal::Int(sw_span.component_id),
        });
    }

    if !sw_span.span_layer.is_empty() {
        attrs.push(Attribute {
            key: "layer".to_string(),
            value: AttributeVal::Str(sw_span.span_layer.clone()),
        });
    }

    attrs.push(Attribute {
        key: "span.type".to_string(),
        value: AttributeVal::Str(sw_span.span_type.clone()),
    });

    attrs.push(Attribute {
        key: "span.isError".to_string(),
        value: AttributeVal::Bool(sw_span.is_error),
    });

    attrs
}

fn build_events(sw_span: &SwSpan) -> Vec<Event> {
    sw_span
        .logs
        .iter()
        .map(|log| Event {
            name: "log".to_string(),
            time_unix_nano: format!("{}", log.time * 1_000_000),
            attributes: log
                .data
                .iter()
                .map(|tag| Attribute {
                    key: tag.key.clone(),
                    value: AttributeVal::Str(tag.value.clone()),
                })
                .collect(),
        })
        .collect()
}

/// Translate one source segment into one target `OTelPayload` (spec.md §4.2).
///
/// Pure modulo the id-generation RNG: called with the same spans and a
/// fixed RNG seed it produces byte-identical output (spec.md §8).
pub fn translate_segment(segment: &TraceSegment, opts: TranslateOptions) -> OTelPayload {
    let trace_id = if opts.preserve_trace_id && is_valid_lowercase_hex32(&segment.trace_id) {
        segment.trace_id.clone()
    } else {
        random_hex(16)
    };

    let mut span_id_map: HashMap<i64, String> = HashMap::new();

    if opts.prescan_parents {
        for sw_span in &segment.spans {
            span_id_map.insert(sw_span.span_id, random_hex(8));
        }
    }

    let mut otel_spans = Vec::with_capacity(segment.spans.len());
    for sw_span in &segment.spans {
        let span_id = if opts.prescan_parents {
            span_id_map
                .get(&sw_span.span_id)
                .cloned()
                .unwrap_or_else(|| random_hex(8))
        } else {
            let id = random_hex(8);
            span_id_map.insert(sw_span.span_id, id.clone());
            id
        };

        let parent_span_id = if sw_span.parent_span_id < 0 {
            String::new()
        } else {
            span_id_map
                .get(&sw_span.parent_span_id)
                .cloned()
                .unwrap_or_default()
        };

        otel_spans.push(OTelSpan {
            trace_id: trace_id.clone(),
            span_id,
            parent_span_id,
            name: sw_span.operation_name.clone(),
            kind: map_span_type_to_kind(&sw_span.span_type).to_string(),
            start_time_unix_nano: format!("{}", sw_span.start_time * 1_000_000),
            end_time_unix_nano: format!("{}", sw_span.end_time * 1_000_000),
            attributes: build_span_attributes(sw_span),
            events: build_events(sw_span),
        });
    }

    let resource_span = ResourceSpan {
        resource: Resource {
            attributes: vec![
                Attribute {
                    key: "service.name".to_string(),
                    value: AttributeVal::Str(resolve_service_name(&segment.service)),
                },
                Attribute {
                    key: "service.instance.id".to_string(),
                    value: AttributeVal::Str(segment.service_instance.clone()),
                },
            ],
        },
        scope_spans: vec![ScopeSpans { spans: otel_spans }],
    };

    OTelPayload {
        resource_spans: vec![resource_span],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skywalking::Tag;

    fn span(id: i64, parent: i64) -> SwSpan {
        SwSpan {
            span_id: id,
            parent_span_id: parent,
            operation_name: format!("op{id}"),
            span_type: "0".to_string(),
            is_error: false,
            start_time: 1000,
            end_time: 2000,
            peer: String::new(),
            component_id: 0,
            span_layer: String::new(),
            skip_analysis: false,
            tags: Vec::new(),
            logs: Vec::new(),
            references: Vec::new(),
            method_name: None,
        }
    }

    fn segment(spans: Vec<SwSpan>) -> TraceSegment {
        TraceSegment {
            trace_id: "sourcetraceid".to_string(),
            service: "svc".to_string(),
            service_instance: "inst".to_string(),
            trace_segment_id: "seg".to_string(),
            is_size_limited: false,
            spans,
        }
    }

    #[test]
    fn single_span_no_parent_is_error_int() {
        let mut s = span(0, -1);
        s.is_error = true;
        let seg = segment(vec![s]);
        let payload = translate_segment(&seg, TranslateOptions::default());
        let spans = &payload.resource_spans[0].scope_spans[0].spans;
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].kind, "SPAN_KIND_SERVER");
        assert_eq!(spans[0].parent_span_id, "");
        let last = spans[0].attributes.last().unwrap();
        assert_eq!(last.key, "span.isError");
        assert_eq!(last.value, AttributeVal::Bool(true));
    }

    #[test]
    fn parent_chain_is_preserved() {
        let seg = segment(vec![span(0, -1), span(1, 0), span(2, 1)]);
        let payload = translate_segment(&seg, TranslateOptions::default());
        let spans = &payload.resource_spans[0].scope_spans[0].spans;
        assert_eq!(spans[1].parent_span_id, spans[0].span_id);
        assert_eq!(spans[2].parent_span_id, spans[1].span_id);
    }

    #[test]
    fn out_of_order_parent_is_empty_by_default() {
        // child (id 1) lists a parent (id 0) that appears *later* in the list.
        let seg = segment(vec![span(1, 0), span(0, -1)]);
        let payload = translate_segment(&seg, TranslateOptions::default());
        let spans = &payload.resource_spans[0].scope_spans[0].spans;
        assert_eq!(spans[0].parent_span_id, "");
    }

    #[test]
    fn out_of_order_parent_resolves_with_prescan() {
        let seg = segment(vec![span(1, 0), span(0, -1)]);
        let opts = TranslateOptions {
            prescan_parents: true,
            preserve_trace_id: false,
        };
        let payload = translate_segment(&seg, opts);
        let spans = &payload.resource_spans[0].scope_spans[0].spans;
        assert_eq!(spans[0].parent_span_id, spans[1].span_id);
    }

    #[test]
    fn db_type_tag_is_rewritten_to_db_system() {
        let mut s = span(0, -1);
        s.tags.push(Tag {
            key: "db.type".to_string(),
            value: "mysql".to_string(),
        });
        let seg = segment(vec![s]);
        let payload = translate_segment(&seg, TranslateOptions::default());
        let attrs = &payload.resource_spans[0].scope_spans[0].spans[0].attributes;
        assert!(attrs
            .iter()
            .any(|a| a.key == "db.system" && a.value == AttributeVal::Str("mysql".to_string())));
        assert!(!attrs.iter().any(|a| a.key == "db.type"));
    }

    #[test]
    fn service_single_quoted_object_extracts_name() {
        let seg = segment(vec![span(0, -1)]);
        let mut seg = seg;
        seg.service = "{'name':'svcA','teamID':'t1','type':'http'}".to_string();
        let payload = translate_segment(&seg, TranslateOptions::default());
        let resource_attrs = &payload.resource_spans[0].resource.attributes;
        assert_eq!(
            resource_attrs[0].value,
            AttributeVal::Str("svcA".to_string())
        );
    }

    #[test]
    fn service_plain_string_falls_back_to_raw() {
        let mut seg = segment(vec![span(0, -1)]);
        seg.service = "plainString".to_string();
        let payload = translate_segment(&seg, TranslateOptions::default());
        let resource_attrs = &payload.resource_spans[0].resource.attributes;
        assert_eq!(
            resource_attrs[0].value,
            AttributeVal::Str("plainString".to_string())
        );
    }

    #[test]
    fn time_conversion_is_exact() {
        let mut s = span(0, -1);
        s.start_time = 1_700_000_000_123;
        s.end_time = 1_700_000_000_456;
        let seg = segment(vec![s]);
        let payload = translate_segment(&seg, TranslateOptions::default());
        let span0 = &payload.resource_spans[0].scope_spans[0].spans[0];
        assert_eq!(span0.start_time_unix_nano, "1700000000123000000");
        assert_eq!(span0.end_time_unix_nano, "1700000000456000000");
    }

    #[test]
    fn trace_id_is_shared_and_span_ids_unique() {
        let seg = segment(vec![span(0, -1), span(1, 0), span(2, 0)]);
        let payload = translate_segment(&seg, TranslateOptions::default());
        let spans = &payload.resource_spans[0].scope_spans[0].spans;
        assert_eq!(spans.len(), 3);
        assert!(spans.iter().all(|s| s.trace_id == spans[0].trace_id));
        assert_eq!(spans[0].trace_id.len(), 32);
        let mut ids: Vec<&String> = spans.iter().map(|s| &s.span_id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
        assert!(spans.iter().all(|s| s.span_id.len() == 16));
    }
}
