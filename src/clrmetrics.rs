//! CLR metrics flattener (C8) — translates a CLR metric report into
//! Prometheus remote-write time series (spec.md §4.8/§6).
//!
//! The decode model mirrors `original_source/clrmetrics/model.go` in full
//! (every nested group an agent may send), but only the documented field
//! list in spec.md §6 is flattened into emitted series — the same subset
//! `original_source/clrmetrics/handle.go` actually emits, even though its
//! decode model carries several groups (interops, loading, network,
//! security) it never reads from.

use serde::Deserialize;

use crate::remote_write::{self, TimeSeries};

#[derive(Debug, Clone, Deserialize)]
pub struct Payload {
    pub service: String,
    #[serde(rename = "serviceInstance")]
    pub service_instance: String,
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metric {
    #[serde(default)]
    pub cpu: Cpu,
    #[serde(default)]
    pub gc: Gc,
    #[serde(default)]
    pub thread: Thread,
    #[serde(default)]
    pub exception: Exception,
    #[serde(default)]
    pub jit: Jit,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Cpu {
    #[serde(rename = "usagePercent", default)]
    pub usage_percent: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Gc {
    #[serde(rename = "bytesInAllHeaps", default)]
    pub bytes_in_all_heaps: f64,
    #[serde(rename = "gen0CollectCount", default)]
    pub gen0_collect_count: f64,
    #[serde(rename = "gen1CollectCount", default)]
    pub gen1_collect_count: f64,
    #[serde(rename = "gen2CollectCount", default)]
    pub gen2_collect_count: f64,
    #[serde(rename = "heapMemory", default)]
    pub heap_memory: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Thread {
    #[serde(rename = "availableWorkerThreads", default)]
    pub available_worker_threads: f64,
    #[serde(rename = "availableCompletionPortThreads", default)]
    pub available_completion_port_threads: f64,
    #[serde(rename = "totalContentions", default)]
    pub total_contentions: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Exception {
    #[serde(rename = "exThrown", default)]
    pub ex_thrown: f64,
    #[serde(rename = "exThrownPerSec", default)]
    pub ex_thrown_per_sec: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Jit {
    #[serde(rename = "methodsJitted", default)]
    pub methods_jitted: f64,
    #[serde(rename = "timeInJIT", default)]
    pub time_in_jit: f64,
}

/// Flatten one metric report into the documented set of gauge time series,
/// stamped with `timestamp_ms` (spec.md §4.8: "a single sample at the
/// current wall time in milliseconds").
pub fn flatten(payload: &Payload, timestamp_ms: i64) -> Vec<TimeSeries> {
    let svc = payload.service.as_str();
    let inst = payload.service_instance.as_str();

    let mut series = Vec::with_capacity(payload.metrics.len() * 12);
    for m in &payload.metrics {
        series.push(remote_write::time_series(
            "dotnet_cpu_usage_percent",
            svc,
            inst,
            timestamp_ms,
            m.cpu.usage_percent,
        ));

        series.push(remote_write::time_series(
            "dotnet_gc_bytes_in_all_heaps",
            svc,
            inst,
            timestamp_ms,
            m.gc.bytes_in_all_heaps,
        ));
        series.push(remote_write::time_series(
            "dotnet_gc_gen0_collect_count",
            svc,
            inst,
            timestamp_ms,
            m.gc.gen0_collect_count,
        ));
        series.push(remote_write::time_series(
            "dotnet_gc_gen1_collect_count",
            svc,
            inst,
            timestamp_ms,
            m.gc.gen1_collect_count,
        ));
        series.push(remote_write::time_series(
            "dotnet_gc_gen2_collect_count",
            svc,
            inst,
            timestamp_ms,
            m.gc.gen2_collect_count,
        ));
        series.push(remote_write::time_series(
            "dotnet_gc_heap_memory",
            svc,
            inst,
            timestamp_ms,
            m.gc.heap_memory,
        ));

        series.push(remote_write::time_series(
            "dotnet_thread_available_worker_threads",
            svc,
            inst,
            timestamp_ms,
            m.thread.available_worker_threads,
        ));
        series.push(remote_write::time_series(
            "dotnet_thread_available_completion_threads",
            svc,
            inst,
            timestamp_ms,
            m.thread.available_completion_port_threads,
        ));
        series.push(remote_write::time_series(
            "dotnet_thread_total_contentions",
            svc,
            inst,
            timestamp_ms,
            m.thread.total_contentions,
        ));

        series.push(remote_write::time_series(
            "dotnet_exceptions_thrown",
            svc,
            inst,
            timestamp_ms,
            m.exception.ex_thrown,
        ));
        series.push(remote_write::time_series(
            "dotnet_exceptions_per_sec",
            svc,
            inst,
            timestamp_ms,
            m.exception.ex_thrown_per_sec,
        ));

        series.push(remote_write::time_series(
            "dotnet_jit_methods_jitted",
            svc,
            inst,
            timestamp_ms,
            m.jit.methods_jitted,
        ));
        series.push(remote_write::time_series(
            "dotnet_jit_time_in_jit",
            svc,
            inst,
            timestamp_ms,
            m.jit.time_in_jit,
        ));
    }
    series
}
