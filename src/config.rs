use clap::Parser;

/// codexray-gateway — translates SkyWalking-style trace segments into OTLP
/// JSON and forwards CLR metric reports to a Prometheus remote-write
/// endpoint.
#[derive(Parser, Clone, Debug)]
#[command(name = "codexray-gateway", about = "SkyWalking-to-OTLP ingest gateway")]
pub struct Config {
    /// HTTP listen port for the ingress endpoints
    #[arg(long, env = "CODEXRAY_RECEIVER_PORT", default_value_t = 8081)]
    pub receiver_port: u16,

    /// Target OTLP JSON trace backend
    #[arg(
        long,
        env = "CODEXRAY_COLLECTOR_URL",
        default_value = "http://labs.codexray.io:8041/v1/traces"
    )]
    pub collector_url: String,

    /// Prometheus remote-write endpoint for CLR metrics
    #[arg(
        long,
        env = "CLR_REMOTEWRITE_URL",
        default_value = "http://demo.codexray.io/v1/metrics"
    )]
    pub clr_remotewrite_url: String,

    /// Bounded queue capacity (C4)
    #[arg(long, env = "CODEXRAY_QUEUE_SIZE", default_value_t = 50_000)]
    pub queue_size: usize,

    /// Sender pool worker count (C6). Defaults to 2x the CPU count.
    #[arg(long, env = "CODEXRAY_WORKERS")]
    pub workers: Option<usize>,

    /// Batch size flush trigger (C5)
    #[arg(long, env = "CODEXRAY_BATCH_SIZE", default_value_t = 200)]
    pub batch_size: usize,

    /// Batch time flush trigger, in milliseconds (C5)
    #[arg(long, env = "CODEXRAY_BATCH_FLUSH_MS", default_value_t = 100)]
    pub batch_flush_ms: u64,

    /// Per-request timeout talking to the OTLP backend, in milliseconds
    #[arg(long, env = "CODEXRAY_HTTP_TIMEOUT_MS", default_value_t = 5_000)]
    pub http_timeout_ms: u64,

    /// Drain deadline during graceful shutdown, in milliseconds
    #[arg(long, env = "CODEXRAY_SHUTDOWN_TIMEOUT_MS", default_value_t = 10_000)]
    pub shutdown_timeout_ms: u64,

    /// Ingest backpressure policy: drop the payload instead of blocking
    /// when the queue (C4) is full
    #[arg(long, env = "CODEXRAY_QUEUE_DROP_ON_FULL", default_value_t = false)]
    pub queue_drop_on_full: bool,

    /// Pre-scan a segment's spans to build the full id map before resolving
    /// parent links, instead of resolving parents on a single forward pass.
    /// See DESIGN.md open question 1.
    #[arg(long, env = "CODEXRAY_PRESCAN_PARENTS", default_value_t = false)]
    pub prescan_parents: bool,

    /// Reuse the source `traceId` (when it is valid 32-hex-digit lowercase
    /// hex) instead of always regenerating a fresh one. See DESIGN.md open
    /// question 2.
    #[arg(long, env = "CODEXRAY_PRESERVE_TRACE_ID", default_value_t = false)]
    pub preserve_trace_id: bool,
}

impl Config {
    /// Bind address for the ingress HTTP listener: the documented port,
    /// bound against all interfaces.
    pub fn receiver_addr(&self) -> String {
        format!("0.0.0.0:{}", self.receiver_port)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| 2 * num_cpus::get())
    }

    pub fn batch_flush(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.batch_flush_ms)
    }

    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.http_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.shutdown_timeout_ms)
    }
}
