//! OpenTelemetry setup: structured logs, traces, and the metrics reader.
//!
//! Traces are exported over OTLP/gRPC. Metrics go to whichever reader the
//! exporter selection picked: periodic OTLP push, Prometheus pull, or none.
//!
//! # Telemetry invariants
//!
//! - Every span and metric carries the resource resolved at startup.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`).

pub mod init;

pub use init::{init_logging, install_metrics, install_tracing, shutdown_tracing, MetricsPipeline};
