//! `telemetry-agent`: process-wide OpenTelemetry bootstrap for an HTTP
//! service.
//!
//! The agent picks the metrics exporter from the environment, resolves the
//! process resource from an ordered list of detectors, installs the trace and
//! metrics providers, and normalizes inbound request paths into routes.

pub mod agent;
pub mod config;
pub mod exporter;
pub mod resource;
pub mod route;
pub mod server;
pub mod telemetry;

pub use agent::{AgentError, TelemetryAgent};
pub use config::AgentConfig;
