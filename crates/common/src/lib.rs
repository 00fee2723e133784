//! Common types, protocol definitions, and errors shared across `telemetry-agent` crates.

pub mod error;
pub mod protocol;

pub use error::ConfigError;
