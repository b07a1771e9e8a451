//! # Observability
//!
//! Structured logging via `tracing`. Library code emits `debug!` events for
//! per-operation detail and `warn!` for degraded results; applications
//! choose where they go with [`init_logging`].

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
