//! Benchmark client for the `objwire` object delivery service.
//!
//! ## Submodules
//!
//! - [`config`] - CLI/env configuration and validation.
//! - [`transport`] - HTTP and unary gRPC fetchers, gRPC channel setup.
//! - [`session`] - Client half of a streaming session.
//! - [`harness`] - Serial, fan-out and pipeline patterns.
//! - [`report`] - Results, log lines and the summary table.
//! - [`telemetry`] - Console logging.

pub mod config;
pub mod harness;
pub mod report;
pub mod session;
pub mod telemetry;
pub mod transport;
