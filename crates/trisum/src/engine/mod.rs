//! The worker-pool coordination engine.
//!
//! ## Structure
//!
//! - [`config`] - command-line arguments and the resolved [`ProgramOptions`].
//! - [`pool`] - execution backends, the worker body, and the worker registry.
//! - [`streaming`] - one-way result channels and the readiness multiplexer.
//! - [`service`] - the run driver and the result aggregator.
//! - [`telemetry`] - logging and optional OpenTelemetry export.
//!
//! [`ProgramOptions`]: config::ProgramOptions

pub mod config;
pub mod pool;
pub mod service;
pub mod streaming;
pub mod telemetry;
