//! Error types for the summing engine.
//!
//! This module defines the central [`Error`] enum, which captures every
//! reportable failure of a run, from option validation through worker spawn
//! to writing the report. Each variant maps to a process exit status via
//! [`Error::exit_code`].
//!
//! ## Error Cases
//! - `InvalidConfig`: mutually exclusive or out-of-range options.
//! - `InvalidPlan`: the planner was called with arguments it cannot tile.
//! - `Source`: the input could not be opened or inspected.
//! - `ResourceExhausted`: a worker or its channel could not be created.
//! - `MalformedRecord`: a result channel delivered a record of the wrong size.
//! - `Worker`: a worker hit an I/O error while scanning its range.
//! - `Output`: the report could not be written to the sink.

use crate::types::WorkerId;
use std::{io, path::PathBuf};

pub type Result<T> = core::result::Result<T, Error>;

/// Exit status used when worker or channel creation fails (`EX_OSERR`).
pub const EXIT_RESOURCE_EXHAUSTED: u8 = 71;

/// Exit status used for every other fatal error.
pub const EXIT_FAILURE: u8 = 1;

/// Unified error type for the summing engine.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The resolved options cannot be used to start a run.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The planner received arguments that do not describe a valid tiling.
    #[error("Invalid plan: {reason}")]
    InvalidPlan { reason: String },

    /// The input source is missing or could not be inspected.
    #[error("Error checking input file {}", path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An execution context or result channel could not be created.
    #[error("Error starting worker {worker_id}: {context}")]
    ResourceExhausted {
        worker_id: WorkerId,
        context: String,
        #[source]
        source: io::Error,
    },

    /// A result channel produced something other than one full record.
    #[error("Malformed worker record: expected {expected} bytes, got {actual}")]
    MalformedRecord { expected: usize, actual: usize },

    /// A worker failed while reading its range.
    #[error("Worker {worker_id} failed: {context}")]
    Worker {
        worker_id: WorkerId,
        context: String,
        #[source]
        source: io::Error,
    },

    /// Writing the report to the output sink failed.
    #[error("Error writing output")]
    Output(#[source] io::Error),
}

impl Error {
    /// Process exit status for this error.
    ///
    /// Resource exhaustion gets its own status so callers can tell a run
    /// that never started its workers apart from bad input.
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::ResourceExhausted { .. } => EXIT_RESOURCE_EXHAUSTED,
            _ => EXIT_FAILURE,
        }
    }

    pub(crate) fn invalid_plan(reason: impl Into<String>) -> Self {
        Self::InvalidPlan {
            reason: reason.into(),
        }
    }
}
