//! Types shared between the coordinator and its workers.
//!
//! ## Structure
//!
//! - [`types`] - work ranges, worker results and the fixed-size record codec.
//! - [`error`] - the unified [`Error`] type and its exit-status mapping.

pub mod error;
pub mod types;

pub use error::{Error, Result};
