//! Worker lifecycle.
//!
//! - [`backend`] - the [`WorkerBackend`](backend::WorkerBackend) seam with
//!   thread and process implementations.
//! - [`worker`] - the scan each worker performs, shared by both backends.
//! - [`manager`] - the registry that spawns, terminates and joins workers.

pub mod backend;
pub mod manager;
pub mod worker;
