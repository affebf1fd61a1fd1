//! Result transport from workers back to the coordinator.
//!
//! - [`channel`] - one-way, byte-oriented result channels.
//! - [`multiplexer`] - waits on every registered read end at once.
//! - [`coordinator`] - the loop that drains the multiplexer into the
//!   aggregator.

pub mod channel;
pub mod coordinator;
pub mod multiplexer;
