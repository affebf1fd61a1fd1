//! Run orchestration.
//!
//! - [`handler`] - [`SumService`](handler::SumService), which inspects the input,
//!   plans ranges, starts the pool and writes the report.
//! - [`aggregator`] - accumulates partial sums until every channel resolves.

pub mod aggregator;
pub mod handler;
