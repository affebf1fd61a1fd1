use std::io::{self, Write};
use trisum_core::types::{WorkerId, WorkerResult};

/// Running totals on the consuming side of the multiplexer.
///
/// `remaining` counts channels that have not resolved. Both successes and
/// failures decrement it, so a crashed worker can never leave the run waiting
/// on a result that will not arrive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregator {
    total_sum: u64,
    remaining: usize,
    results: Vec<WorkerResult>,
    failed: Vec<WorkerId>,
}

impl Aggregator {
    pub fn new(expected: usize) -> Self {
        Self {
            total_sum: 0,
            remaining: expected,
            results: Vec::with_capacity(expected),
            failed: Vec::new(),
        }
    }

    /// Adds a successful result.
    pub fn record(&mut self, result: WorkerResult) {
        self.total_sum = self.total_sum.wrapping_add(result.partial_sum);
        self.remaining = self.remaining.saturating_sub(1);
        self.results.push(result);
    }

    /// Marks a worker's channel as resolved without a result.
    pub fn fail(&mut self, worker_id: WorkerId) {
        self.remaining = self.remaining.saturating_sub(1);
        self.failed.push(worker_id);
    }

    pub const fn total_sum(&self) -> u64 {
        self.total_sum
    }

    pub const fn remaining(&self) -> usize {
        self.remaining
    }

    pub const fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    pub fn finish(self) -> Summary {
        Summary {
            results: self.results,
            failed: self.failed,
            total_sum: self.total_sum,
            unresolved: self.remaining,
        }
    }
}

/// Final outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Successful results in arrival order.
    pub results: Vec<WorkerResult>,
    /// Workers whose channel resolved without a result.
    pub failed: Vec<WorkerId>,
    pub total_sum: u64,
    /// Channels that never resolved; zero after a normal run.
    pub unresolved: usize,
}

impl Summary {
    /// Writes one `Child <id> Sum: <sum>` line per result, then the total.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for result in &self.results {
            writeln!(
                out,
                "Child {} Sum: {}",
                result.worker_id, result.partial_sum
            )?;
        }
        writeln!(out, "Final Sum: {}", self.total_sum)?;
        out.flush()
    }
}
