//! Partition planning.
//!
//! A run is sized either by worker count or by block size. [`resolve`] turns
//! whichever the user chose into a concrete [`Partitioning`] for the stream at
//! hand, and [`plan`] turns that into one [`WorkSpec`] per worker.
//!
//! Ranges are contiguous, never overlap, and together cover `[0, len)`. The
//! last range always ends with [`RangeEnd::ToEnd`] so that the remainder of a
//! floor division lands on the final worker.

use crate::{
    Error, Result,
    types::{MAX_WORKERS, RangeEnd, WorkSpec, WorkerId},
};
use core::fmt;

/// How the user asked for the stream to be divided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sizing {
    /// Spawn this many workers and derive the block size.
    Workers(usize),
    /// Use blocks of this many bytes and derive the worker count.
    BlockSize(u64),
}

impl Default for Sizing {
    fn default() -> Self {
        Self::Workers(1)
    }
}

/// Worker count and block size after both have been resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Partitioning {
    pub worker_count: usize,
    pub block_size: u64,
}

/// A sizing request that could not be honoured exactly.
///
/// These are returned to the caller rather than logged so that the binary can
/// surface them on stderr regardless of the log filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanWarning {
    /// The input is a stream, so only one worker can read it.
    StreamIgnoresChildCount(usize),
    /// The input is a stream, so it cannot be split into blocks.
    StreamIgnoresBlockSize(u64),
    /// More workers were requested than there are bytes to give them.
    ChildCountExceedsLength { requested: usize, used: usize },
    /// The block is larger than the whole input.
    BlockSizeExceedsLength { block_size: u64, stream_length: u64 },
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StreamIgnoresChildCount(count) => {
                write!(f, "using stdin... ignoring child count {count}.")
            }
            Self::StreamIgnoresBlockSize(size) => {
                write!(f, "using stdin... ignoring block size {size}.")
            }
            Self::ChildCountExceedsLength { requested, used } => write!(
                f,
                "child count {requested} exceeds input size... using {used} children."
            ),
            Self::BlockSizeExceedsLength {
                block_size,
                stream_length,
            } => write!(
                f,
                "block size {block_size} exceeds input size {stream_length}... using 1 child."
            ),
        }
    }
}

/// Outcome of [`resolve`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub partitioning: Partitioning,
    pub warnings: Vec<PlanWarning>,
}

/// Resolves a [`Sizing`] request against the input.
///
/// `stream_length` is `None` for unseekable input, in which case exactly one
/// worker is used and any request for more is reported as a warning.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] for a zero worker count or block size, or
/// when the resulting worker count exceeds [`MAX_WORKERS`].
pub fn resolve(stream_length: Option<u64>, sizing: Sizing) -> Result<Resolution> {
    match sizing {
        Sizing::Workers(0) => return Err(invalid_config("child count must be greater than 0")),
        Sizing::BlockSize(0) => return Err(invalid_config("block size must be greater than 0")),
        _ => {}
    }

    let mut warnings = Vec::new();

    let Some(len) = stream_length else {
        match sizing {
            Sizing::Workers(count) if count > 1 => {
                warnings.push(PlanWarning::StreamIgnoresChildCount(count));
            }
            Sizing::BlockSize(size) => warnings.push(PlanWarning::StreamIgnoresBlockSize(size)),
            Sizing::Workers(_) => {}
        }
        return Ok(Resolution {
            partitioning: Partitioning {
                worker_count: 1,
                block_size: 0,
            },
            warnings,
        });
    };

    let partitioning = match sizing {
        Sizing::Workers(requested) => {
            if requested > MAX_WORKERS {
                return Err(invalid_config(format!(
                    "child count ({requested}) exceeds the worker id space (max = {MAX_WORKERS})"
                )));
            }
            // Never hand out empty leading blocks: each worker but the last
            // needs at least one byte.
            let used = if (requested as u64) > len.max(1) {
                let used = usize::try_from(len.max(1)).unwrap_or(requested);
                warnings.push(PlanWarning::ChildCountExceedsLength { requested, used });
                used
            } else {
                requested
            };
            Partitioning {
                worker_count: used,
                block_size: len / used as u64,
            }
        }
        Sizing::BlockSize(block_size) => {
            let count = len / block_size;
            let worker_count = if count == 0 {
                warnings.push(PlanWarning::BlockSizeExceedsLength {
                    block_size,
                    stream_length: len,
                });
                1
            } else if count > MAX_WORKERS as u64 {
                return Err(invalid_config(format!(
                    "block size {block_size} yields {count} children (max = {MAX_WORKERS})"
                )));
            } else {
                count as usize
            };
            Partitioning {
                worker_count,
                block_size,
            }
        }
    };

    Ok(Resolution {
        partitioning,
        warnings,
    })
}

/// Splits a stream of `stream_length` bytes into `worker_count` ranges of
/// `block_size` bytes, the last of which runs to the end of the stream.
///
/// Worker `i` covers `[i * block_size, (i + 1) * block_size - 1]`; the last
/// worker covers `[i * block_size, to-end]`. With a single worker the block
/// size is ignored.
///
/// # Errors
///
/// Returns [`Error::InvalidPlan`] if `worker_count` is zero or above
/// [`MAX_WORKERS`], or if the blocks before the last one do not fit inside the
/// stream.
pub fn plan(stream_length: u64, worker_count: usize, block_size: u64) -> Result<Vec<WorkSpec>> {
    if worker_count == 0 {
        return Err(Error::invalid_plan("worker count must be at least 1"));
    }
    if worker_count > MAX_WORKERS {
        return Err(Error::invalid_plan(format!(
            "worker count {worker_count} exceeds {MAX_WORKERS}"
        )));
    }
    if worker_count > 1 {
        if block_size == 0 {
            return Err(Error::invalid_plan(
                "block size must be non-zero for more than one worker",
            ));
        }
        let fixed = (worker_count as u64 - 1)
            .checked_mul(block_size)
            .filter(|&bytes| bytes <= stream_length);
        if fixed.is_none() {
            return Err(Error::invalid_plan(format!(
                "{worker_count} blocks of {block_size} bytes do not fit in {stream_length} bytes"
            )));
        }
    }

    let last = worker_count - 1;
    let specs = (0..worker_count)
        .map(|i| {
            let index = i as u64;
            let end_offset = if i == last {
                RangeEnd::ToEnd
            } else {
                RangeEnd::Through((index + 1) * block_size - 1)
            };
            WorkSpec {
                // Bounded by MAX_WORKERS above.
                worker_id: i as WorkerId,
                start_offset: index * block_size,
                end_offset,
            }
        })
        .collect();

    Ok(specs)
}

fn invalid_config(reason: impl Into<String>) -> Error {
    Error::InvalidConfig {
        reason: reason.into(),
    }
}
