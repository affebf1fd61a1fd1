//! # Work Ranges and Worker Records
//!
//! This module defines the data exchanged between the coordinator and its
//! workers. A [`WorkSpec`] tells a worker which bytes it owns; a
//! [`WorkerResult`] is the single message the worker sends back.
//!
//! ## Wire format
//!
//! Results travel over byte-oriented channels (an in-process pipe for thread
//! workers, the child's stdout for process workers), so they are encoded as a
//! fixed-size little-endian record:
//!
//! ```text
//! +----------------+--------------------------------+
//! | worker_id: u16 | partial_sum: u64               |
//! +----------------+--------------------------------+
//!   2 bytes          8 bytes                 = RECORD_SIZE
//! ```
//!
//! A reader that sees fewer than [`RECORD_SIZE`] bytes before the channel
//! closes treats the worker as failed.

use crate::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use core::fmt;

/// Identifier of a worker; also its index in the worker registry.
pub type WorkerId = u16;

/// Largest number of workers a single run can address.
pub const MAX_WORKERS: usize = WorkerId::MAX as usize + 1;

/// The number of bytes in an encoded [`WorkerResult`].
pub const RECORD_SIZE: usize = core::mem::size_of::<WorkerId>() + core::mem::size_of::<u64>();

/// The last byte a worker is responsible for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RangeEnd {
    /// Inclusive offset of the final byte in the range.
    Through(u64),
    /// Read until the end of the stream.
    ToEnd,
}

impl RangeEnd {
    /// Exclusive upper bound of the range, or `None` for [`RangeEnd::ToEnd`].
    pub const fn limit(self) -> Option<u64> {
        match self {
            Self::Through(last) => Some(last.saturating_add(1)),
            Self::ToEnd => None,
        }
    }
}

impl fmt::Display for RangeEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Through(last) => write!(f, "{last}"),
            Self::ToEnd => write!(f, "to-end"),
        }
    }
}

/// The byte range assigned to one worker.
///
/// Produced by [`crate::plan::plan`] and never modified afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorkSpec {
    pub worker_id: WorkerId,
    pub start_offset: u64,
    pub end_offset: RangeEnd,
}

impl WorkSpec {
    /// A single worker covering the whole stream from the current position.
    pub const fn whole_stream(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            start_offset: 0,
            end_offset: RangeEnd::ToEnd,
        }
    }

    /// Number of bytes this range covers within a stream of `stream_length`.
    pub fn len_within(&self, stream_length: u64) -> u64 {
        let end = self
            .end_offset
            .limit()
            .map_or(stream_length, |limit| limit.min(stream_length));
        end.saturating_sub(self.start_offset)
    }

    /// Whether `offset` lies inside this range.
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.start_offset && self.end_offset.limit().is_none_or(|limit| offset < limit)
    }
}

impl fmt::Display for WorkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "worker {} [{}, {}]",
            self.worker_id, self.start_offset, self.end_offset
        )
    }
}

/// The partial sum reported by one worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorkerResult {
    pub worker_id: WorkerId,
    pub partial_sum: u64,
}

impl WorkerResult {
    /// Encodes the result as a [`RECORD_SIZE`]-byte little-endian record.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(RECORD_SIZE);
        buf.put_u16_le(self.worker_id);
        buf.put_u64_le(self.partial_sum);
        buf.freeze()
    }

    /// Decodes a record previously produced by [`WorkerResult::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedRecord`] unless `record` is exactly
    /// [`RECORD_SIZE`] bytes long.
    pub fn decode(mut record: &[u8]) -> Result<Self> {
        if record.len() != RECORD_SIZE {
            return Err(Error::MalformedRecord {
                expected: RECORD_SIZE,
                actual: record.len(),
            });
        }

        Ok(Self {
            worker_id: record.get_u16_le(),
            partial_sum: record.get_u64_le(),
        })
    }
}
