//! One-way result channels.
//!
//! Every worker gets its own channel. The write end belongs to the worker and
//! carries exactly one [`RECORD_SIZE`]-byte record; the read end belongs to
//! the coordinator and is dropped (closed) as soon as that record, or the
//! lack of one, has been observed.
//!
//! Two transports share the same framing:
//!
//! - thread workers hand the encoded record over a [`oneshot`] channel;
//! - process workers write it to their stdout pipe.
//!
//! In both cases a write end that is dropped before sending reads as
//! [`Failure::Closed`], which is how a crashed worker shows up.

use bytes::Bytes;
use core::fmt;
use std::io;
use tokio::{io::AsyncReadExt, process::ChildStdout, sync::oneshot};
use trisum_core::types::{RECORD_SIZE, WorkerId, WorkerResult};

/// Creates an in-process channel for a thread worker.
pub fn channel() -> (ChannelWriteEnd, ChannelReadEnd) {
    let (tx, rx) = oneshot::channel();
    (ChannelWriteEnd { tx }, ChannelReadEnd::Memory(rx))
}

/// The worker's side of an in-process channel.
#[derive(Debug)]
pub struct ChannelWriteEnd {
    tx: oneshot::Sender<Bytes>,
}

impl ChannelWriteEnd {
    /// Sends the record and closes the channel.
    ///
    /// Returns `false` if the coordinator has already dropped the read end.
    pub fn send(self, result: &WorkerResult) -> bool {
        self.tx.send(result.encode()).is_ok()
    }
}

/// The coordinator's side of a result channel.
#[derive(Debug)]
pub enum ChannelReadEnd {
    Memory(oneshot::Receiver<Bytes>),
    Pipe(ChildStdout),
}

/// Why a channel resolved without a usable record.
#[derive(Debug)]
pub enum Failure {
    /// The write end closed before any byte arrived.
    Closed,
    /// The write end closed after fewer bytes than one record.
    ShortRecord(usize),
    /// The record names a different worker than the channel belongs to.
    WrongWorker(WorkerId),
    /// Reading the pipe failed.
    Io(io::Error),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "channel closed without a result"),
            Self::ShortRecord(len) => {
                write!(f, "malformed record ({len} of {RECORD_SIZE} bytes)")
            }
            Self::WrongWorker(id) => write!(f, "record claims to be from worker {id}"),
            Self::Io(e) => write!(f, "read failed: {e}"),
        }
    }
}

/// What a channel produced.
#[derive(Debug)]
pub enum Delivery {
    Record(WorkerResult),
    Failed(Failure),
}

impl ChannelReadEnd {
    /// Waits for the channel to become readable and consumes one record.
    ///
    /// The read end is consumed, so the channel is closed on return whatever
    /// the outcome.
    pub async fn read_record(self) -> Delivery {
        match self {
            Self::Memory(rx) => match rx.await {
                Ok(bytes) => decode(&bytes),
                Err(_) => Delivery::Failed(Failure::Closed),
            },
            Self::Pipe(mut stdout) => {
                let mut buf = [0_u8; RECORD_SIZE];
                let mut filled = 0;
                while filled < RECORD_SIZE {
                    match stdout.read(&mut buf[filled..]).await {
                        Ok(0) => break,
                        Ok(n) => filled += n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => return Delivery::Failed(Failure::Io(e)),
                    }
                }
                decode(&buf[..filled])
            }
        }
    }
}

fn decode(record: &[u8]) -> Delivery {
    if record.is_empty() {
        return Delivery::Failed(Failure::Closed);
    }
    match WorkerResult::decode(record) {
        Ok(result) => Delivery::Record(result),
        Err(_) => Delivery::Failed(Failure::ShortRecord(record.len())),
    }
}
