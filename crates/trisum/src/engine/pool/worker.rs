//! The scan every worker performs.
//!
//! Thread workers call [`run_thread`]; process workers run the hidden
//! `worker` subcommand, which calls [`run_process`]. Both open their own
//! handle on the input, scan their [`WorkSpec`] with the shared scanner, and
//! write exactly one record before returning. On error nothing is written,
//! which the coordinator observes as a closed channel.

use crate::engine::{config::InputSource, streaming::channel::ChannelWriteEnd, telemetry};
use std::{
    fs::File,
    io::{self, Read, Write},
};
use tokio_util::sync::CancellationToken;
use trisum_core::{
    Error, Result,
    scan::{RangeScan, scan_range, skip_before},
    types::{WorkSpec, WorkerId, WorkerResult},
};

/// Scans `spec` from `input` and returns the worker's result.
///
/// A file is opened afresh and, unless the range starts at offset zero,
/// positioned at `spec.start_offset` after working out how many leading
/// digits finish the previous worker's token. Standard input is read from its
/// current position with no seek.
///
/// # Errors
///
/// Returns [`Error::Worker`] if the input cannot be opened, positioned or
/// read, including when `cancel` fires mid-scan.
pub fn scan(
    spec: &WorkSpec,
    input: &InputSource,
    cancel: Option<&CancellationToken>,
) -> Result<WorkerResult> {
    let worker_id = spec.worker_id;
    let limit = spec
        .end_offset
        .limit()
        .map(|end| end.saturating_sub(spec.start_offset));

    let range = match input {
        InputSource::Stdin => {
            let stdin = io::stdin().lock();
            scan_range(Cancellable::new(stdin, cancel), 0, limit)
                .map_err(worker_error(worker_id, "failed to read standard input"))?
        }
        InputSource::File(path) => {
            let mut file =
                File::open(path).map_err(worker_error(worker_id, "failed to open input"))?;
            // Offset zero needs no seek, which keeps FIFOs and other
            // unseekable paths readable.
            let skip = if spec.start_offset == 0 {
                0
            } else {
                skip_before(&mut file, spec.start_offset)
                    .map_err(worker_error(worker_id, "failed to seek input"))?
            };
            scan_range(Cancellable::new(file, cancel), skip, limit)
                .map_err(worker_error(worker_id, "failed to read input"))?
        }
    };

    let RangeScan {
        sum,
        tokens,
        bytes_read,
    } = range;
    tracing::debug!(%spec, tokens, bytes_read, partial_sum = sum, "Range scanned");
    telemetry::increment_bytes_scanned(bytes_read);

    Ok(WorkerResult {
        worker_id,
        partial_sum: sum,
    })
}

/// Body of a thread worker.
///
/// # Errors
///
/// Propagates [`scan`] errors. The write end is dropped unsent in that case.
pub fn run_thread(
    spec: WorkSpec,
    input: InputSource,
    sink: ChannelWriteEnd,
    cancel: CancellationToken,
) -> Result<()> {
    let result = scan(&spec, &input, Some(&cancel))?;
    if !sink.send(&result) {
        tracing::debug!(worker_id = spec.worker_id, "Coordinator dropped the channel");
    }
    Ok(())
}

/// Body of a process worker: scans and writes the record to `out`.
///
/// # Errors
///
/// Propagates [`scan`] errors, and returns [`Error::Worker`] if the record
/// cannot be written.
pub fn run_process<W: Write>(spec: WorkSpec, input: InputSource, mut out: W) -> Result<()> {
    let result = scan(&spec, &input, None)?;
    out.write_all(&result.encode())
        .and_then(|()| out.flush())
        .map_err(worker_error(spec.worker_id, "failed to write result"))
}

fn worker_error(worker_id: WorkerId, context: &'static str) -> impl FnOnce(io::Error) -> Error {
    move |source| Error::Worker {
        worker_id,
        context: context.to_string(),
        source,
    }
}

/// Reader that fails once its token is cancelled.
struct Cancellable<'a, R> {
    inner: R,
    cancel: Option<&'a CancellationToken>,
}

impl<'a, R> Cancellable<'a, R> {
    const fn new(inner: R, cancel: Option<&'a CancellationToken>) -> Self {
        Self { inner, cancel }
    }
}

impl<R: Read> Read for Cancellable<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(io::Error::other("worker cancelled"));
        }
        self.inner.read(buf)
    }
}
