//! The summing service.
//!
//! This module defines [`SumService`], which drives one run end to end:
//!
//! - Inspect the input and decide whether it can be partitioned.
//! - Resolve the requested sizing and plan one [`WorkSpec`] per worker.
//! - Start the workers, multiplex their result channels and aggregate.
//! - Write the report, then reap every worker.
//!
//! A run is split into [`SumService::prepare`] and [`SumService::execute`] so
//! that the caller can surface planning warnings, and fail on a missing input,
//! before the output sink is opened.

use crate::engine::{
    config::{Backend, InputSource, ProgramOptions},
    pool::{
        backend::{ProcessBackend, ThreadBackend, WorkerBackend},
        manager::WorkerPool,
    },
    service::aggregator::{Aggregator, Summary},
    streaming::{coordinator::collect, multiplexer::Multiplexer},
    telemetry::record_run_duration,
};
use std::{fs, io::Write, time::Instant};
use trisum_core::{
    Error, Result,
    plan::{PlanWarning, Resolution, plan, resolve},
    types::WorkSpec,
};

/// A planned run, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    /// Input length in bytes, or `None` for a stream.
    pub stream_length: Option<u64>,
    pub specs: Vec<WorkSpec>,
    /// Sizing requests that could not be honoured exactly.
    pub warnings: Vec<PlanWarning>,
}

/// Sums three-digit tokens across a pool of workers.
#[derive(Debug, Clone)]
pub struct SumService {
    options: ProgramOptions,
}

impl SumService {
    pub const fn new(options: ProgramOptions) -> Self {
        Self { options }
    }

    pub const fn options(&self) -> &ProgramOptions {
        &self.options
    }

    /// Inspects the input and plans the run.
    ///
    /// A regular file is partitioned by its length. Anything else, standard
    /// input included, is treated as a stream and read by a single worker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Source`] if the input file cannot be inspected, and
    /// [`Error::InvalidConfig`] if the sizing request cannot be resolved.
    #[tracing::instrument(skip_all, fields(input = ?self.options.input))]
    pub fn prepare(&self) -> Result<Prepared> {
        let stream_length = match &self.options.input {
            InputSource::Stdin => None,
            InputSource::File(path) => {
                let metadata = fs::metadata(path).map_err(|source| Error::Source {
                    path: path.clone(),
                    source,
                })?;
                metadata.is_file().then(|| metadata.len())
            }
        };

        let Resolution {
            partitioning,
            warnings,
        } = resolve(stream_length, self.options.sizing)?;

        let specs = match stream_length {
            Some(len) => plan(len, partitioning.worker_count, partitioning.block_size)?,
            None => vec![WorkSpec::whole_stream(0)],
        };

        tracing::debug!(
            ?stream_length,
            workers = specs.len(),
            block_size = partitioning.block_size,
            "Run planned"
        );

        Ok(Prepared {
            stream_length,
            specs,
            warnings,
        })
    }

    /// Executes a prepared run and writes the report to `out`.
    ///
    /// The `File size:` line is written and flushed before any worker starts.
    /// Per-worker lines follow in the order results arrived, then the total.
    /// The report is flushed as soon as every channel has resolved; reaping
    /// the workers comes after it.
    ///
    /// A worker that fails after starting is excluded from the total and the
    /// run still succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhausted`] if a worker cannot be started, and
    /// [`Error::Output`] if the report cannot be written.
    #[tracing::instrument(skip_all, fields(workers = prepared.specs.len()))]
    pub async fn execute<W: Write>(
        &self,
        prepared: Prepared,
        backend: &dyn WorkerBackend,
        out: &mut W,
    ) -> Result<Summary> {
        let started = Instant::now();

        if let Some(len) = prepared.stream_length {
            writeln!(out, "File size: {len}")
                .and_then(|()| out.flush())
                .map_err(Error::Output)?;
        }

        let mut mux = Multiplexer::new();
        let mut pool = WorkerPool::spawn_all(backend, prepared.specs, &mut mux).await?;
        tracing::debug!(workers = pool.len(), backend = backend.name(), "Workers started");

        let summary = collect(&mut mux, Aggregator::new(pool.len())).await;
        tracing::debug!(alive = pool.alive(), "All channels resolved");

        let written = summary.write_to(out).map_err(Error::Output);
        let abnormal = pool.join_all().await;
        if abnormal > 0 {
            tracing::warn!(abnormal, "Some workers did not exit cleanly");
        }
        written?;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        record_run_duration(elapsed_ms);
        tracing::info!(
            total_sum = summary.total_sum,
            failed = summary.failed.len(),
            elapsed_ms,
            "Run complete"
        );

        Ok(summary)
    }

    /// Builds the backend selected in the options.
    ///
    /// # Errors
    ///
    /// Fails if the process backend cannot locate the running executable.
    pub fn backend(&self) -> std::io::Result<Box<dyn WorkerBackend>> {
        let input = self.options.input.clone();
        Ok(match self.options.backend {
            Backend::Process => Box::new(ProcessBackend::current_exe(input)?),
            Backend::Thread => Box::new(ThreadBackend::new(input)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        config::OutputSink,
        pool::backend::{ExecutionUnit, WorkerHandle},
        streaming::channel::channel,
    };
    use std::{io, thread, time::Duration};
    use tokio_util::sync::CancellationToken;
    use trisum_core::{
        plan::Sizing,
        types::{RangeEnd, WorkerResult},
    };

    fn options(input: InputSource, sizing: Sizing) -> ProgramOptions {
        ProgramOptions {
            input,
            output: OutputSink::Stdout,
            sizing,
            backend: Backend::Thread,
        }
    }

    fn input_file(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    async fn run(service: &SumService) -> (Summary, String) {
        let prepared = service.prepare().unwrap();
        let backend = ThreadBackend::new(service.options().input.clone());
        let mut out = Vec::new();
        let summary = service.execute(prepared, &backend, &mut out).await.unwrap();
        (summary, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn three_children_over_nine_bytes() {
        let file = input_file(b"123456789");
        let service = SumService::new(options(
            InputSource::File(file.path().to_path_buf()),
            Sizing::Workers(3),
        ));

        let (summary, report) = run(&service).await;
        assert_eq!(summary.total_sum, 1368);
        assert!(report.starts_with("File size: 9\n"));
        assert!(report.ends_with("Final Sum: 1368\n"));
        for line in ["Child 0 Sum: 123", "Child 1 Sum: 456", "Child 2 Sum: 789"] {
            assert!(report.contains(line), "missing {line:?} in {report:?}");
        }
    }

    #[tokio::test]
    async fn block_size_determines_worker_count() {
        let file = input_file(b"123456789");
        let service = SumService::new(options(
            InputSource::File(file.path().to_path_buf()),
            Sizing::BlockSize(3),
        ));

        let prepared = service.prepare().unwrap();
        assert_eq!(prepared.specs.len(), 3);
        assert!(prepared.warnings.is_empty());

        let (summary, _) = run(&service).await;
        assert_eq!(summary.total_sum, 1368);
    }

    #[tokio::test]
    async fn empty_file_sums_to_zero() {
        let file = input_file(b"");
        let service = SumService::new(options(
            InputSource::File(file.path().to_path_buf()),
            Sizing::Workers(1),
        ));

        let (summary, report) = run(&service).await;
        assert_eq!(summary.total_sum, 0);
        assert_eq!(report, "File size: 0\nChild 0 Sum: 0\nFinal Sum: 0\n");
    }

    #[tokio::test]
    async fn sum_does_not_depend_on_worker_count() {
        let contents = b"123 45 678\n9999\n001\nab12c345";
        let file = input_file(contents);
        let expected = trisum_core::scan::scan_sum(contents);

        for workers in 1..=contents.len() {
            let service = SumService::new(options(
                InputSource::File(file.path().to_path_buf()),
                Sizing::Workers(workers),
            ));
            let (summary, _) = run(&service).await;
            assert_eq!(summary.total_sum, expected, "{workers} workers");
            assert!(summary.failed.is_empty());
        }
    }

    #[test]
    fn stdin_is_planned_as_a_single_stream() {
        let service = SumService::new(options(InputSource::Stdin, Sizing::Workers(4)));
        let prepared = service.prepare().unwrap();

        assert_eq!(prepared.stream_length, None);
        assert_eq!(prepared.specs, vec![WorkSpec::whole_stream(0)]);
        assert_eq!(
            prepared.warnings,
            vec![PlanWarning::StreamIgnoresChildCount(4)]
        );
        assert_eq!(
            prepared.warnings[0].to_string(),
            "using stdin... ignoring child count 4."
        );
    }

    #[test]
    fn missing_input_is_a_source_error() {
        let service = SumService::new(options(
            InputSource::File("/no/such/trisum-input".into()),
            Sizing::Workers(2),
        ));
        let err = service.prepare().unwrap_err();
        assert!(matches!(err, Error::Source { .. }));
        assert_eq!(err.exit_code(), trisum_core::error::EXIT_FAILURE);
    }

    #[test]
    fn last_range_runs_to_end() {
        let file = input_file(b"1234567890");
        let service = SumService::new(options(
            InputSource::File(file.path().to_path_buf()),
            Sizing::Workers(3),
        ));
        let prepared = service.prepare().unwrap();

        assert_eq!(prepared.stream_length, Some(10));
        assert_eq!(prepared.specs[2].start_offset, 6);
        assert_eq!(prepared.specs[2].end_offset, RangeEnd::ToEnd);
    }

    /// Workers that report at once but keep running until `release` is
    /// cancelled.
    struct HeldBackend {
        release: CancellationToken,
    }

    impl WorkerBackend for HeldBackend {
        fn spawn(&self, spec: WorkSpec) -> Result<WorkerHandle> {
            let (write_end, read_end) = channel();
            let release = self.release.clone();
            let handle = thread::spawn(move || {
                write_end.send(&WorkerResult {
                    worker_id: spec.worker_id,
                    partial_sum: 100,
                });
                while !release.is_cancelled() {
                    thread::sleep(Duration::from_millis(1));
                }
                Ok(())
            });

            Ok(WorkerHandle {
                spec,
                unit: ExecutionUnit::Thread {
                    handle,
                    cancel: CancellationToken::new(),
                },
                read_end,
            })
        }

        fn name(&self) -> &'static str {
            "held"
        }
    }

    /// Releases the held workers once the total has been flushed.
    struct ReleasingSink {
        buf: Vec<u8>,
        release: CancellationToken,
    }

    impl io::Write for ReleasingSink {
        fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
            self.buf.extend_from_slice(bytes);
            Ok(bytes.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            if String::from_utf8_lossy(&self.buf).contains("Final Sum:") {
                self.release.cancel();
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn report_is_flushed_before_workers_are_reaped() {
        let file = input_file(b"123456789");
        let service = SumService::new(options(
            InputSource::File(file.path().to_path_buf()),
            Sizing::Workers(3),
        ));
        let release = CancellationToken::new();
        let backend = HeldBackend {
            release: release.clone(),
        };
        let mut out = ReleasingSink {
            buf: Vec::new(),
            release,
        };

        let prepared = service.prepare().unwrap();
        let summary = tokio::time::timeout(
            Duration::from_secs(10),
            service.execute(prepared, &backend, &mut out),
        )
        .await
        .expect("workers were reaped before the report was written")
        .unwrap();

        assert_eq!(summary.total_sum, 300);
        assert!(String::from_utf8(out.buf).unwrap().ends_with("Final Sum: 300\n"));
    }
}
