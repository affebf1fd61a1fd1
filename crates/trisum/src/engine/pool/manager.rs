//! Worker pool for one run.
//!
//! This module defines the [`WorkerPool`] struct, which starts one worker per
//! [`WorkSpec`] through a [`WorkerBackend`], registers each worker's read end
//! with the [`Multiplexer`], and reaps every execution unit once the
//! coordinator is done with them.
//!
//! Spawning is all-or-nothing: if any worker cannot be started, the workers
//! already running are terminated and joined before the error is returned, so
//! a failed run leaves no stray threads or processes behind.

use super::backend::{ExecutionUnit, Exit, WorkerBackend, WorkerHandle};
use crate::engine::{streaming::multiplexer::Multiplexer, telemetry::increment_workers_spawned};
use trisum_core::{Result, types::WorkSpec};

struct WorkerEntry {
    spec: WorkSpec,
    unit: ExecutionUnit,
}

/// The execution units started for a run, in spawn order.
#[derive(Default)]
pub struct WorkerPool {
    workers: Vec<WorkerEntry>,
}

impl WorkerPool {
    /// Starts a worker for every spec and registers its read end with `mux`.
    ///
    /// Workers are started in `specs` order. The multiplexer only learns about
    /// a worker after it has been started successfully.
    ///
    /// # Errors
    ///
    /// Returns the backend's error for the first worker that fails to start,
    /// after terminating and joining every worker started before it.
    pub async fn spawn_all(
        backend: &dyn WorkerBackend,
        specs: Vec<WorkSpec>,
        mux: &mut Multiplexer,
    ) -> Result<Self> {
        let mut pool = Self {
            workers: Vec::with_capacity(specs.len()),
        };

        for spec in specs {
            match backend.spawn(spec) {
                Ok(WorkerHandle {
                    spec,
                    unit,
                    read_end,
                }) => {
                    tracing::debug!(%spec, backend = backend.name(), "Worker spawned");
                    increment_workers_spawned();
                    mux.register(spec.worker_id, read_end);
                    pool.workers.push(WorkerEntry { spec, unit });
                }
                Err(e) => {
                    tracing::error!(
                        worker_id = spec.worker_id,
                        started = pool.len(),
                        "Aborting run: {e}"
                    );
                    pool.abort().await;
                    return Err(e);
                }
            }
        }

        Ok(pool)
    }

    /// Number of workers started.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Number of workers whose execution unit has not exited yet.
    pub fn alive(&mut self) -> usize {
        self.workers
            .iter_mut()
            .map(|entry| entry.unit.is_alive())
            .filter(|&alive| alive)
            .count()
    }

    /// Waits for every worker to exit and returns how many failed.
    ///
    /// A worker that exits unsuccessfully has already been excluded from the
    /// total by the coordinator; here it is only logged.
    pub async fn join_all(self) -> usize {
        let joins = self.workers.into_iter().map(|WorkerEntry { spec, unit }| async move {
            match unit.join().await {
                Exit::Clean => {
                    tracing::trace!(worker_id = spec.worker_id, "Worker exited");
                    false
                }
                Exit::Failed(reason) => {
                    tracing::warn!(worker_id = spec.worker_id, %spec, "Worker exited abnormally: {reason}");
                    true
                }
            }
        });

        futures::future::join_all(joins)
            .await
            .into_iter()
            .filter(|failed| *failed)
            .count()
    }

    /// Terminates every worker and waits for them to exit.
    pub async fn abort(mut self) {
        for entry in &mut self.workers {
            entry.unit.terminate();
        }
        let abnormal = self.join_all().await;
        tracing::debug!(abnormal, "Aborted workers reaped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        config::InputSource,
        pool::backend::ThreadBackend,
        service::aggregator::Aggregator,
        streaming::{channel::channel, coordinator::collect},
    };
    use std::{
        cell::Cell,
        io::Write as _,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        thread,
        time::Duration,
    };
    use tokio_util::sync::CancellationToken;
    use trisum_core::{Error, plan::plan, types::WorkerResult};

    /// Starts workers that report immediately but only exit once cancelled,
    /// and refuses to start the `fail_at`-th one.
    struct LingeringBackend {
        fail_at: usize,
        spawned: Cell<usize>,
        exited: Arc<AtomicUsize>,
    }

    impl LingeringBackend {
        fn new(fail_at: usize) -> Self {
            Self {
                fail_at,
                spawned: Cell::new(0),
                exited: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl WorkerBackend for LingeringBackend {
        fn spawn(&self, spec: WorkSpec) -> Result<WorkerHandle> {
            let n = self.spawned.get();
            self.spawned.set(n + 1);
            if n == self.fail_at {
                return Err(Error::ResourceExhausted {
                    worker_id: spec.worker_id,
                    context: "injected".to_string(),
                    source: std::io::Error::other("no more workers"),
                });
            }

            let (write_end, read_end) = channel();
            let cancel = CancellationToken::new();
            let token = cancel.clone();
            let exited = Arc::clone(&self.exited);
            let handle = thread::spawn(move || {
                write_end.send(&WorkerResult {
                    worker_id: spec.worker_id,
                    partial_sum: 1,
                });
                while !token.is_cancelled() {
                    thread::sleep(Duration::from_millis(1));
                }
                exited.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

            Ok(WorkerHandle {
                spec,
                unit: ExecutionUnit::Thread { handle, cancel },
                read_end,
            })
        }

        fn name(&self) -> &'static str {
            "lingering"
        }
    }

    fn input_file(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    #[tokio::test]
    async fn spawns_collects_and_joins() {
        let file = input_file(b"123456789");
        let backend = ThreadBackend::new(InputSource::File(file.path().to_path_buf()));
        let specs = plan(9, 3, 3).unwrap();

        let mut mux = Multiplexer::new();
        let pool = WorkerPool::spawn_all(&backend, specs, &mut mux).await.unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(mux.pending(), 3);

        let summary = collect(&mut mux, Aggregator::new(pool.len())).await;
        assert_eq!(summary.total_sum, 1368);
        assert_eq!(pool.join_all().await, 0);
    }

    #[tokio::test]
    async fn spawn_failure_terminates_and_joins_started_workers() {
        let backend = LingeringBackend::new(2);
        let specs = plan(9, 3, 3).unwrap();

        let mut mux = Multiplexer::new();
        let err = WorkerPool::spawn_all(&backend, specs, &mut mux)
            .await
            .err()
            .unwrap();

        assert!(matches!(err, Error::ResourceExhausted { worker_id: 2, .. }));
        assert_eq!(mux.registered(), 2);
        // Both started workers only exit once cancelled, so they must have
        // been terminated and joined before the error came back.
        assert_eq!(backend.exited.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn alive_counts_running_workers() {
        let backend = LingeringBackend::new(usize::MAX);

        let mut mux = Multiplexer::new();
        let mut pool = WorkerPool::spawn_all(&backend, plan(9, 3, 3).unwrap(), &mut mux)
            .await
            .unwrap();
        let summary = collect(&mut mux, Aggregator::new(pool.len())).await;
        assert_eq!(summary.total_sum, 3);
        assert_eq!(pool.alive(), 3);

        for entry in &mut pool.workers {
            entry.unit.terminate();
        }
        assert_eq!(pool.join_all().await, 0);
        assert_eq!(backend.exited.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_worker_is_counted_on_join() {
        let backend = ThreadBackend::new(InputSource::File("/no/such/file".into()));

        let mut mux = Multiplexer::new();
        let pool = WorkerPool::spawn_all(&backend, vec![WorkSpec::whole_stream(0)], &mut mux)
            .await
            .unwrap();

        let summary = collect(&mut mux, Aggregator::new(1)).await;
        assert_eq!(summary.failed, vec![0]);
        assert_eq!(pool.join_all().await, 1);
    }
}
