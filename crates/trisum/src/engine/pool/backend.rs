//! Execution backends.
//!
//! A [`WorkerBackend`] turns a [`WorkSpec`] into a running worker and the
//! read end of its result channel. The coordinator only ever sees the
//! resulting [`WorkerHandle`], so it does not care whether a worker is an OS
//! thread or an OS process:
//!
//! - [`ThreadBackend`] runs the scan on a dedicated OS thread and returns the
//!   record over an in-process channel. Safe Rust keeps workers from touching
//!   each other's memory; a panicking worker simply drops its write end.
//! - [`ProcessBackend`] re-executes a binary with the hidden `worker`
//!   subcommand and reads the record from the child's stdout, giving each
//!   worker its own address space.
//!
//! Failing to create either the execution context or its channel is reported
//! as [`Error::ResourceExhausted`].

use crate::engine::{
    config::{InputSource, WorkerArgs},
    pool::worker,
    streaming::channel::{ChannelReadEnd, channel},
};
use std::{
    io,
    path::PathBuf,
    process::Stdio,
    thread::{self, JoinHandle},
};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use trisum_core::{Error, Result, types::WorkSpec};

/// Something that can start workers.
pub trait WorkerBackend {
    /// Starts a worker for `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhausted`] if the worker or its channel
    /// cannot be created.
    fn spawn(&self, spec: WorkSpec) -> Result<WorkerHandle>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// A started worker.
#[derive(Debug)]
pub struct WorkerHandle {
    pub spec: WorkSpec,
    pub unit: ExecutionUnit,
    pub read_end: ChannelReadEnd,
}

/// How a worker ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    Clean,
    Failed(String),
}

/// The execution context behind a worker.
#[derive(Debug)]
pub enum ExecutionUnit {
    Thread {
        handle: JoinHandle<Result<()>>,
        cancel: CancellationToken,
    },
    Process(Child),
}

impl ExecutionUnit {
    pub fn is_alive(&mut self) -> bool {
        match self {
            Self::Thread { handle, .. } => !handle.is_finished(),
            Self::Process(child) => matches!(child.try_wait(), Ok(None)),
        }
    }

    /// Asks the worker to stop without waiting for it.
    ///
    /// Threads are cancelled cooperatively at their next read; processes are
    /// killed.
    pub fn terminate(&mut self) {
        match self {
            Self::Thread { cancel, .. } => cancel.cancel(),
            Self::Process(child) => {
                if let Err(e) = child.start_kill() {
                    tracing::debug!("Failed to kill worker process: {e}");
                }
            }
        }
    }

    /// Waits for the worker to exit.
    pub async fn join(self) -> Exit {
        match self {
            Self::Thread { handle, .. } => {
                match tokio::task::spawn_blocking(move || handle.join()).await {
                    Ok(Ok(Ok(()))) => Exit::Clean,
                    Ok(Ok(Err(e))) => Exit::Failed(e.to_string()),
                    Ok(Err(_)) => Exit::Failed("worker thread panicked".to_string()),
                    Err(e) => Exit::Failed(e.to_string()),
                }
            }
            Self::Process(mut child) => match child.wait().await {
                Ok(status) if status.success() => Exit::Clean,
                Ok(status) => Exit::Failed(status.to_string()),
                Err(e) => Exit::Failed(e.to_string()),
            },
        }
    }
}

/// Runs each worker on its own OS thread.
#[derive(Debug, Clone)]
pub struct ThreadBackend {
    input: InputSource,
}

impl ThreadBackend {
    pub const fn new(input: InputSource) -> Self {
        Self { input }
    }
}

impl WorkerBackend for ThreadBackend {
    fn spawn(&self, spec: WorkSpec) -> Result<WorkerHandle> {
        let (write_end, read_end) = channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let input = self.input.clone();

        let handle = thread::Builder::new()
            .name(format!("trisum-worker-{}", spec.worker_id))
            .spawn(move || {
                let result = worker::run_thread(spec, input, write_end, token);
                if let Err(e) = &result {
                    tracing::warn!(worker_id = spec.worker_id, "{e}");
                }
                result
            })
            .map_err(|source| Error::ResourceExhausted {
                worker_id: spec.worker_id,
                context: "failed to spawn worker thread".to_string(),
                source,
            })?;

        Ok(WorkerHandle {
            spec,
            unit: ExecutionUnit::Thread { handle, cancel },
            read_end,
        })
    }

    fn name(&self) -> &'static str {
        "thread"
    }
}

/// Runs each worker as a child process of `program`.
///
/// `program` must understand the hidden `worker` subcommand; normally it is
/// the running `trisum` binary.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    program: PathBuf,
    input: InputSource,
}

impl ProcessBackend {
    pub fn new(program: impl Into<PathBuf>, input: InputSource) -> Self {
        Self {
            program: program.into(),
            input,
        }
    }

    /// A backend that re-executes the current binary.
    ///
    /// # Errors
    ///
    /// Fails if the path of the running executable cannot be determined.
    pub fn current_exe(input: InputSource) -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, input))
    }
}

impl WorkerBackend for ProcessBackend {
    fn spawn(&self, spec: WorkSpec) -> Result<WorkerHandle> {
        let exhausted = |context: &str, source| Error::ResourceExhausted {
            worker_id: spec.worker_id,
            context: context.to_string(),
            source,
        };

        // Only a stream input is shared with the child; files are reopened.
        let stdin = match self.input {
            InputSource::Stdin => Stdio::inherit(),
            InputSource::File(_) => Stdio::null(),
        };

        let mut child = Command::new(&self.program)
            .args(WorkerArgs::for_spec(&spec, &self.input))
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| exhausted("failed to spawn worker process", source))?;

        let Some(stdout) = child.stdout.take() else {
            if let Err(e) = child.start_kill() {
                tracing::debug!(worker_id = spec.worker_id, "Failed to kill worker process: {e}");
            }
            return Err(exhausted(
                "worker process has no stdout pipe",
                io::Error::other("missing pipe"),
            ));
        };

        Ok(WorkerHandle {
            spec,
            unit: ExecutionUnit::Process(child),
            read_end: ChannelReadEnd::Pipe(stdout),
        })
    }

    fn name(&self) -> &'static str {
        "process"
    }
}
