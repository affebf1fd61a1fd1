use anyhow::bail;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};
use trisum_core::{
    plan::Sizing,
    types::{RangeEnd, WorkSpec, WorkerId},
};

/// Sentinel path meaning standard input or standard output.
pub const STDIO_SENTINEL: &str = "-";

/// Command-line options for the `trisum` binary.
///
/// Every option can also be supplied through an environment variable (or a
/// `.env` file). Exactly one of `--child-count` and `--block-size` may be
/// given; with neither, a single worker scans the whole input.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "trisum",
    version,
    about = "A program for summation of three-digit numbers using parallel workers"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// The file for which sums should be calculated.
    ///
    /// Defaults to standard input ("-"). Standard input, like any other
    /// unseekable stream, only allows a single worker.
    ///
    /// Environment variable: `TRISUM_INPUT`
    #[arg(
        short,
        long,
        env = "TRISUM_INPUT",
        value_name = "FILE",
        value_parser = clap::value_parser!(PathBuf),
        default_value = STDIO_SENTINEL,
        allow_hyphen_values = true
    )]
    pub input: PathBuf,

    /// Where to put the results. Defaults to "-", sending them to stdout.
    ///
    /// Environment variable: `TRISUM_OUTPUT`
    #[arg(
        short,
        long,
        env = "TRISUM_OUTPUT",
        value_name = "FILE",
        value_parser = clap::value_parser!(PathBuf),
        default_value = STDIO_SENTINEL,
        allow_hyphen_values = true
    )]
    pub output: PathBuf,

    /// The number of workers to spawn, with n >= 1.
    ///
    /// Should not be used with `--block-size`.
    ///
    /// Environment variable: `TRISUM_CHILD_COUNT`
    #[arg(
        short = 'c',
        long,
        env = "TRISUM_CHILD_COUNT",
        value_name = "COUNT",
        conflicts_with = "block_size"
    )]
    pub child_count: Option<usize>,

    /// Block size, in bytes, each worker should be allocated.
    ///
    /// The worker count becomes `file size / block size`. Should not be used
    /// with `--child-count`.
    ///
    /// Environment variable: `TRISUM_BLOCK_SIZE`
    #[arg(long, env = "TRISUM_BLOCK_SIZE", value_name = "SIZE")]
    pub block_size: Option<u64>,

    /// How each worker is isolated.
    ///
    /// Environment variable: `TRISUM_BACKEND`
    #[arg(long, env = "TRISUM_BACKEND", value_enum, default_value_t = Backend::Process)]
    pub backend: Backend,
}

/// Internal subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Scan a single range and write its result record to stdout.
    ///
    /// Used by the process backend; not meant to be invoked directly.
    #[command(hide = true)]
    Worker(WorkerArgs),
}

/// Arguments for the hidden `worker` subcommand.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct WorkerArgs {
    #[arg(long)]
    pub worker_id: WorkerId,

    #[arg(
        long,
        value_parser = clap::value_parser!(PathBuf),
        default_value = STDIO_SENTINEL,
        allow_hyphen_values = true
    )]
    pub input: PathBuf,

    #[arg(long, default_value_t = 0)]
    pub start: u64,

    /// Inclusive last offset. Omitted for the range that runs to the end.
    #[arg(long)]
    pub end: Option<u64>,
}

impl WorkerArgs {
    /// Builds the arguments that make a child process scan `spec`.
    ///
    /// The input path is attached to its flag so that a path starting with
    /// `-` is never parsed as an option.
    pub fn for_spec(spec: &WorkSpec, input: &InputSource) -> Vec<OsString> {
        let mut input_arg = OsString::from("--input=");
        input_arg.push(input.to_arg());

        let mut args: Vec<OsString> = vec![
            "worker".into(),
            "--worker-id".into(),
            spec.worker_id.to_string().into(),
            input_arg,
            "--start".into(),
            spec.start_offset.to_string().into(),
        ];
        if let RangeEnd::Through(last) = spec.end_offset {
            args.push("--end".into());
            args.push(last.to_string().into());
        }
        args
    }

    pub fn spec(&self) -> WorkSpec {
        WorkSpec {
            worker_id: self.worker_id,
            start_offset: self.start,
            end_offset: self.end.map_or(RangeEnd::ToEnd, RangeEnd::Through),
        }
    }

    pub fn input(&self) -> InputSource {
        InputSource::from(self.input.as_path())
    }
}

/// Execution backend for workers.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backend {
    /// One OS process per worker (re-executes this binary).
    #[default]
    Process,
    /// One OS thread per worker.
    Thread,
}

/// Where the bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Stdin,
    File(PathBuf),
}

impl InputSource {
    pub fn to_arg(&self) -> OsString {
        match self {
            Self::Stdin => STDIO_SENTINEL.into(),
            Self::File(path) => path.clone().into_os_string(),
        }
    }
}

impl From<&Path> for InputSource {
    fn from(raw: &Path) -> Self {
        if raw == Path::new(STDIO_SENTINEL) {
            Self::Stdin
        } else {
            Self::File(raw.to_path_buf())
        }
    }
}

/// Where the report goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    Stdout,
    File(PathBuf),
}

impl From<&Path> for OutputSink {
    fn from(raw: &Path) -> Self {
        if raw == Path::new(STDIO_SENTINEL) {
            Self::Stdout
        } else {
            Self::File(raw.to_path_buf())
        }
    }
}

/// Fully validated options for one run.
///
/// Built once from [`CliArgs`] and passed explicitly to the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramOptions {
    pub input: InputSource,
    pub output: OutputSink,
    pub sizing: Sizing,
    pub backend: Backend,
}

impl TryFrom<CliArgs> for ProgramOptions {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let sizing = match (args.child_count, args.block_size) {
            (Some(_), Some(_)) => bail!("--child-count and --block-size are mutually exclusive"),
            (Some(0), None) => bail!("child count must be greater than 0"),
            (None, Some(0)) => bail!("block size must be greater than 0"),
            (Some(count), None) => Sizing::Workers(count),
            (None, Some(size)) => Sizing::BlockSize(size),
            (None, None) => Sizing::default(),
        };

        Ok(Self {
            input: InputSource::from(args.input.as_path()),
            output: OutputSink::from(args.output.as_path()),
            sizing,
            backend: args.backend,
        })
    }
}
