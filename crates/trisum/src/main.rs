use anyhow::Context;
use clap::Parser;
use std::{
    fs::File,
    io::{self, BufWriter},
    process::ExitCode,
};
use trisum::engine::{
    config::{CliArgs, Command, OutputSink, ProgramOptions, WorkerArgs},
    pool::worker,
    service::handler::SumService,
    telemetry::{exporter_shares_stdout, init_logging, init_telemetry},
};
use trisum_core::{Error, error::EXIT_FAILURE};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();

    if let Some(Command::Worker(worker)) = &args.command {
        return run_worker(worker);
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            let code = err
                .downcast_ref::<Error>()
                .map_or(EXIT_FAILURE, Error::exit_code);
            ExitCode::from(code)
        }
    }
}

/// Entry point of a process worker: one record on stdout, nothing else.
fn run_worker(args: &WorkerArgs) -> ExitCode {
    init_logging();
    match worker::run_process(args.spec(), args.input(), io::stdout().lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(worker_id = args.worker_id, "{e}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run(args: CliArgs) -> anyhow::Result<()> {
    let options = ProgramOptions::try_from(args)?;
    if exporter_shares_stdout(&options.output) {
        eprintln!("Warn: the stdout exporter shares stdout with the report; use --output FILE.");
    }
    let providers = init_telemetry()?;

    if cfg!(debug_assertions) {
        tracing::debug!("Starting run with options: {options:#?}");
    }

    let result = sum(SumService::new(options)).await;
    providers.shutdown();
    result
}

async fn sum(service: SumService) -> anyhow::Result<()> {
    // Planning happens before the sink is opened so that a bad input leaves
    // no output behind.
    let prepared = service.prepare()?;
    for warning in &prepared.warnings {
        eprintln!("Warn: {warning}");
    }

    let backend = service
        .backend()
        .context("failed to locate the trisum executable")?;

    match &service.options().output {
        OutputSink::Stdout => {
            service
                .execute(prepared, backend.as_ref(), &mut io::stdout())
                .await?;
        }
        OutputSink::File(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create output file {}", path.display()))?;
            service
                .execute(prepared, backend.as_ref(), &mut BufWriter::new(file))
                .await?;
        }
    }

    Ok(())
}
