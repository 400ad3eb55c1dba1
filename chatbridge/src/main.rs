//! `chatbridge`: replay a chat backend session through the ordered delivery
//! engine.
//!
//! Reads a JSON-lines script of backend updates and control steps, feeds it
//! to the engine running in its own task, and prints what the engine shows
//! the user and what it asks of the backend.
//!
//! ```bash
//! cargo run --bin chatbridge -- demos/reply_ordering.jsonl
//!
//! # JSON output, debug logs
//! CHATBRIDGE_LOG=debug cargo run --bin chatbridge -- --format json demos/long_download.jsonl
//! ```

use std::io::{self, Read as _};
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use chatbridge::config::{BridgeConfig, CliArgs};
use chatbridge::replay::{self, Printer, ScriptStep};
use chatbridge::runtime::{self, EngineOutputs};
use chatbridge::transfer::TempDirStore;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > env > config file > defaults).
    let config = match BridgeConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            BridgeConfig::default()
        }
    };

    // Logs go to a file so stdout carries only replay output.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    let steps = match read_script(cli.script.as_deref()) {
        Ok(steps) => steps,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(steps = steps.len(), "chatbridge replay starting");
    let result = run(steps, &config).await;
    tracing::info!("chatbridge replay finished");

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("chatbridge.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Reads the script from a file, or from standard input when no path is given.
fn read_script(path: Option<&Path>) -> Result<Vec<ScriptStep>, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        return Ok(replay::load_script(path)?);
    }
    let mut source = String::new();
    io::stdin().read_to_string(&mut source)?;
    Ok(replay::parse_script(&source)?)
}

/// Replays the steps through a freshly spawned engine and prints its output.
async fn run(steps: Vec<ScriptStep>, config: &BridgeConfig) -> Result<(), runtime::RuntimeError> {
    let resources = TempDirStore::new(&config.temp_dir);
    let (handle, outputs) =
        runtime::spawn_engine(config.engine.clone(), resources, &config.runtime_config());
    let printer = Printer::new(config.format, &config.timestamp_format);
    let printing = tokio::spawn(print_outputs(outputs, printer));

    for step in steps {
        match step {
            ScriptStep::Input(input) => handle.send(input).await?,
            ScriptStep::Wait(duration) => tokio::time::sleep(duration).await,
        }
    }
    handle.shutdown().await?;
    // Both output channels close once the engine task is gone.
    printing.await?;
    Ok(())
}

/// Background task: print events and requests until the engine stops.
async fn print_outputs(mut outputs: EngineOutputs, printer: Printer) {
    let mut requests_open = true;
    let mut events_open = true;
    while requests_open || events_open {
        tokio::select! {
            biased;
            event = outputs.events.recv(), if events_open => match event {
                Some(event) => println!("{}", printer.event(&event)),
                None => events_open = false,
            },
            request = outputs.requests.recv(), if requests_open => match request {
                Some(request) => println!("{}", printer.request(&request)),
                None => requests_open = false,
            },
        }
    }
}
