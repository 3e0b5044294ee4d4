//! AutoLearn - runs a user's pending training courses and exams.
//!
//! `autolearn run` reads a `{"username", "password"}` request and streams one
//! JSON event per line to stdout. Diagnostics go to stderr.

mod cli;

use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use autolearn_core::report::archive::{list_log_files, read_log_file, LogKind};
use autolearn_core::report::{EventReporter, WriterChannel};
use autolearn_core::{Config, Runner};

use cli::{Args, Commands, LogsCommand};

/// Client address used when none is supplied.
const LOCAL_CLIENT: &str = "local";

/// Initialize the tracing subscriber for logging.
/// The returned guard must be held until exit so buffered lines are written.
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();
    guard
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        Commands::Run { request, client_ip } => run(&config, request.as_deref(), client_ip).await,
        Commands::Logs { command } => logs(&config, command),
    }
}

async fn run(config: &Config, request: Option<&Path>, client_ip: Option<String>) -> Result<()> {
    let body = read_request(request)?;
    let client_ip = client_ip
        .filter(|ip| !ip.trim().is_empty())
        .unwrap_or_else(|| LOCAL_CLIENT.to_string());

    let reporter = EventReporter::from_config(config, Box::new(WriterChannel::stdout()), client_ip);
    let outcome = Runner::new(config, reporter).run(&body).await;

    match &outcome.error {
        None => info!(
            courses = outcome.counters.courses_completed,
            exams = outcome.counters.exams_completed,
            elapsed = outcome.elapsed_secs,
            "Run finished"
        ),
        Some(e) => info!(error = %e, "Run ended early"),
    }
    Ok(())
}

fn read_request(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("Failed to read request file {}", path.display())),
        None => {
            let mut body = Vec::new();
            io::stdin()
                .read_to_end(&mut body)
                .context("Failed to read request from stdin")?;
            Ok(body)
        }
    }
}

fn logs(config: &Config, command: LogsCommand) -> Result<()> {
    match command {
        LogsCommand::List { errors } => {
            let kind = if errors { LogKind::Error } else { LogKind::Primary };
            for name in list_log_files(config, kind).context("Failed to list log files")? {
                println!("{}", name);
            }
        }
        LogsCommand::Show { name } => {
            let contents = read_log_file(config, &name)
                .with_context(|| format!("Failed to read log file {}", name))?;
            print!("{}", contents);
        }
    }
    Ok(())
}
