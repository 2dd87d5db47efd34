//! tollgate: operator CLI for the event store.
//!
//! Parses arguments, installs logging, dispatches to the command handlers and
//! maps errors to exit codes.

mod cli;
mod commands;

use cli::Cli;
use std::process::ExitCode;
use tollgate::exit_codes;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the log filter (falls back to `RUST_LOG`).
const LOG_ENV_VAR: &str = "TOLLGATE_LOG";

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("tollgate=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse_args();

    match commands::dispatch(cli) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
