//! a2a-relay - agent-to-agent message relay.

use clap::Parser;
use std::process::ExitCode;

use a2a_relay::{logging, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Commands::parse();

    // Keep the guard so buffered file logs are flushed on exit.
    let _log_guard = match logging::init(args.verbose) {
        Ok((guard, _)) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match args.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
