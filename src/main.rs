use std::process::ExitCode;

use clap::Parser;
use guias_sync::cli::{self, Cli};

fn main() -> ExitCode {
    guias_sync::init_tracing();
    let cli = Cli::parse();

    tracing::debug!(version = guias_sync::config::APP_VERSION, "guias-sync starting");
    match cli::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
