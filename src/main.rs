mod cli;
mod report;

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use cli::Cli;
use zenhub_rag::{cancellation, Error};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Log file has to exist before tracing is wired up
    let log_file = match cli::prepare_log_file(&cli) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    cli::init_tracing(&cli, log_file);

    let (handle, signal) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let outcome = tokio::select! {
        res = cli::run(cli, signal.clone()) => res,
        _ = signal.cancelled() => Err(Error::Cancelled.into()),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<Error>() {
            Some(Error::Cancelled) => {
                eprintln!("Operation cancelled by user");
                ExitCode::from(130)
            }
            other => {
                let kind = other.map_or("Error", Error::kind);
                error!(kind, error = %format!("{err:#}"), "command failed");
                eprintln!("error [{kind}]: {err:#}");
                ExitCode::FAILURE
            }
        },
    }
}
