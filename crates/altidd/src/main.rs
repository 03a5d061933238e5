use std::process::ExitCode;
use std::sync::Arc;

use altidd::{Cli, StructuredHealthReporter, bootstrap_with};
use clap::Parser;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let Ok(daemon) = bootstrap_with(&cli, Arc::new(StructuredHealthReporter::new())) else {
        return ExitCode::FAILURE;
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!(%error, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(daemon.serve()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "service stopped");
            ExitCode::FAILURE
        }
    }
}
