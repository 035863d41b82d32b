//! parallel-scale-down
//!
//! Scales Deployments and StatefulSets listed in a YAML file down in
//! parallel and waits for each to converge before maintenance starts.

use std::process::ExitCode;

use clap::Parser;
use scaledown_common::telemetry::init_logging;

use scaledown_cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_format) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match cli.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
