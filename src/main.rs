use clap::Parser;
use std::process::ExitCode;

use log_query::{cli::Cli, init_tracing, metrics::MetricPublisher, orchestrator};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let args = Cli::parse();

    init_tracing(args.log_format);

    // The counter lives for the whole process, past the one-shot phase
    let publisher = MetricPublisher::new();

    match orchestrator::run(args, publisher).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(kind = e.kind(), "Run aborted");
            eprintln!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
