//! Top-level driver of a run
//!
//! A run moves through `Configuring → Authenticating → Querying → Reporting
//! → Serving`. Any failure before `Serving` aborts the run; nothing loops
//! back to an earlier phase and nothing is retried.

use chrono::{DateTime, Utc};
use colored::Colorize;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

use crate::{
    auth::{ClientSecretCredential, CredentialProvider},
    cli::Cli,
    client::{LogsClient, LogsQuery},
    config::RunConfig,
    error::LogQueryError,
    metrics::MetricPublisher,
    model::{QueryRequest, TimeInterval},
    report, server,
    signals::setup_signal_handlers,
    snapshot,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Configuring,
    Authenticating,
    Querying,
    Reporting,
    Serving,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuring => "configuring",
            Self::Authenticating => "authenticating",
            Self::Querying => "querying",
            Self::Reporting => "reporting",
            Self::Serving => "serving",
        };
        f.write_str(name)
    }
}

fn enter(phase: Phase) {
    info!(phase = %phase, "Entering phase");
}

/// What the one-shot phase produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub tables: usize,
    pub rows: usize,
    pub signal_count: u64,
    pub snapshot: Option<PathBuf>,
}

/// Run the whole lifecycle; returns only on error or after a shutdown signal
pub async fn run(cli: Cli, publisher: MetricPublisher) -> Result<(), LogQueryError> {
    enter(Phase::Configuring);
    let config = RunConfig::resolve(&cli)?;
    info!(
        workspace_id = %config.workspace_id,
        window_seconds = config.window.num_seconds(),
        export_json = config.export_json,
        signal_column = %config.signal.column,
        "Configuration resolved"
    );

    let mut stdout = std::io::stdout();
    query_phase(&config, &publisher, &mut stdout).await?;
    serve_phase(&config, publisher).await
}

/// Authenticate, build the client and run the one-shot query phase
pub async fn query_phase<W: Write>(
    config: &RunConfig,
    publisher: &MetricPublisher,
    out: &mut W,
) -> Result<RunSummary, LogQueryError> {
    enter(Phase::Authenticating);
    let credential = ClientSecretCredential::new(
        &config.settings.authority_host,
        config.identity.clone(),
        config.settings.auth_timeout(),
    )?;
    let token = credential.get_token(&config.settings.scope).await?;
    let client = LogsClient::new(
        &config.settings.query_endpoint,
        &token,
        config.settings.query_timeout(),
    )?;

    execute_once(&client, config, publisher, out, Utc::now()).await
}

/// Issue exactly one query and hand the result to the extractor, the
/// report and, when enabled, the snapshot writer
pub async fn execute_once<Q, W>(
    client: &Q,
    config: &RunConfig,
    publisher: &MetricPublisher,
    out: &mut W,
    now: DateTime<Utc>,
) -> Result<RunSummary, LogQueryError>
where
    Q: LogsQuery + ?Sized,
    W: Write,
{
    enter(Phase::Querying);
    let request = QueryRequest::new(
        config.query.clone(),
        TimeInterval::ending_at(now, config.window),
    );
    let result = client.query_workspace(&config.workspace_id, &request).await?;

    enter(Phase::Reporting);
    let signal_count = if result.is_empty() {
        0
    } else {
        let count = config.signal.count_matches(&result);
        publisher.add(count);
        count
    };
    info!(
        signal_count,
        pattern = %config.signal.pattern,
        counter = publisher.value(),
        "Signal extracted"
    );

    report::write_report(out, &result).map_err(|e| LogQueryError::io("stdout", e))?;

    let snapshot = if config.export_json {
        let path = &config.settings.snapshot_path;
        snapshot::write_snapshot(path, &result)?;
        writeln!(out, "Logs exported to {}", path.display())
            .map_err(|e| LogQueryError::io("stdout", e))?;
        Some(path.clone())
    } else {
        None
    };

    Ok(RunSummary {
        tables: result.tables.len(),
        rows: result.row_count(),
        signal_count,
        snapshot,
    })
}

/// Serve metrics until the process is told to stop
async fn serve_phase(config: &RunConfig, publisher: MetricPublisher) -> Result<(), LogQueryError> {
    let listener = server::bind(&config.settings).await?;

    enter(Phase::Serving);
    let (shutdown_tx, signal_handle) = setup_signal_handlers();
    let mut shutdown_rx = shutdown_tx.subscribe();

    let serving = tokio::spawn(server::serve(listener, publisher, async move {
        let _ = shutdown_rx.recv().await;
    }));
    println!(
        "{}",
        format!(
            "Metrics exposed at http://localhost:{}/metrics",
            config.settings.metrics_port
        )
        .green()
    );

    let outcome = serving
        .await
        .map_err(|e| LogQueryError::Serve(format!("metrics task failed: {}", e)))?;
    signal_handle.abort();
    outcome
}
