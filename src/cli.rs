use clap::Parser;
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Query used when `--query` is not given
pub const DEFAULT_QUERY: &str =
    "AppTraces | where TimeGenerated > ago(24h) | project TimeGenerated, Message";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "log-query",
    version,
    about = "Run one log query, report it, and publish a match counter"
)]
pub struct Cli {
    /// Query text sent to the log store
    #[arg(short, long, default_value = DEFAULT_QUERY)]
    pub query: String,

    /// Output format: json writes a snapshot file, anything else skips it
    #[arg(short, long, default_value = "json")]
    pub output: String,

    /// Time range ending now (e.g., 5m, 1h, 24h)
    #[arg(short, long, default_value = "24h")]
    pub timespan: String,

    /// Column holding the text to match: an index or a column name
    #[arg(long, default_value = "1")]
    pub signal_column: String,

    /// Substring that makes a row count toward the metric
    #[arg(long, default_value = "404")]
    pub signal_pattern: String,

    /// Target workspace identifier
    #[arg(long, env = "LOG_QUERY_WORKSPACE_ID", hide_env_values = true)]
    pub workspace_id: Option<String>,

    /// Client (application) identifier
    #[arg(long, env = "AZURE_CLIENT_ID", hide_env_values = true)]
    pub client_id: Option<String>,

    /// Client secret (environment only)
    #[arg(long, env = "AZURE_CLIENT_SECRET", hide = true, hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Tenant identifier
    #[arg(long, env = "AZURE_TENANT_ID", hide_env_values = true)]
    pub tenant_id: Option<String>,

    /// Optional settings file (TOML, YAML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log format on stderr
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Whether the output selector asks for a JSON snapshot
    pub fn export_json(&self) -> bool {
        self.output.trim().eq_ignore_ascii_case("json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["log-query"]).unwrap();
        assert_eq!(cli.query, DEFAULT_QUERY);
        assert_eq!(cli.output, "json");
        assert_eq!(cli.timespan, "24h");
        assert_eq!(cli.signal_column, "1");
        assert_eq!(cli.signal_pattern, "404");
        assert_eq!(cli.log_format, LogFormat::Text);
        assert!(cli.export_json());
    }

    #[test]
    fn test_cli_parsing_flags() {
        let cli = Cli::try_parse_from([
            "log-query",
            "--query",
            "AppRequests | take 10",
            "--output",
            "text",
            "--timespan",
            "5m",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.query, "AppRequests | take 10");
        assert_eq!(cli.timespan, "5m");
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(!cli.export_json());
    }

    #[test]
    fn test_output_selector_is_case_insensitive() {
        let cli = Cli::try_parse_from(["log-query", "-o", "JSON"]).unwrap();
        assert!(cli.export_json());
    }
}
