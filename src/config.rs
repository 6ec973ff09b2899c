use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::error::LogQueryError;
use crate::signal::{ColumnSelector, SignalRule};
use crate::snapshot::DEFAULT_SNAPSHOT_PATH;

/// Environment prefix for settings overrides (`LOG_QUERY_METRICS_PORT=9090`)
const ENV_PREFIX: &str = "LOG_QUERY";
/// Settings file looked up in the working directory when `--config` is absent
const DEFAULT_SETTINGS_FILE: &str = "log-query";

/// Endpoint and runtime settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    pub authority_host: String,
    pub query_endpoint: String,
    pub scope: String,
    pub metrics_host: String,
    pub metrics_port: u16,
    pub snapshot_path: PathBuf,
    pub query_timeout_seconds: u64,
    pub auth_timeout_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            authority_host: "https://login.microsoftonline.com".to_string(),
            query_endpoint: "https://api.loganalytics.io".to_string(),
            scope: "https://api.loganalytics.io/.default".to_string(),
            metrics_host: "0.0.0.0".to_string(),
            metrics_port: 8080,
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            query_timeout_seconds: 120,
            auth_timeout_seconds: 30,
        }
    }
}

impl Settings {
    pub fn query_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.query_timeout_seconds)
    }

    pub fn auth_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.auth_timeout_seconds)
    }
}

/// Load settings: defaults, then the settings file, then `LOG_QUERY_*` env vars
///
/// An explicit `path` must exist; the default file is optional.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, LogQueryError> {
    load_settings_with(path, environment())
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn load_settings_with(
    path: Option<&Path>,
    env: config::Environment,
) -> Result<Settings, LogQueryError> {
    let file = match path {
        Some(p) => config::File::from(p).required(true),
        None => config::File::with_name(DEFAULT_SETTINGS_FILE).required(false),
    };

    let settings: Settings = config::Config::builder()
        .add_source(config::Config::try_from(&Settings::default())?)
        .add_source(file)
        .add_source(env)
        .build()?
        .try_deserialize()?;

    validate_settings(&settings)?;
    Ok(settings)
}

fn validate_settings(settings: &Settings) -> Result<(), LogQueryError> {
    for (key, url) in [
        ("authority_host", &settings.authority_host),
        ("query_endpoint", &settings.query_endpoint),
    ] {
        reqwest::Url::parse(url).map_err(|e| {
            LogQueryError::Configuration(format!("{} '{}' is not a valid URL: {}", key, url, e))
        })?;
    }

    if settings.scope.trim().is_empty() {
        return Err(LogQueryError::Configuration("scope cannot be empty".to_string()));
    }
    if settings.query_timeout_seconds == 0 || settings.auth_timeout_seconds == 0 {
        return Err(LogQueryError::Configuration(
            "timeouts must be at least one second".to_string(),
        ));
    }
    if settings.snapshot_path.as_os_str().is_empty() {
        return Err(LogQueryError::Configuration(
            "snapshot_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Client-credential identity used to sign in to the query service
#[derive(Clone)]
pub struct Identity {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

/// Validated inputs of one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub query: String,
    pub export_json: bool,
    pub window: Duration,
    pub workspace_id: String,
    pub identity: Identity,
    pub signal: SignalRule,
    pub settings: Settings,
}

impl RunConfig {
    /// Validate CLI and environment inputs and load settings
    ///
    /// Fails before any network activity when the time window does not parse
    /// or any identity input is missing.
    pub fn resolve(cli: &Cli) -> Result<Self, LogQueryError> {
        let window = parse_window(&cli.timespan)?;
        let (identity, workspace_id) = resolve_identity(cli)?;
        let column = cli
            .signal_column
            .parse::<ColumnSelector>()
            .map_err(LogQueryError::Configuration)?;
        let settings = load_settings(cli.config.as_deref())?;

        Ok(Self {
            query: cli.query.clone(),
            export_json: cli.export_json(),
            window,
            workspace_id,
            identity,
            signal: SignalRule::new(column, cli.signal_pattern.clone()),
            settings,
        })
    }
}

fn resolve_identity(cli: &Cli) -> Result<(Identity, String), LogQueryError> {
    fn present(value: &Option<String>) -> Option<String> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    let client_id = present(&cli.client_id);
    let client_secret = present(&cli.client_secret);
    let tenant_id = present(&cli.tenant_id);
    let workspace_id = present(&cli.workspace_id);

    match (client_id, client_secret, tenant_id, workspace_id) {
        (Some(client_id), Some(client_secret), Some(tenant_id), Some(workspace_id)) => Ok((
            Identity {
                tenant_id,
                client_id,
                client_secret,
            },
            workspace_id,
        )),
        (client_id, client_secret, tenant_id, workspace_id) => {
            let missing: Vec<&str> = [
                ("AZURE_CLIENT_ID", client_id.is_none()),
                ("AZURE_CLIENT_SECRET", client_secret.is_none()),
                ("AZURE_TENANT_ID", tenant_id.is_none()),
                ("LOG_QUERY_WORKSPACE_ID", workspace_id.is_none()),
            ]
            .into_iter()
            .filter(|(_, is_missing)| *is_missing)
            .map(|(name, _)| name)
            .collect();
            Err(LogQueryError::Configuration(format!(
                "missing required identity settings: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Parse the query window; it must be a positive duration
pub fn parse_window(input: &str) -> Result<Duration, LogQueryError> {
    let window = parse_duration(input)
        .map_err(|e| LogQueryError::Configuration(format!("Invalid timespan: {}", e)))?;
    if window <= Duration::zero() {
        return Err(LogQueryError::Configuration(format!(
            "Invalid timespan: {:?} must be positive",
            input
        )));
    }
    Ok(window)
}

/// Parse a duration such as `300ms`, `5m`, `1.5h` or `1h30m`
///
/// Units: `ns`, `us` (`µs`), `ms`, `s`, `m`, `h`. An optional leading sign is
/// accepted; a bare `0` needs no unit.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let invalid = || format!("invalid duration {:?}", input);

    let (negative, mut rest) = match input.as_bytes().first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        Some(_) => (false, input),
        None => return Err(invalid()),
    };
    if rest == "0" {
        return Ok(Duration::zero());
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total_nanos: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let int_part = &rest[..int_len];
        rest = &rest[int_len..];

        let mut frac_part = "";
        if let Some(after_dot) = rest.strip_prefix('.') {
            let frac_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
            frac_part = &after_dot[..frac_len];
            rest = &after_dot[frac_len..];
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }

        let unit_len = rest
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let scale: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            "" => return Err(format!("missing unit in duration {:?}", input)),
            other => return Err(format!("unknown unit {:?} in duration {:?}", other, input)),
        };

        let overflow = || format!("duration {:?} is out of range", input);
        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| overflow())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(overflow)?;
        if !frac_part.is_empty() {
            // Digits past 18 are below nanosecond resolution for every unit
            let digits = &frac_part[..frac_part.len().min(18)];
            let frac: u128 = digits.parse().map_err(|_| invalid())?;
            nanos += frac * scale / 10u128.pow(digits.len() as u32);
        }
        total_nanos = total_nanos.checked_add(nanos).ok_or_else(overflow)?;
    }

    let nanos = i64::try_from(total_nanos).map_err(|_| format!("duration {:?} is out of range", input))?;
    let duration = Duration::nanoseconds(nanos);
    Ok(if negative { -duration } else { duration })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli_with_identity(args: &[&str]) -> Cli {
        let mut argv = vec!["log-query"];
        argv.extend_from_slice(args);
        let mut cli = Cli::try_parse_from(argv).unwrap();
        cli.client_id = Some("c31360fd-0000-0000-0000-000000000000".to_string());
        cli.client_secret = Some("secret".to_string());
        cli.tenant_id = Some("tenant".to_string());
        cli.workspace_id = Some("workspace".to_string());
        cli
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("5m").unwrap(), Duration::minutes(5));
        assert_eq!(parse_duration("1h").unwrap(), Duration::hours(1));
        assert_eq!(parse_duration("24h").unwrap(), Duration::hours(24));
        assert_eq!(parse_duration("300ms").unwrap(), Duration::milliseconds(300));
        assert_eq!(parse_duration("10us").unwrap(), Duration::microseconds(10));
        assert_eq!(parse_duration("10µs").unwrap(), Duration::microseconds(10));
        assert_eq!(parse_duration("7ns").unwrap(), Duration::nanoseconds(7));
        assert_eq!(parse_duration("0").unwrap(), Duration::zero());
    }

    #[test]
    fn test_parse_duration_compound_and_fractional() {
        assert_eq!(
            parse_duration("1h30m").unwrap(),
            Duration::hours(1) + Duration::minutes(30)
        );
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::minutes(90));
        assert_eq!(parse_duration(".5s").unwrap(), Duration::milliseconds(500));
        assert_eq!(parse_duration("-2m").unwrap(), -Duration::minutes(2));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        for input in ["banana", "", "5", "1d", "h", "-", "1.h2", "5 m"] {
            assert!(parse_duration(input).is_err(), "{:?} should not parse", input);
        }
        assert!(parse_duration("99999999999999999999h").is_err());
    }

    #[test]
    fn test_parse_window_requires_positive() {
        assert!(parse_window("24h").is_ok());
        assert!(matches!(parse_window("0"), Err(LogQueryError::Configuration(_))));
        assert!(matches!(parse_window("-1h"), Err(LogQueryError::Configuration(_))));
    }

    #[test]
    fn test_resolve_rejects_bad_timespan() {
        let cli = cli_with_identity(&["--timespan", "banana"]);
        let err = RunConfig::resolve(&cli).unwrap_err();
        assert!(matches!(err, LogQueryError::Configuration(_)));
        assert!(err.to_string().contains("banana"));
    }

    #[test]
    fn test_resolve_reports_every_missing_identity_input() {
        let mut cli = cli_with_identity(&[]);
        cli.client_secret = None;
        cli.workspace_id = Some("   ".to_string());

        let err = RunConfig::resolve(&cli).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("AZURE_CLIENT_SECRET"));
        assert!(message.contains("LOG_QUERY_WORKSPACE_ID"));
        assert!(!message.contains("AZURE_TENANT_ID"));
    }

    #[test]
    fn test_resolve_builds_run_config() {
        let cli = cli_with_identity(&["--timespan", "5m", "--output", "text", "--signal-column", "Message"]);
        let config = RunConfig::resolve(&cli).unwrap();
        assert_eq!(config.window, Duration::minutes(5));
        assert!(!config.export_json);
        assert_eq!(config.signal.column, ColumnSelector::Name("Message".to_string()));
        assert_eq!(config.signal.pattern, "404");
        assert_eq!(config.workspace_id, "workspace");
    }

    #[test]
    fn test_identity_debug_hides_secret() {
        let identity = Identity {
            tenant_id: "t".into(),
            client_id: "c".into(),
            client_secret: "super-secret".into(),
        };
        assert!(!format!("{:?}", identity).contains("super-secret"));
    }

    #[test]
    fn test_settings_file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            "metrics_port = 9191\nsnapshot_path = \"out/snapshot.json\"\nquery_endpoint = \"http://127.0.0.1:1\"\n",
        )
        .unwrap();

        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.metrics_port, 9191);
        assert_eq!(settings.snapshot_path, PathBuf::from("out/snapshot.json"));
        assert_eq!(settings.query_endpoint, "http://127.0.0.1:1");
        assert_eq!(settings.authority_host, Settings::default().authority_host);
    }

    #[test]
    fn test_env_overrides_settings_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "metrics_port = 9191\n").unwrap();

        let vars: config::Map<String, String> = [
            ("LOG_QUERY_METRICS_PORT", "9090"),
            ("LOG_QUERY_AUTHORITY_HOST", "http://127.0.0.1:9"),
            ("LOG_QUERY_WORKSPACE_ID", "ws-1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let settings =
            load_settings_with(Some(&path), environment().source(Some(vars))).unwrap();
        assert_eq!(settings.metrics_port, 9090);
        assert_eq!(settings.authority_host, "http://127.0.0.1:9");
        assert_eq!(settings.query_timeout_seconds, 120);
    }

    #[test]
    fn test_missing_explicit_settings_file_fails() {
        let err = load_settings(Some(Path::new("/nonexistent/log-query.toml"))).unwrap_err();
        assert!(matches!(err, LogQueryError::Configuration(_)));
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let settings = Settings {
            query_endpoint: "not a url".to_string(),
            ..Settings::default()
        };
        assert!(validate_settings(&settings).is_err());
        assert!(validate_settings(&Settings::default()).is_ok());
    }
}
