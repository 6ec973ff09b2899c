use thiserror::Error;

/// Fatal errors of a log-query run.
///
/// None of these are retried; each aborts the run with a one-line
/// diagnostic and a non-zero exit status.
#[derive(Debug, Error)]
pub enum LogQueryError {
    /// Bad duration, missing identity input, unreadable settings
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Credential acquisition failed
    #[error("Credential error: {0}")]
    Authentication(String),
    /// Query client could not be built
    #[error("Client error: {0}")]
    ClientConstruction(String),
    /// Remote query call failed (network, authorization, malformed query)
    #[error("Query error: {0}")]
    Query(String),
    /// Result could not be encoded as JSON
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Snapshot or report output could not be written
    #[error("Write error ({target}): {source}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },
    /// Metrics endpoint could not bind or stopped with an error
    #[error("Metrics server error: {0}")]
    Serve(String),
}

impl LogQueryError {
    pub fn io(target: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            target: target.into(),
            source,
        }
    }

    /// Stable short name used in structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "config_error",
            Self::Authentication(_) => "auth_error",
            Self::ClientConstruction(_) => "client_error",
            Self::Query(_) => "query_error",
            Self::Serialization(_) => "serialization_error",
            Self::Io { .. } => "io_error",
            Self::Serve(_) => "serve_error",
        }
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            _ => 1,
        }
    }
}

impl From<config::ConfigError> for LogQueryError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}
