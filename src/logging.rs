//! Tracing setup and log-safe rendering of identity values

use clap::ValueEnum;
use std::fmt;
use tracing_subscriber::{fmt as tracing_fmt, prelude::*, EnvFilter};

/// Log line format on stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Initialize tracing/logging
///
/// Logs go to stderr; stdout carries only the report. Filter comes from
/// `RUST_LOG`, defaulting to `info`. Can only be called once per process.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(
                tracing_fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

/// Identity value shown with only its first 8 characters
#[derive(Clone, Debug)]
pub struct Redacted<'a> {
    inner: &'a str,
}

impl<'a> Redacted<'a> {
    pub fn new(value: &'a str) -> Self {
        Self { inner: value }
    }
}

impl fmt::Display for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const VISIBLE: usize = 8;
        match self.inner.char_indices().nth(VISIBLE) {
            // Too short to show anything safely
            None => write!(f, "***"),
            Some((cut, _)) => write!(f, "{}***", &self.inner[..cut]),
        }
    }
}
