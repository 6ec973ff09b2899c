pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod report;
pub mod server;
pub mod signal;
pub mod signals;
pub mod snapshot;

pub use logging::init_tracing;
