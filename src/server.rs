use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{config::Settings, error::LogQueryError, handlers, metrics::MetricPublisher};

/// Create the metrics router
pub fn create_router(publisher: MetricPublisher) -> Router {
    Router::new()
        .route("/metrics", get(handlers::metrics_handler::metrics))
        .route("/health", get(handlers::health::health_check))
        .with_state(publisher)
        .layer(TraceLayer::new_for_http())
}

/// Bind the metrics listener from settings
pub async fn bind(settings: &Settings) -> Result<TcpListener, LogQueryError> {
    let ip = settings
        .metrics_host
        .parse::<std::net::IpAddr>()
        .map_err(|e| {
            LogQueryError::Serve(format!("invalid metrics host '{}': {}", settings.metrics_host, e))
        })?;
    let addr = SocketAddr::from((ip, settings.metrics_port));

    TcpListener::bind(addr)
        .await
        .map_err(|e| LogQueryError::Serve(format!("failed to bind {}: {}", addr, e)))
}

/// Serve `/metrics` on `listener` until `shutdown` resolves
pub async fn serve<F>(
    listener: TcpListener,
    publisher: MetricPublisher,
    shutdown: F,
) -> Result<(), LogQueryError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener
        .local_addr()
        .map_err(|e| LogQueryError::Serve(e.to_string()))?;
    info!("Serving metrics on {}", addr);

    axum::serve(listener, create_router(publisher))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| LogQueryError::Serve(e.to_string()))?;

    info!("Metrics server stopped");
    Ok(())
}
