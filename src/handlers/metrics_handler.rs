use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};

use crate::metrics::MetricPublisher;

/// Prometheus text exposition content type
const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Handle /metrics endpoint
pub async fn metrics(State(publisher): State<MetricPublisher>) -> impl IntoResponse {
    let body = publisher.render();
    (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_handler() {
        let publisher = MetricPublisher::new();
        publisher.add(3);

        let response = metrics(State(publisher)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            CONTENT_TYPE
        );
    }
}
