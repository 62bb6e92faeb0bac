//! Pull endpoint for the monitor's metrics.

use super::monitor::TrainingMonitor;
use crate::error::{PriceError, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Router serving `/metrics` and `/health`.
pub fn metrics_router(monitor: Arc<TrainingMonitor>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(|| async { "OK" }))
        .with_state(monitor)
}

async fn metrics_handler(State(monitor): State<Arc<TrainingMonitor>>) -> Response {
    match monitor.render() {
        Ok(body) => ([(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Run the metrics server until `shutdown` resolves.
pub async fn run_metrics_server<F>(
    addr: SocketAddr,
    monitor: Arc<TrainingMonitor>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Metrics server listening");

    axum::serve(listener, metrics_router(monitor))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| PriceError::Network(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_metrics_endpoint_renders_monitor() {
        let monitor = Arc::new(TrainingMonitor::new().unwrap());
        monitor.record_prediction("v1");

        let response = metrics_router(monitor)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], TEXT_FORMAT);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains(r#"prediction_requests_total{model_version="v1"} 1"#));
    }

    #[tokio::test]
    async fn test_health() {
        let monitor = Arc::new(TrainingMonitor::new().unwrap());
        let response = metrics_router(monitor)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
