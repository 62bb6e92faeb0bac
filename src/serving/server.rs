//! HTTP surface of the prediction service.

use super::info::ServiceInfo;
use super::request::{ErrorResponse, PredictResponse};
use super::service::PredictionService;
use crate::error::{PriceError, Result};
use crate::health::HealthReport;
use crate::observability::TrainingMonitor;
use crate::shutdown::ShutdownCoordinator;
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, MatchedPath, Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Shared state for the service handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: PredictionService,
    pub info: Arc<ServiceInfo>,
    pub shutdown: ShutdownCoordinator,
    /// Body limit enforced by the router, reported back on 413.
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(service: PredictionService, info: ServiceInfo, shutdown: ShutdownCoordinator) -> Self {
        Self {
            service,
            info: Arc::new(info),
            shutdown,
            max_body_bytes: usize::MAX,
        }
    }
}

/// [`PriceError`] rendered as `{"error": ...}` with its HTTP status.
#[derive(Debug)]
pub struct ApiError(pub PriceError);

impl From<PriceError> for ApiError {
    fn from(err: PriceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from(&self.0))).into_response()
    }
}

/// Result of a manual model refresh.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshResponse {
    pub version: String,
    /// Whether a cached model was dropped.
    pub invalidated: bool,
    /// Number of columns in the reloaded schema.
    pub columns: usize,
}

/// Build the service router.
pub fn router(mut state: AppState, max_body_bytes: usize) -> Router {
    let monitor = state.service.monitor().clone();
    state.max_body_bytes = max_body_bytes;

    Router::new()
        .route("/health", get(health_handler))
        .route("/info", get(info_handler))
        .route("/:version/predict", post(predict_handler))
        .route("/models/:version/refresh", post(refresh_handler))
        .route_layer(middleware::from_fn_with_state(monitor, count_requests))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// Count every routed request by method and route template.
async fn count_requests(
    State(monitor): State<Arc<TrainingMonitor>>,
    request: Request,
    next: Next,
) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    monitor.record_request(request.method().as_str(), &endpoint);

    next.run(request).await
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let report = if state.shutdown.is_shutting_down() {
        HealthReport::down(&state.info.name)
    } else {
        HealthReport::up(&state.info.name, state.service.registry().cached_versions())
    };
    let status =
        StatusCode::from_u16(report.status.to_status_code()).unwrap_or(StatusCode::OK);
    (status, Json(report)).into_response()
}

async fn info_handler(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(state.info.as_ref().clone())
}

async fn predict_handler(
    State(state): State<AppState>,
    Path(version): Path<String>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> std::result::Result<Json<PredictResponse>, ApiError> {
    let body = body.map_err(|rejection| body_error(rejection, state.max_body_bytes))?;
    let price = state.service.predict(&version, &body).await?;
    Ok(Json(PredictResponse::new(price)))
}

fn body_error(rejection: BytesRejection, limit: usize) -> PriceError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        PriceError::BodyTooLarge { limit }
    } else {
        PriceError::InvalidBody(rejection.body_text())
    }
}

async fn refresh_handler(
    State(state): State<AppState>,
    Path(version): Path<String>,
) -> std::result::Result<Json<RefreshResponse>, ApiError> {
    let registry = state.service.registry().clone();
    if !registry.is_known(&version) {
        return Err(PriceError::model_not_found(&version, "unknown version").into());
    }

    let response = tokio::task::spawn_blocking(move || -> Result<RefreshResponse> {
        let invalidated = registry.invalidate(&version);
        let model = registry.resolve(&version)?;
        Ok(RefreshResponse {
            columns: model.schema.len(),
            version,
            invalidated,
        })
    })
    .await
    .map_err(|e| PriceError::Internal(format!("refresh task failed: {}", e)))??;

    info!(version = %response.version, invalidated = response.invalidated, "Model refreshed");
    Ok(Json(response))
}

/// Serve the prediction API until `shutdown` resolves.
pub async fn run_prediction_server<F>(
    addr: SocketAddr,
    state: AppState,
    max_body_bytes: usize,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Prediction service listening");

    axum::serve(listener, router(state, max_body_bytes))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| PriceError::Network(e.to_string()))?;

    Ok(())
}
