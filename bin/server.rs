// Permit Queue - Web Server
// REST API over the queue service with Axum

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use permit_queue::{
    telemetry, Identity, PermitQueueConfig, PermitRecord, QueueEntry, QueueError, QueueNumber,
    QueueService,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    service: Arc<QueueService>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

#[derive(Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// `QueueError` rendered as a JSON response
struct ApiError(QueueError);

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            QueueError::NotFound(_) => StatusCode::NOT_FOUND,
            QueueError::DuplicateQueueNumber(_) | QueueError::Overflow(_) => StatusCode::CONFLICT,
            QueueError::Validation(_) => StatusCode::BAD_REQUEST,
            QueueError::Transport(_) | QueueError::Timeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(ErrorBody {
                kind: self.0.kind().to_string(),
                message: self.0.to_string(),
            }),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

/// Scan submitted by a kiosk
#[derive(Deserialize)]
struct ScanRequest {
    secret: String,
}

/// Duplicate check response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DuplicateResponse {
    queue_number: QueueNumber,
    duplicate: bool,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/queue/next - Next queue number (not reserved)
async fn next_queue_number(State(state): State<AppState>) -> ApiResult<QueueNumber> {
    let next = state.service.next_queue_number().await?;
    Ok((StatusCode::OK, Json(ApiResponse::ok(next))))
}

/// GET /api/queue/:number/duplicate - Is this number already taken?
async fn check_duplicate(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> ApiResult<DuplicateResponse> {
    let queue_number = QueueNumber::parse(&number)?;
    let duplicate = state.service.is_duplicate(queue_number).await?;
    Ok((
        StatusCode::OK,
        Json(ApiResponse::ok(DuplicateResponse {
            queue_number,
            duplicate,
        })),
    ))
}

/// POST /api/claims - Resolve a scan and issue the next number
async fn enqueue(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> ApiResult<QueueEntry> {
    let entry = state.service.enqueue(&request.secret).await?;
    info!(queue_number = %entry.queue_number, "issued via API");
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(entry))))
}

/// POST /api/claims/:number - Record a claim under a caller-chosen number
async fn record_claim(
    State(state): State<AppState>,
    Path(number): Path<String>,
    Json(identity): Json<Identity>,
) -> ApiResult<QueueEntry> {
    let queue_number = QueueNumber::parse(&number)?;
    let entry = state.service.record_claim(identity, queue_number).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(entry))))
}

/// GET /api/permits/:number - Permit for the print screen
async fn fetch_permit(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> ApiResult<PermitRecord> {
    let queue_number = QueueNumber::parse(&number)?;
    let permit = state.service.fetch_permit(queue_number).await?;
    Ok((StatusCode::OK, Json(ApiResponse::ok(permit))))
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/queue/next", get(next_queue_number))
        .route("/queue/:number/duplicate", get(check_duplicate))
        .route("/claims", post(enqueue))
        .route("/claims/:number", post(record_claim))
        .route("/permits/:number", get(fetch_permit))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PermitQueueConfig::load(None).context("failed to load configuration")?;
    telemetry::init_tracing(&config.log.level, false)?;

    let service = QueueService::from_config(&config)
        .with_context(|| format!("failed to open {}", config.store.path.display()))?;
    info!(path = %config.store.path.display(), "database opened");

    let state = AppState {
        service: Arc::new(service),
    };

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;

    info!(bind = %config.server.bind, "permit queue API listening");

    axum::serve(listener, router(state))
        .await
        .context("server error")?;

    Ok(())
}
