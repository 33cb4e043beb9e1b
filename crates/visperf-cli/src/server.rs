//! HTTP API over the test orchestrator.
//!
//! ```text
//! POST /test               {subject}              -> TestResponse
//! POST /accept             {subject, imageBase64} -> AcceptResponse
//! GET  /baseline/{subject}                        -> BaselineResponse
//! GET  /health                                    -> HealthResponse
//! ```
//!
//! Every route is served both under the configured base path and at root.
//! Failures answer with a non-2xx status and `{status: "error", message}`.

use crate::config::ServerConfig;
use crate::error::{CliError, CliResult};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use visperf::{
    AcceptRequest, AcceptResponse, BaselineResponse, ErrorResponse, HealthResponse, Subject,
    TestOrchestrator, TestRequest, TestResponse, VisperfError,
};

/// Largest request body accepted (base64 screenshots are large)
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Shared handler state
#[derive(Debug, Clone)]
pub struct ApiState {
    orchestrator: TestOrchestrator,
}

/// Error answered to an API client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status
    pub status: StatusCode,
    /// Human-readable message
    pub message: String,
}

impl ApiError {
    /// Create a 400 error
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<VisperfError> for ApiError {
    fn from(err: VisperfError) -> Self {
        let status = match &err {
            VisperfError::InvalidSubject { .. } | VisperfError::MissingCandidate { .. } => {
                StatusCode::BAD_REQUEST
            }
            VisperfError::DecodeError { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            VisperfError::BaselineNotFound { .. } => StatusCode::NOT_FOUND,
            VisperfError::CaptureFailed { .. }
            | VisperfError::EncodeError { .. }
            | VisperfError::WriteError { .. }
            | VisperfError::Task { .. }
            | VisperfError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %err, "request failed");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse::new(self.message))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Build the API router
#[must_use]
pub fn router(orchestrator: TestOrchestrator, config: &ServerConfig) -> Router {
    let api = Router::new()
        .route("/test", post(run_test))
        .route("/accept", post(accept))
        .route("/baseline/{subject}", get(baseline))
        .route("/health", get(health))
        .with_state(ApiState { orchestrator });

    let base = config.base_path.trim_end_matches('/');
    let app = if base.is_empty() {
        api
    } else {
        Router::new().nest(base, api.clone()).merge(api)
    };

    let app = app
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http());

    if config.cors {
        app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        app
    }
}

async fn run_test(
    State(state): State<ApiState>,
    body: Result<Json<TestRequest>, JsonRejection>,
) -> ApiResult<TestResponse> {
    let Json(request) = body?;
    let subject = request.subject()?;
    let result = state.orchestrator.try_run_test(&subject).await?;
    Ok(Json(TestResponse::from(&result)))
}

async fn accept(
    State(state): State<ApiState>,
    body: Result<Json<AcceptRequest>, JsonRejection>,
) -> ApiResult<AcceptResponse> {
    let Json(request) = body?;
    let subject = request.subject()?;
    let candidate = request.candidate()?;
    let result = state.orchestrator.try_accept(&subject, candidate).await?;
    Ok(Json(AcceptResponse::from(&result)))
}

async fn baseline(
    State(state): State<ApiState>,
    Path(subject): Path<String>,
) -> ApiResult<BaselineResponse> {
    let subject = Subject::new(subject)?;
    let status = state.orchestrator.baseline(&subject).await?;
    Ok(Json(BaselineResponse::from(status)))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Bind and serve until Ctrl-C
///
/// # Errors
///
/// Returns error if the address cannot be bound or the server fails
pub async fn serve(orchestrator: TestOrchestrator, config: &ServerConfig) -> CliResult<()> {
    let addr = config.socket_addr()?;
    let app = router(orchestrator, config);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| CliError::server(format!("cannot bind {addr}: {e}")))?;
    info!(%addr, base_path = %config.base_path, cors = config.cors, "visual test API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CliError::server(e.to_string()))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
