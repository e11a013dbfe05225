//! Performance test handlers

use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use guardload_core::{CoreError, HistoryMeta, TargetConfig, TestHistoryRecord, TestId, TestRequest, TestType};
use guardload_service::{DryRunResult, StatusSnapshot};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// Optional header naming the caller; recorded in run metadata and audit logs.
pub const OPERATOR_HEADER: &str = "x-operator";

/// Response for a started test
#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub message: String,
    pub test_type: TestType,
    pub test_id: TestId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Send one request to the target and report the result
#[tracing::instrument(skip(state, body))]
pub async fn dry_run(
    State(state): State<AppState>,
    body: Result<Json<TargetConfig>, JsonRejection>,
) -> Result<Json<DryRunResult>, ApiError> {
    let Json(target) = body?;
    debug!(app_id = %target.app_id, "dry run requested");

    let result = state.runner.dry_run(&target).await?;
    Ok(Json(result))
}

/// Validate a test request and launch it in the background
#[tracing::instrument(skip(state, headers, body))]
pub async fn start_test(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<TestRequest>, JsonRejection>,
) -> Result<Json<StartResponse>, ApiError> {
    let Json(request) = body?;
    let test_type = request.test_type;
    let operator = operator(&headers);

    let plan = request.into_plan()?;
    let app_id = plan.target.app_id.clone();
    let test_id = state.runner.launch(plan, operator.clone())?;

    info!(
        target: "audit",
        action = "start",
        %test_id,
        %test_type,
        %app_id,
        operator = operator.as_deref().unwrap_or("-"),
        "test started"
    );

    Ok(Json(StartResponse {
        message: "Test started".to_string(),
        test_type,
        test_id,
    }))
}

/// Signal the active test to stop
#[tracing::instrument(skip(state, headers))]
pub async fn stop_test(State(state): State<AppState>, headers: HeaderMap) -> Json<MessageResponse> {
    if !state.runner.stop() {
        return MessageResponse::new("No test is running");
    }

    info!(
        target: "audit",
        action = "stop",
        operator = operator(&headers).as_deref().unwrap_or("-"),
        "stop requested"
    );
    MessageResponse::new("Stop signal sent")
}

#[tracing::instrument(skip(state))]
pub async fn get_status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.runner.get_status())
}

#[tracing::instrument(skip(state))]
pub async fn list_history(State(state): State<AppState>) -> Result<Json<Vec<HistoryMeta>>, ApiError> {
    Ok(Json(state.runner.get_history_list().await?))
}

#[tracing::instrument(skip(state))]
pub async fn get_history(
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<Json<TestHistoryRecord>, ApiError> {
    let test_id = parse_test_id(&test_id)?;
    Ok(Json(state.runner.get_history_detail(test_id).await?))
}

#[tracing::instrument(skip(state, headers))]
pub async fn delete_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(test_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let test_id = parse_test_id(&test_id)?;
    state.runner.delete_history(test_id).await?;

    info!(
        target: "audit",
        action = "delete_history",
        %test_id,
        operator = operator(&headers).as_deref().unwrap_or("-"),
        "history deleted"
    );
    Ok(MessageResponse::new("History deleted"))
}

fn operator(headers: &HeaderMap) -> Option<String> {
    headers
        .get(OPERATOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Anything that is not a test id cannot name a stored record.
fn parse_test_id(raw: &str) -> Result<TestId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::NotFound(format!("test history `{}` was not found", raw)))
}

/// API error types
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    NotFound(String),
    Internal(CoreError),
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => ApiError::Validation(msg),
            CoreError::AlreadyRunning => ApiError::Validation(err.to_string()),
            CoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            other => ApiError::Internal(other),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(err) => {
                error!("Internal error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Internal error: {}", err))
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
