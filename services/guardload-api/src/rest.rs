use crate::{
    handlers::{
        delete_history, dry_run, get_history, get_status, list_history, start_test, stop_test,
    },
    state::AppState,
};
use axum::{
    extract::Request,
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{classify::ServerErrorsFailureClass, trace::TraceLayer};
use tracing::{info_span, Span};
use uuid::Uuid;

/// Route prefix for the performance test API.
pub const API_PREFIX: &str = "/api/v1/performance";

/// Builds the Axum router hosting the REST facade.
pub fn build_router(state: AppState) -> Router {
    let performance = Router::new()
        .route("/dry-run", post(dry_run))
        .route("/start", post(start_test))
        .route("/stop", post(stop_test))
        .route("/status", get(get_status))
        .route("/history", get(list_history))
        .route("/history/:test_id", get(get_history).delete(delete_history));

    Router::new()
        .route("/health", get(health_check))
        .nest(API_PREFIX, performance)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request| {
                    let request_id = Uuid::new_v4();
                    info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_request(|_request: &Request, _span: &Span| {
                    tracing::debug!("started processing request");
                })
                .on_response(|response: &Response, latency: std::time::Duration, _span: &Span| {
                    let status = response.status();
                    let latency_ms = latency.as_millis();

                    if status.is_server_error() {
                        tracing::error!(status = %status, latency_ms = latency_ms, "request failed with server error");
                    } else if status.is_client_error() {
                        tracing::warn!(status = %status, latency_ms = latency_ms, "request failed with client error");
                    } else {
                        tracing::debug!(status = %status, latency_ms = latency_ms, "request completed");
                    }
                })
                .on_failure(|failure_class: ServerErrorsFailureClass, latency: std::time::Duration, _span: &Span| {
                    tracing::error!(failure_class = ?failure_class, latency_ms = latency.as_millis(), "request failed");
                }),
        )
}

async fn health_check() -> &'static str {
    "ok"
}
