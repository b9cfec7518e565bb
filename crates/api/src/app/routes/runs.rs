use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

use crate::app::{errors, services::AppServices};

/// Run once and answer with the outcome. Overlapping or weekend runs are
/// still a 200 with `{"skipped": true, "reason": ...}`.
pub async fn trigger(Extension(services): Extension<Arc<AppServices>>) -> Response {
    info!("run requested over http");
    match services.orchestrator.run_once().await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => errors::run_error_to_response(err),
    }
}
