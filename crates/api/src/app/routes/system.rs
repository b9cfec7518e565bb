use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, Json};

use crate::app::{dto::QueueStatusResponse, services::AppServices};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn queue(Extension(services): Extension<Arc<AppServices>>) -> Json<QueueStatusResponse> {
    Json(QueueStatusResponse {
        queue: services.orchestrator.queue_stats(),
        running: services.orchestrator.is_running(),
    })
}
