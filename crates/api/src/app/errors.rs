use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use remindr_infra::jobs::QueueError;
use remindr_infra::RunError;

pub fn run_error_to_response(err: RunError) -> axum::response::Response {
    match err {
        RunError::Queue(QueueError::Closed) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "queue_closed",
            err.to_string(),
        ),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
