use axum::{
    routing::{get, post},
    Router,
};

pub mod runs;
pub mod system;

pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/queue", get(system::queue))
        .route("/runs", post(runs::trigger))
}
