//! Axum router and service wiring.
//!
//! - `services.rs`: builds the orchestrator and its collaborators
//! - `routes/`: handlers
//! - `dto.rs`: response bodies not covered by domain types
//! - `errors.rs`: JSON error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (used by `main.rs` and the black-box tests).
pub fn build_app(services: Arc<AppServices>) -> Router {
    routes::router().layer(ServiceBuilder::new().layer(Extension(services)))
}
