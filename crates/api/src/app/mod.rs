//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: stores, event bus, application services and the job runner
//! - `routes/`: HTTP routes + handlers (one file per domain area)
//! - `dto.rs`: request/response DTOs and extractor rejections
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router around already-wired services.
pub fn build_app(services: Arc<AppServices>) -> Router {
    // Organization-scoped routes: require the identity headers.
    let scoped = routes::router().layer(axum::middleware::from_fn(
        middleware::identity_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(scoped)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
