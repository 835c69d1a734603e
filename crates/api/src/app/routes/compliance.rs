use std::sync::Arc;

use axum::{
    extract::{Extension, Query, rejection::QueryRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::OrganizationContext;

pub fn router() -> Router {
    Router::new().route("/metrics", get(compute_metrics))
}

pub async fn compute_metrics(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(org): Extension<OrganizationContext>,
    query: Result<Query<dto::WindowQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(window) = match query {
        Ok(q) => q,
        Err(rej) => return dto::query_rejection(rej),
    };

    match services
        .compliance
        .compute_metrics(org.organization_id(), window.start, window.end)
        .await
    {
        Ok(metrics) => (StatusCode::OK, Json(metrics)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
