use std::sync::Arc;

use axum::{
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use careledger_scheduling::AppointmentId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::OrganizationContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(book_appointment))
        .route("/:id", get(get_appointment))
        .route("/:id/series", get(list_series).post(regenerate_series))
}

pub async fn book_appointment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(org): Extension<OrganizationContext>,
    body: Result<Json<dto::BookAppointmentRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return dto::json_rejection(rej),
    };

    match services
        .scheduling
        .book(body.into_command(org.organization_id()))
        .await
    {
        Ok(result) => (StatusCode::CREATED, Json(result)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_appointment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(org): Extension<OrganizationContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let appointment_id: AppointmentId = match errors::parse_id(&id, "appointment") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.scheduling.get(org.organization_id(), appointment_id).await {
        Ok(appointment) => (StatusCode::OK, Json(appointment)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_series(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(org): Extension<OrganizationContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let template_id: AppointmentId = match errors::parse_id(&id, "appointment") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.scheduling.series(org.organization_id(), template_id).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn regenerate_series(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(org): Extension<OrganizationContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let template_id: AppointmentId = match errors::parse_id(&id, "appointment") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services
        .scheduling
        .regenerate_series(org.organization_id(), template_id)
        .await
    {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
