use std::sync::Arc;

use axum::{
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::{ActorContext, OrganizationContext};

pub fn router() -> Router {
    Router::new().route("/", post(record_audit_log))
}

pub async fn record_audit_log(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(org): Extension<OrganizationContext>,
    Extension(actor): Extension<ActorContext>,
    body: Result<Json<dto::RecordAuditLogRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return dto::json_rejection(rej),
    };

    let record = body.into_record(org.organization_id(), actor.actor_id());
    match services.compliance.record(record).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
