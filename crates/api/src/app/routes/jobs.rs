use std::sync::Arc;

use axum::{
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::Utc;

use careledger_core::DomainError;
use careledger_infra::jobs::Job;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::OrganizationContext;

pub fn router() -> Router {
    Router::new()
        .route("/flag-overdue", post(enqueue_flag_overdue))
        .route("/compliance-snapshot", post(enqueue_compliance_snapshot))
}

pub async fn enqueue_flag_overdue(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(org): Extension<OrganizationContext>,
    body: Option<Json<dto::FlagOverdueRequest>>,
) -> axum::response::Response {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let as_of = body.as_of.unwrap_or_else(|| Utc::now().date_naive());

    enqueue(&services, Job::flag_overdue(org.organization_id(), as_of)).await
}

pub async fn enqueue_compliance_snapshot(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(org): Extension<OrganizationContext>,
    body: Result<Json<dto::WindowQuery>, JsonRejection>,
) -> axum::response::Response {
    let Json(window) = match body {
        Ok(b) => b,
        Err(rej) => return dto::json_rejection(rej),
    };
    // Reject inverted windows up front rather than dead-lettering them later.
    if window.start > window.end {
        return errors::domain_error_to_response(DomainError::validation(
            "window start is after window end",
        ));
    }

    enqueue(
        &services,
        Job::compliance_snapshot(org.organization_id(), window.start, window.end),
    )
    .await
}

async fn enqueue(services: &AppServices, job: Job) -> axum::response::Response {
    let kind = job.kind.type_name();
    match services.jobs.submit(job).await {
        Ok(job_id) => (StatusCode::ACCEPTED, Json(dto::JobAccepted { job_id, kind })).into_response(),
        Err(e) => errors::job_error_to_response(e),
    }
}
