use std::sync::Arc;

use axum::{
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use careledger_billing::InvoiceId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::OrganizationContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_invoice))
        .route("/:id", get(get_invoice).put(update_invoice))
        .route("/:id/send", post(send_invoice))
        .route("/:id/payment", post(mark_invoice_paid))
        .route("/:id/cancel", post(cancel_invoice))
        .route("/:id/statement", get(get_statement))
}

pub async fn create_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(org): Extension<OrganizationContext>,
    body: Result<Json<dto::CreateInvoiceRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return dto::json_rejection(rej),
    };

    match services.invoices.create(org.organization_id(), body.into()).await {
        Ok(invoice) => (StatusCode::CREATED, Json(invoice)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(org): Extension<OrganizationContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_id: InvoiceId = match errors::parse_id(&id, "invoice") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.invoices.get(org.organization_id(), invoice_id).await {
        Ok(invoice) => (StatusCode::OK, Json(invoice)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(org): Extension<OrganizationContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateInvoiceRequest>, JsonRejection>,
) -> axum::response::Response {
    let invoice_id: InvoiceId = match errors::parse_id(&id, "invoice") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return dto::json_rejection(rej),
    };

    match services
        .invoices
        .update(org.organization_id(), invoice_id, body.into())
        .await
    {
        Ok(invoice) => (StatusCode::OK, Json(invoice)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn send_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(org): Extension<OrganizationContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_id: InvoiceId = match errors::parse_id(&id, "invoice") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.invoices.send(org.organization_id(), invoice_id).await {
        Ok(invoice) => (StatusCode::OK, Json(invoice)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn mark_invoice_paid(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(org): Extension<OrganizationContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::MarkPaidRequest>, JsonRejection>,
) -> axum::response::Response {
    let invoice_id: InvoiceId = match errors::parse_id(&id, "invoice") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return dto::json_rejection(rej),
    };

    match services
        .invoices
        .mark_paid(org.organization_id(), invoice_id, body.into())
        .await
    {
        Ok(invoice) => (StatusCode::OK, Json(invoice)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn cancel_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(org): Extension<OrganizationContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_id: InvoiceId = match errors::parse_id(&id, "invoice") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.invoices.cancel(org.organization_id(), invoice_id).await {
        Ok(invoice) => (StatusCode::OK, Json(invoice)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_statement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(org): Extension<OrganizationContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_id: InvoiceId = match errors::parse_id(&id, "invoice") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.invoices.statement(org.organization_id(), invoice_id).await {
        Ok(statement) => (StatusCode::OK, Json(statement)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
