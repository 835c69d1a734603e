//! Identity extraction.
//!
//! Authentication happens upstream; the gateway forwards the organization and
//! actor as headers and this layer turns them into request extensions.

use axum::{http::HeaderMap, middleware::Next, response::Response};
use axum::http::StatusCode;

use careledger_core::{ActorId, OrganizationId};

use crate::app::errors;
use crate::context::{ActorContext, OrganizationContext};

pub const ORGANIZATION_HEADER: &str = "x-organization-id";
pub const ACTOR_HEADER: &str = "x-actor-id";

pub async fn identity_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let organization_id = match extract_organization(req.headers()) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let actor_id = match extract_actor(req.headers()) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    req.extensions_mut()
        .insert(OrganizationContext::new(organization_id));
    req.extensions_mut().insert(ActorContext::new(actor_id));

    next.run(req).await
}

fn extract_organization(headers: &HeaderMap) -> Result<OrganizationId, Response> {
    let Some(value) = headers.get(ORGANIZATION_HEADER) else {
        return Err(errors::json_error(
            StatusCode::UNAUTHORIZED,
            "missing_organization",
            "x-organization-id header is required",
        ));
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| {
            errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid x-organization-id")
        })
}

fn extract_actor(headers: &HeaderMap) -> Result<Option<ActorId>, Response> {
    let Some(value) = headers.get(ACTOR_HEADER) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .map(Some)
        .ok_or_else(|| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid x-actor-id"))
}
