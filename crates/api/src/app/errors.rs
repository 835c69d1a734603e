use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use careledger_core::DomainError;
use careledger_infra::jobs::JobError;
use careledger_infra::services::ServiceError;

/// Map a service failure to the HTTP error contract.
///
/// | error | status |
/// |---|---|
/// | `NotFound` | 404 |
/// | `InvalidState` | 403 |
/// | `InvalidLineItem` / `Validation` / `InvalidId` | 400 |
/// | `ConcurrencyConflict` | 409 |
/// | storage failure | 500 |
pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Domain(e) => domain_error_to_response(e),
        ServiceError::Store(e) => {
            tracing::error!(error = %e, "storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let status = match &err {
        DomainError::NotFound => StatusCode::NOT_FOUND,
        DomainError::InvalidState(_) => StatusCode::FORBIDDEN,
        DomainError::InvalidLineItem(_) | DomainError::Validation(_) | DomainError::InvalidId(_) => {
            StatusCode::BAD_REQUEST
        }
        DomainError::ConcurrencyConflict(_) => StatusCode::CONFLICT,
    };
    json_error(status, err.code(), err.to_string())
}

pub fn job_error_to_response(err: JobError) -> axum::response::Response {
    json_error(StatusCode::SERVICE_UNAVAILABLE, "jobs_unavailable", err.to_string())
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

/// Parse a path id, answering 400 `invalid_id` on failure.
pub fn parse_id<T>(raw: &str, what: &str) -> Result<T, axum::response::Response>
where
    T: std::str::FromStr,
{
    raw.parse()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_contract_statuses() {
        let cases = [
            (DomainError::NotFound, StatusCode::NOT_FOUND),
            (DomainError::invalid_state("paid"), StatusCode::FORBIDDEN),
            (DomainError::invalid_line_item("qty"), StatusCode::BAD_REQUEST),
            (DomainError::validation("window"), StatusCode::BAD_REQUEST),
            (DomainError::invalid_id("x"), StatusCode::BAD_REQUEST),
            (DomainError::conflict("number"), StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(domain_error_to_response(err).status(), status);
        }
    }
}
