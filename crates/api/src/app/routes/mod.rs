use axum::Router;

pub mod appointments;
pub mod audit_logs;
pub mod compliance;
pub mod invoices;
pub mod jobs;
pub mod system;

/// Router for all organization-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/invoices", invoices::router())
        .nest("/appointments", appointments::router())
        .nest("/audit-logs", audit_logs::router())
        .nest("/compliance", compliance::router())
        .nest("/jobs", jobs::router())
}
