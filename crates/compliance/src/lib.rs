//! `careledger-compliance`: audit-log classification and compliance metrics.

pub mod audit;
pub mod classifier;
pub mod metrics;

pub use audit::{AuditLogId, AuditLogRecord, Severity, Timeliness};
pub use classifier::{Classification, ComplianceCategory, CredentialState, classify};
pub use metrics::{
    CategoryMetrics, ComplianceMetrics, ReportingWindow, SeverityBreakdown, aggregate,
    compliance_rate, weighted_score,
};
