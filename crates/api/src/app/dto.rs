use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use careledger_billing::LineItemDraft;
use careledger_compliance::{AuditLogId, AuditLogRecord, Severity, Timeliness};
use careledger_core::{ActorId, OrganizationId, ParticipantId, StaffId};
use careledger_infra::jobs::JobId;
use careledger_infra::services::{InvoiceChanges, NewInvoice, Payment};
use careledger_scheduling::{BillingMetadata, BookAppointment};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub participant_id: ParticipantId,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
    pub line_items: Vec<LineItemDraft>,
}

impl From<CreateInvoiceRequest> for NewInvoice {
    fn from(body: CreateInvoiceRequest) -> Self {
        NewInvoice {
            participant_id: body.participant_id,
            invoice_date: body.invoice_date,
            due_date: body.due_date,
            notes: body.notes,
            line_items: body.line_items,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateInvoiceRequest {
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
    pub line_items: Vec<LineItemDraft>,
}

impl From<UpdateInvoiceRequest> for InvoiceChanges {
    fn from(body: UpdateInvoiceRequest) -> Self {
        InvoiceChanges {
            invoice_date: body.invoice_date,
            due_date: body.due_date,
            notes: body.notes,
            line_items: body.line_items,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MarkPaidRequest {
    pub payment_method: String,
    pub payment_date: NaiveDate,
    #[serde(default)]
    pub payment_reference: Option<String>,
}

impl From<MarkPaidRequest> for Payment {
    fn from(body: MarkPaidRequest) -> Self {
        Payment {
            payment_method: body.payment_method,
            payment_date: body.payment_date,
            payment_reference: body.payment_reference,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BookAppointmentRequest {
    pub participant_id: ParticipantId,
    pub staff_id: StaffId,
    pub title: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub billing: BillingMetadata,
    #[serde(default)]
    pub recurring_pattern: Option<String>,
}

impl BookAppointmentRequest {
    pub fn into_command(self, organization_id: OrganizationId) -> BookAppointment {
        BookAppointment {
            organization_id,
            participant_id: self.participant_id,
            staff_id: self.staff_id,
            title: self.title,
            location: self.location,
            notes: self.notes,
            start_time: self.start_time,
            end_time: self.end_time,
            billing: self.billing,
            recurring_pattern: self.recurring_pattern,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RecordAuditLogRequest {
    /// Defaults to the time the request is handled.
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    pub action: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub compliance_category: Option<String>,
    pub severity: Severity,
    #[serde(default)]
    pub timeliness: Option<Timeliness>,
}

impl RecordAuditLogRequest {
    pub fn into_record(
        self,
        organization_id: OrganizationId,
        actor_id: Option<ActorId>,
    ) -> AuditLogRecord {
        AuditLogRecord {
            id: AuditLogId::generate(),
            organization_id,
            actor_id,
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            action: self.action,
            details: self.details,
            compliance_category: self.compliance_category,
            severity: self.severity,
            timeliness: self.timeliness,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FlagOverdueRequest {
    /// Defaults to today (UTC).
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: JobId,
    pub kind: &'static str,
}

// -------------------------
// Extractor rejections
// -------------------------

pub fn json_rejection(rejection: JsonRejection) -> axum::response::Response {
    errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text())
}

pub fn query_rejection(rejection: QueryRejection) -> axum::response::Response {
    errors::json_error(StatusCode::BAD_REQUEST, "invalid_query", rejection.body_text())
}
