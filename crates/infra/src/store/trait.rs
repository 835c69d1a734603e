use std::collections::HashMap;

use chrono::NaiveDate;
use thiserror::Error;

use careledger_billing::{InvoiceId, InvoiceSnapshot};
use careledger_compliance::{AuditLogRecord, ReportingWindow};
use careledger_core::{ExpectedVersion, OrganizationId, ParticipantId, StaffId};
use careledger_scheduling::{Appointment, AppointmentId};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Uniqueness, serialization or optimistic-version collision.
    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("row not found: {0}")]
    NotFound(String),

    /// A persisted row could not be mapped back into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Organization-scoped invoice persistence.
///
/// Every read filters on `organization_id`; an invoice of another organization
/// is indistinguishable from a missing one.
#[async_trait::async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Atomically bump and return the organization's invoice counter (1-based).
    async fn allocate_sequence(&self, organization_id: OrganizationId) -> Result<u64, StoreError>;

    /// Persist a new invoice (header + line items) as one unit.
    ///
    /// A duplicate `(organization_id, invoice_number)` yields `StoreError::Conflict`.
    async fn insert(&self, invoice: &InvoiceSnapshot) -> Result<(), StoreError>;

    /// Overwrite an existing invoice if its stored version matches `expected`.
    ///
    /// With `replace_lines` the stored line items are deleted and re-inserted in
    /// the same transaction.
    async fn save(
        &self,
        invoice: &InvoiceSnapshot,
        expected: ExpectedVersion,
        replace_lines: bool,
    ) -> Result<(), StoreError>;

    async fn get(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
    ) -> Result<Option<InvoiceSnapshot>, StoreError>;

    /// Sent invoices whose due date lies strictly before `as_of`.
    async fn list_past_due(
        &self,
        organization_id: OrganizationId,
        as_of: NaiveDate,
    ) -> Result<Vec<InvoiceId>, StoreError>;
}

#[async_trait::async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn insert(&self, appointment: &Appointment) -> Result<(), StoreError>;

    /// Bulk insert of generated occurrences: all rows or none.
    async fn insert_series(&self, occurrences: &[Appointment]) -> Result<(), StoreError>;

    /// Delete the template's generated occurrences and insert `occurrences`,
    /// atomically. Returns the number of rows removed.
    async fn replace_series(
        &self,
        organization_id: OrganizationId,
        template_id: AppointmentId,
        occurrences: &[Appointment],
    ) -> Result<u64, StoreError>;

    async fn get(
        &self,
        organization_id: OrganizationId,
        appointment_id: AppointmentId,
    ) -> Result<Option<Appointment>, StoreError>;

    /// Generated occurrences of a template, ordered by start time.
    async fn list_series(
        &self,
        organization_id: OrganizationId,
        template_id: AppointmentId,
    ) -> Result<Vec<Appointment>, StoreError>;
}

#[async_trait::async_trait]
pub trait AuditLogStore: Send + Sync {
    async fn append(&self, record: &AuditLogRecord) -> Result<(), StoreError>;

    /// Records with `window.start() <= occurred_at <= window.end()`.
    async fn list_in_window(
        &self,
        organization_id: OrganizationId,
        window: ReportingWindow,
    ) -> Result<Vec<AuditLogRecord>, StoreError>;
}

/// Display-name lookup for participants and staff.
#[async_trait::async_trait]
pub trait Directory: Send + Sync {
    async fn participant_name(
        &self,
        organization_id: OrganizationId,
        participant_id: ParticipantId,
    ) -> Result<Option<String>, StoreError>;

    /// Names for the given staff ids; unknown ids are simply absent.
    async fn staff_names(
        &self,
        organization_id: OrganizationId,
        staff_ids: &[StaffId],
    ) -> Result<HashMap<StaffId, String>, StoreError>;
}
