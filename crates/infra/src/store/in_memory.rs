use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDate;

use careledger_billing::{InvoiceId, InvoiceSnapshot, InvoiceStatus};
use careledger_compliance::{AuditLogRecord, ReportingWindow};
use careledger_core::{ExpectedVersion, OrganizationId, ParticipantId, StaffId};
use careledger_scheduling::{Appointment, AppointmentId};

use super::r#trait::{AppointmentStore, AuditLogStore, Directory, InvoiceStore, StoreError};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct InvoiceKey {
    organization_id: OrganizationId,
    invoice_id: InvoiceId,
}

/// Fault switches for exercising rollback paths in tests.
#[derive(Debug, Default)]
struct Faults {
    invoice_writes: AtomicBool,
    series_writes: AtomicBool,
}

/// In-memory implementation of every store trait.
///
/// Intended for tests/dev. Each write takes a single write lock, so a call is
/// all-or-nothing just like a transaction on the Postgres backend.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    invoices: RwLock<HashMap<InvoiceKey, InvoiceSnapshot>>,
    sequences: RwLock<HashMap<OrganizationId, u64>>,
    appointments: RwLock<HashMap<AppointmentId, Appointment>>,
    audit_logs: RwLock<Vec<AuditLogRecord>>,
    participants: RwLock<HashMap<(OrganizationId, ParticipantId), String>>,
    staff: RwLock<HashMap<(OrganizationId, StaffId), String>>,
    faults: Faults,
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every invoice insert/save fail before anything is written.
    pub fn fail_invoice_writes(&self, fail: bool) {
        self.faults.invoice_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every series insert/replace fail before anything is written.
    pub fn fail_series_writes(&self, fail: bool) {
        self.faults.series_writes.store(fail, Ordering::SeqCst);
    }

    pub fn register_participant(
        &self,
        organization_id: OrganizationId,
        participant_id: ParticipantId,
        display_name: impl Into<String>,
    ) -> Result<(), StoreError> {
        self.participants
            .write()
            .map_err(poisoned)?
            .insert((organization_id, participant_id), display_name.into());
        Ok(())
    }

    pub fn register_staff(
        &self,
        organization_id: OrganizationId,
        staff_id: StaffId,
        display_name: impl Into<String>,
    ) -> Result<(), StoreError> {
        self.staff
            .write()
            .map_err(poisoned)?
            .insert((organization_id, staff_id), display_name.into());
        Ok(())
    }

    /// Number of invoices stored for an organization.
    pub fn invoice_count(&self, organization_id: OrganizationId) -> Result<usize, StoreError> {
        Ok(self
            .invoices
            .read()
            .map_err(poisoned)?
            .keys()
            .filter(|k| k.organization_id == organization_id)
            .count())
    }

    fn check_fault(flag: &AtomicBool, what: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(format!("injected failure writing {what}")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl InvoiceStore for InMemoryStore {
    async fn allocate_sequence(&self, organization_id: OrganizationId) -> Result<u64, StoreError> {
        let mut sequences = self.sequences.write().map_err(poisoned)?;
        let next = sequences.entry(organization_id).or_insert(0);
        *next += 1;
        Ok(*next)
    }

    async fn insert(&self, invoice: &InvoiceSnapshot) -> Result<(), StoreError> {
        let mut invoices = self.invoices.write().map_err(poisoned)?;
        Self::check_fault(&self.faults.invoice_writes, "invoice_line_items")?;

        let key = InvoiceKey {
            organization_id: invoice.organization_id,
            invoice_id: invoice.id,
        };
        if invoices.contains_key(&key) {
            return Err(StoreError::Conflict(format!("invoice {} already exists", invoice.id)));
        }
        let number_taken = invoices.values().any(|existing| {
            existing.organization_id == invoice.organization_id
                && existing.invoice_number == invoice.invoice_number
        });
        if number_taken {
            return Err(StoreError::Conflict(format!(
                "invoice number {} already in use",
                invoice.invoice_number
            )));
        }

        invoices.insert(key, invoice.clone());
        Ok(())
    }

    async fn save(
        &self,
        invoice: &InvoiceSnapshot,
        expected: ExpectedVersion,
        _replace_lines: bool,
    ) -> Result<(), StoreError> {
        let mut invoices = self.invoices.write().map_err(poisoned)?;
        Self::check_fault(&self.faults.invoice_writes, "invoices")?;

        let key = InvoiceKey {
            organization_id: invoice.organization_id,
            invoice_id: invoice.id,
        };
        let Some(current) = invoices.get_mut(&key) else {
            return Err(StoreError::NotFound(format!("invoice {}", invoice.id)));
        };
        if !expected.matches(current.version) {
            return Err(StoreError::Conflict(format!(
                "invoice {} is at version {}, expected {expected:?}",
                invoice.id, current.version
            )));
        }

        *current = invoice.clone();
        Ok(())
    }

    async fn get(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
    ) -> Result<Option<InvoiceSnapshot>, StoreError> {
        let invoices = self.invoices.read().map_err(poisoned)?;
        Ok(invoices
            .get(&InvoiceKey {
                organization_id,
                invoice_id,
            })
            .cloned())
    }

    async fn list_past_due(
        &self,
        organization_id: OrganizationId,
        as_of: NaiveDate,
    ) -> Result<Vec<InvoiceId>, StoreError> {
        let invoices = self.invoices.read().map_err(poisoned)?;
        let mut due: Vec<&InvoiceSnapshot> = invoices
            .values()
            .filter(|i| {
                i.organization_id == organization_id
                    && i.status == InvoiceStatus::Sent
                    && i.due_date < as_of
            })
            .collect();
        due.sort_by(|a, b| {
            a.due_date
                .cmp(&b.due_date)
                .then_with(|| a.invoice_number.as_str().cmp(b.invoice_number.as_str()))
        });
        Ok(due.into_iter().map(|i| i.id).collect())
    }
}

#[async_trait::async_trait]
impl AppointmentStore for InMemoryStore {
    async fn insert(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let mut appointments = self.appointments.write().map_err(poisoned)?;
        if appointments.contains_key(&appointment.id) {
            return Err(StoreError::Conflict(format!(
                "appointment {} already exists",
                appointment.id
            )));
        }
        appointments.insert(appointment.id, appointment.clone());
        Ok(())
    }

    async fn insert_series(&self, occurrences: &[Appointment]) -> Result<(), StoreError> {
        let mut appointments = self.appointments.write().map_err(poisoned)?;
        Self::check_fault(&self.faults.series_writes, "appointment series")?;

        if let Some(dup) = occurrences.iter().find(|o| appointments.contains_key(&o.id)) {
            return Err(StoreError::Conflict(format!("appointment {} already exists", dup.id)));
        }
        for occurrence in occurrences {
            appointments.insert(occurrence.id, occurrence.clone());
        }
        Ok(())
    }

    async fn replace_series(
        &self,
        organization_id: OrganizationId,
        template_id: AppointmentId,
        occurrences: &[Appointment],
    ) -> Result<u64, StoreError> {
        let mut appointments = self.appointments.write().map_err(poisoned)?;
        Self::check_fault(&self.faults.series_writes, "appointment series")?;

        let before = appointments.len();
        appointments.retain(|_, a| {
            !(a.organization_id == organization_id && a.series_parent_id == Some(template_id))
        });
        let removed = (before - appointments.len()) as u64;

        for occurrence in occurrences {
            appointments.insert(occurrence.id, occurrence.clone());
        }
        Ok(removed)
    }

    async fn get(
        &self,
        organization_id: OrganizationId,
        appointment_id: AppointmentId,
    ) -> Result<Option<Appointment>, StoreError> {
        let appointments = self.appointments.read().map_err(poisoned)?;
        Ok(appointments
            .get(&appointment_id)
            .filter(|a| a.organization_id == organization_id)
            .cloned())
    }

    async fn list_series(
        &self,
        organization_id: OrganizationId,
        template_id: AppointmentId,
    ) -> Result<Vec<Appointment>, StoreError> {
        let appointments = self.appointments.read().map_err(poisoned)?;
        let mut series: Vec<Appointment> = appointments
            .values()
            .filter(|a| {
                a.organization_id == organization_id && a.series_parent_id == Some(template_id)
            })
            .cloned()
            .collect();
        series.sort_by_key(|a| a.start_time);
        Ok(series)
    }
}

#[async_trait::async_trait]
impl AuditLogStore for InMemoryStore {
    async fn append(&self, record: &AuditLogRecord) -> Result<(), StoreError> {
        self.audit_logs.write().map_err(poisoned)?.push(record.clone());
        Ok(())
    }

    async fn list_in_window(
        &self,
        organization_id: OrganizationId,
        window: ReportingWindow,
    ) -> Result<Vec<AuditLogRecord>, StoreError> {
        let logs = self.audit_logs.read().map_err(poisoned)?;
        let mut records: Vec<AuditLogRecord> = logs
            .iter()
            .filter(|r| r.organization_id == organization_id && window.contains(r.occurred_at))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.occurred_at);
        Ok(records)
    }
}

#[async_trait::async_trait]
impl Directory for InMemoryStore {
    async fn participant_name(
        &self,
        organization_id: OrganizationId,
        participant_id: ParticipantId,
    ) -> Result<Option<String>, StoreError> {
        let participants = self.participants.read().map_err(poisoned)?;
        Ok(participants.get(&(organization_id, participant_id)).cloned())
    }

    async fn staff_names(
        &self,
        organization_id: OrganizationId,
        staff_ids: &[StaffId],
    ) -> Result<HashMap<StaffId, String>, StoreError> {
        let staff = self.staff.read().map_err(poisoned)?;
        Ok(staff_ids
            .iter()
            .filter_map(|id| {
                staff
                    .get(&(organization_id, *id))
                    .map(|name| (*id, name.clone()))
            })
            .collect())
    }
}
