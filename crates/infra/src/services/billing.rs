use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{Span, debug, info, instrument, warn};

use careledger_billing::{
    AGGREGATE_TYPE, CancelInvoice, CreateInvoice, FlagOverdue, Invoice, InvoiceCommand,
    InvoiceEvent, InvoiceId, InvoiceNumber, InvoiceSnapshot, InvoiceStatement, LineItemDraft,
    MarkPaid, SendInvoice, UpdateInvoice,
};
use careledger_core::{Aggregate, AggregateRoot, DomainError, ExpectedVersion, OrganizationId, StaffId};
use careledger_events::{Event, EventBus, EventEnvelope};

use super::ServiceError;
use crate::store::{Directory, InvoiceStore, StoreError};

/// Envelope type published for invoice lifecycle notifications.
pub type InvoiceEnvelope = EventEnvelope<InvoiceEvent>;

/// Attempts at allocating a unique invoice number before giving up.
pub const DEFAULT_NUMBER_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoice {
    pub participant_id: careledger_core::ParticipantId,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub line_items: Vec<LineItemDraft>,
}

/// Full replacement of an invoice's editable fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceChanges {
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub line_items: Vec<LineItemDraft>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_method: String,
    pub payment_date: NaiveDate,
    pub payment_reference: Option<String>,
}

/// Invoice lifecycle orchestration.
///
/// State is saved first; notifications are published afterwards and a publish
/// failure is only logged.
pub struct InvoiceService<B> {
    store: Arc<dyn InvoiceStore>,
    directory: Arc<dyn Directory>,
    bus: B,
    max_number_attempts: u32,
}

impl<B> InvoiceService<B>
where
    B: EventBus<InvoiceEnvelope>,
{
    pub fn new(store: Arc<dyn InvoiceStore>, directory: Arc<dyn Directory>, bus: B) -> Self {
        Self {
            store,
            directory,
            bus,
            max_number_attempts: DEFAULT_NUMBER_ATTEMPTS,
        }
    }

    pub fn with_max_number_attempts(mut self, attempts: u32) -> Self {
        self.max_number_attempts = attempts.max(1);
        self
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Create a draft invoice with a freshly allocated number.
    ///
    /// A number collision re-allocates and retries; once the attempts are
    /// exhausted the call fails with `ConcurrencyConflict`.
    #[instrument(
        skip(self, input),
        fields(
            organization_id = %organization_id,
            line_count = input.line_items.len(),
            invoice_number = tracing::field::Empty
        ),
        err
    )]
    pub async fn create(
        &self,
        organization_id: OrganizationId,
        input: NewInvoice,
    ) -> Result<InvoiceSnapshot, ServiceError> {
        let invoice_id = InvoiceId::generate();

        for attempt in 1..=self.max_number_attempts {
            let sequence = self.store.allocate_sequence(organization_id).await?;
            let invoice_number = InvoiceNumber::format(organization_id, sequence);

            let mut invoice = Invoice::empty(invoice_id);
            let events = invoice.execute(&InvoiceCommand::CreateInvoice(CreateInvoice {
                organization_id,
                participant_id: input.participant_id,
                invoice_id,
                invoice_number: invoice_number.clone(),
                invoice_date: input.invoice_date,
                due_date: input.due_date,
                notes: input.notes.clone(),
                line_items: input.line_items.clone(),
                occurred_at: Utc::now(),
            }))?;
            let snapshot = invoice.into_snapshot().ok_or_else(DomainError::not_found)?;

            match self.store.insert(&snapshot).await {
                Ok(()) => {
                    Span::current().record("invoice_number", invoice_number.as_str());
                    info!(
                        invoice_id = %invoice_id,
                        total = %snapshot.total,
                        "invoice created"
                    );
                    self.publish(organization_id, invoice_id, 0, &events);
                    return Ok(snapshot);
                }
                Err(StoreError::Conflict(msg)) => {
                    warn!(attempt, invoice_number = %invoice_number, %msg, "invoice number collision; retrying");
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(DomainError::conflict(format!(
            "could not allocate a unique invoice number after {} attempts",
            self.max_number_attempts
        ))
        .into())
    }

    #[instrument(skip(self, changes), fields(organization_id = %organization_id, invoice_id = %invoice_id), err)]
    pub async fn update(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
        changes: InvoiceChanges,
    ) -> Result<InvoiceSnapshot, ServiceError> {
        self.transition(
            organization_id,
            invoice_id,
            InvoiceCommand::UpdateInvoice(UpdateInvoice {
                organization_id,
                invoice_id,
                invoice_date: changes.invoice_date,
                due_date: changes.due_date,
                notes: changes.notes,
                line_items: changes.line_items,
                occurred_at: Utc::now(),
            }),
        )
        .await
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, invoice_id = %invoice_id), err)]
    pub async fn send(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
    ) -> Result<InvoiceSnapshot, ServiceError> {
        self.transition(
            organization_id,
            invoice_id,
            InvoiceCommand::SendInvoice(SendInvoice {
                organization_id,
                invoice_id,
                occurred_at: Utc::now(),
            }),
        )
        .await
    }

    #[instrument(skip(self, payment), fields(organization_id = %organization_id, invoice_id = %invoice_id), err)]
    pub async fn mark_paid(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
        payment: Payment,
    ) -> Result<InvoiceSnapshot, ServiceError> {
        self.transition(
            organization_id,
            invoice_id,
            InvoiceCommand::MarkPaid(MarkPaid {
                organization_id,
                invoice_id,
                payment_method: payment.payment_method,
                payment_date: payment.payment_date,
                payment_reference: payment.payment_reference,
                occurred_at: Utc::now(),
            }),
        )
        .await
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, invoice_id = %invoice_id), err)]
    pub async fn cancel(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
    ) -> Result<InvoiceSnapshot, ServiceError> {
        self.transition(
            organization_id,
            invoice_id,
            InvoiceCommand::CancelInvoice(CancelInvoice {
                organization_id,
                invoice_id,
                occurred_at: Utc::now(),
            }),
        )
        .await
    }

    pub async fn get(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
    ) -> Result<InvoiceSnapshot, ServiceError> {
        let snapshot = self
            .store
            .get(organization_id, invoice_id)
            .await?
            .ok_or_else(DomainError::not_found)?;
        Ok(snapshot)
    }

    /// Export view with participant and staff display names resolved.
    #[instrument(skip(self), fields(organization_id = %organization_id, invoice_id = %invoice_id), err)]
    pub async fn statement(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
    ) -> Result<InvoiceStatement, ServiceError> {
        let invoice = self.get(organization_id, invoice_id).await?;

        let participant_name = self
            .directory
            .participant_name(organization_id, invoice.participant_id)
            .await?
            .unwrap_or_else(|| invoice.participant_id.to_string());

        let mut staff_ids: Vec<StaffId> = invoice
            .line_items
            .iter()
            .filter_map(|line| line.staff_member_id)
            .collect();
        staff_ids.sort();
        staff_ids.dedup();
        let staff_names = self.directory.staff_names(organization_id, &staff_ids).await?;

        Ok(InvoiceStatement::build(&invoice, participant_name, &staff_names))
    }

    /// Move every sent invoice with `due_date < as_of` to overdue.
    ///
    /// An invoice that changed state in the meantime is skipped, not failed.
    #[instrument(skip(self), fields(organization_id = %organization_id, as_of = %as_of), err)]
    pub async fn flag_overdue(
        &self,
        organization_id: OrganizationId,
        as_of: NaiveDate,
    ) -> Result<Vec<InvoiceId>, ServiceError> {
        let candidates = self.store.list_past_due(organization_id, as_of).await?;
        let mut flagged = Vec::with_capacity(candidates.len());

        for invoice_id in candidates {
            let command = InvoiceCommand::FlagOverdue(FlagOverdue {
                organization_id,
                invoice_id,
                as_of,
                occurred_at: Utc::now(),
            });
            match self.transition(organization_id, invoice_id, command).await {
                Ok(_) => flagged.push(invoice_id),
                Err(ServiceError::Domain(
                    err @ (DomainError::InvalidState(_)
                    | DomainError::ConcurrencyConflict(_)
                    | DomainError::NotFound),
                )) => {
                    debug!(invoice_id = %invoice_id, error = %err, "skipping overdue candidate");
                }
                Err(other) => return Err(other),
            }
        }

        info!(flagged = flagged.len(), "overdue invoices flagged");
        Ok(flagged)
    }

    async fn transition(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
        command: InvoiceCommand,
    ) -> Result<InvoiceSnapshot, ServiceError> {
        let current = self.get(organization_id, invoice_id).await?;
        let mut invoice = Invoice::from_snapshot(current)?;
        let base_version = invoice.version();

        let events = invoice.execute(&command)?;
        let replace_lines = events
            .iter()
            .any(|e| matches!(e, InvoiceEvent::InvoiceUpdated(_)));
        let snapshot = invoice.into_snapshot().ok_or_else(DomainError::not_found)?;

        self.store
            .save(&snapshot, ExpectedVersion::Exact(base_version), replace_lines)
            .await?;
        info!(
            invoice_id = %invoice_id,
            status = snapshot.status.as_str(),
            version = snapshot.version,
            "invoice transition committed"
        );

        self.publish(organization_id, invoice_id, base_version, &events);
        Ok(snapshot)
    }

    fn publish(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
        base_version: u64,
        events: &[InvoiceEvent],
    ) {
        for (offset, event) in events.iter().enumerate() {
            if !event.is_notifiable() {
                continue;
            }
            let envelope = EventEnvelope::wrap(
                organization_id,
                invoice_id.0,
                AGGREGATE_TYPE,
                base_version + offset as u64 + 1,
                event.clone(),
            );
            if let Err(err) = self.bus.publish(envelope) {
                warn!(
                    invoice_id = %invoice_id,
                    event_type = event.event_type(),
                    error = ?err,
                    "notification publish failed; transition kept"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    use rust_decimal::Decimal;

    use careledger_billing::InvoiceStatus;
    use careledger_core::ParticipantId;
    use careledger_events::{InMemoryEventBus, Subscription};

    use crate::store::InMemoryStore;

    type Bus = Arc<InMemoryEventBus<InvoiceEnvelope>>;

    struct UnavailableBus;

    impl EventBus<InvoiceEnvelope> for UnavailableBus {
        type Error = &'static str;

        fn publish(&self, _message: InvoiceEnvelope) -> Result<(), Self::Error> {
            Err("broker unavailable")
        }

        fn subscribe(&self) -> Subscription<InvoiceEnvelope> {
            let (_tx, rx) = mpsc::channel();
            Subscription::new(rx)
        }
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn line(quantity: &str, unit_price: &str, gst: &str, staff: Option<StaffId>) -> LineItemDraft {
        LineItemDraft {
            support_item_number: "01_011_0107_1_1".to_string(),
            support_item_name: "Assistance With Self-Care Activities".to_string(),
            service_date: date(2025, 2, 3),
            quantity: dec(quantity),
            unit_price: dec(unit_price),
            gst_amount: dec(gst),
            claim_type: "standard".to_string(),
            funding_category: "core".to_string(),
            staff_member_id: staff,
        }
    }

    fn new_invoice(due_date: NaiveDate) -> NewInvoice {
        NewInvoice {
            participant_id: ParticipantId::new(),
            invoice_date: date(2025, 2, 14),
            due_date,
            notes: None,
            line_items: vec![
                line("2", "57.10", "11.42", None),
                line("1", "103.11", "10.31", None),
            ],
        }
    }

    fn payment() -> Payment {
        Payment {
            payment_method: "bank_transfer".to_string(),
            payment_date: date(2025, 3, 1),
            payment_reference: None,
        }
    }

    fn service() -> (Arc<InMemoryStore>, InvoiceService<Bus>) {
        let store = Arc::new(InMemoryStore::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let service = InvoiceService::new(store.clone(), store.clone(), bus);
        (store, service)
    }

    fn expect_domain(err: ServiceError) -> DomainError {
        match err {
            ServiceError::Domain(e) => e,
            other => panic!("expected domain error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_assigns_sequential_numbers_and_totals() {
        let (_store, service) = service();
        let org = OrganizationId::new();

        let first = service.create(org, new_invoice(date(2025, 3, 14))).await.unwrap();
        let second = service.create(org, new_invoice(date(2025, 3, 14))).await.unwrap();

        assert_eq!(first.invoice_number, InvoiceNumber::format(org, 1));
        assert_eq!(second.invoice_number, InvoiceNumber::format(org, 2));
        assert_eq!(first.status, InvoiceStatus::Draft);
        assert_eq!(first.subtotal, dec("217.31"));
        assert_eq!(first.gst, dec("21.73"));
        assert_eq!(first.total, dec("239.04"));
    }

    #[tokio::test]
    async fn create_retries_after_number_collision() {
        let (store, service) = service();
        let org = OrganizationId::new();

        // A row already holding sequence 1 that the counter does not know about.
        let mut squatter = service.create(OrganizationId::new(), new_invoice(date(2025, 3, 14))).await.unwrap();
        squatter.id = InvoiceId::generate();
        squatter.organization_id = org;
        squatter.invoice_number = InvoiceNumber::format(org, 1);
        InvoiceStore::insert(store.as_ref(), &squatter).await.unwrap();

        let created = service.create(org, new_invoice(date(2025, 3, 14))).await.unwrap();
        assert_eq!(created.invoice_number, InvoiceNumber::format(org, 2));
        assert_eq!(store.invoice_count(org).unwrap(), 2);
    }

    #[tokio::test]
    async fn create_gives_up_after_bounded_attempts() {
        let store = Arc::new(InMemoryStore::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let service =
            InvoiceService::new(store.clone(), store.clone(), bus).with_max_number_attempts(2);
        let org = OrganizationId::new();

        let template = service.create(OrganizationId::new(), new_invoice(date(2025, 3, 14))).await.unwrap();
        for seq in 1..=2 {
            let mut squatter = template.clone();
            squatter.id = InvoiceId::generate();
            squatter.organization_id = org;
            squatter.invoice_number = InvoiceNumber::format(org, seq);
            InvoiceStore::insert(store.as_ref(), &squatter).await.unwrap();
        }

        let err = service.create(org, new_invoice(date(2025, 3, 14))).await.unwrap_err();
        assert!(matches!(expect_domain(err), DomainError::ConcurrencyConflict(_)));
    }

    #[tokio::test]
    async fn failed_atomic_write_leaves_nothing_visible() {
        let (store, service) = service();
        let org = OrganizationId::new();
        store.fail_invoice_writes(true);

        let err = service.create(org, new_invoice(date(2025, 3, 14))).await.unwrap_err();
        assert!(matches!(err, ServiceError::Store(_)));
        assert_eq!(store.invoice_count(org).unwrap(), 0);
    }

    #[tokio::test]
    async fn invalid_line_item_is_rejected() {
        let (store, service) = service();
        let org = OrganizationId::new();
        let mut input = new_invoice(date(2025, 3, 14));
        input.line_items.push(line("0", "10", "0", None));

        let err = service.create(org, input).await.unwrap_err();
        assert!(matches!(expect_domain(err), DomainError::InvalidLineItem(_)));
        assert_eq!(store.invoice_count(org).unwrap(), 0);
    }

    #[tokio::test]
    async fn lifecycle_publishes_after_commit() {
        let (_store, service) = service();
        let org = OrganizationId::new();
        let subscription = service.bus().subscribe();

        let invoice = service.create(org, new_invoice(date(2025, 3, 14))).await.unwrap();
        let updated = service
            .update(
                org,
                invoice.id,
                InvoiceChanges {
                    invoice_date: date(2025, 2, 14),
                    due_date: date(2025, 3, 14),
                    notes: Some("February services".to_string()),
                    line_items: vec![line("3", "10.00", "3.00", None)],
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.total, dec("33.00"));
        assert_eq!(updated.line_items.len(), 1);

        service.send(org, invoice.id).await.unwrap();
        let paid = service.mark_paid(org, invoice.id, payment()).await.unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert_eq!(paid.version, 4);

        let sent = subscription.try_recv().unwrap();
        assert_eq!(sent.event_type(), "billing.invoice.sent");
        assert_eq!(sent.sequence_number(), 3);
        let paid_env = subscription.try_recv().unwrap();
        assert_eq!(paid_env.event_type(), "billing.invoice.paid");
        assert_eq!(paid_env.sequence_number(), 4);
        assert!(subscription.try_recv().is_err());
    }

    #[tokio::test]
    async fn mark_paid_twice_is_invalid_state() {
        let (_store, service) = service();
        let org = OrganizationId::new();
        let invoice = service.create(org, new_invoice(date(2025, 3, 14))).await.unwrap();

        service.mark_paid(org, invoice.id, payment()).await.unwrap();
        let err = service.mark_paid(org, invoice.id, payment()).await.unwrap_err();
        assert!(matches!(expect_domain(err), DomainError::InvalidState(_)));

        let err = service.cancel(org, invoice.id).await.unwrap_err();
        assert!(matches!(expect_domain(err), DomainError::InvalidState(_)));
    }

    #[tokio::test]
    async fn publish_failure_does_not_roll_back() {
        let store = Arc::new(InMemoryStore::new());
        let service = InvoiceService::new(store.clone(), store.clone(), UnavailableBus);
        let org = OrganizationId::new();

        let invoice = service.create(org, new_invoice(date(2025, 3, 14))).await.unwrap();
        let sent = service.send(org, invoice.id).await.unwrap();
        assert_eq!(sent.status, InvoiceStatus::Sent);

        let stored = service.get(org, invoice.id).await.unwrap();
        assert_eq!(stored.status, InvoiceStatus::Sent);
        assert!(stored.sent_date.is_some());
    }

    #[tokio::test]
    async fn other_organization_gets_not_found() {
        let (_store, service) = service();
        let org = OrganizationId::new();
        let invoice = service.create(org, new_invoice(date(2025, 3, 14))).await.unwrap();

        let err = service.send(OrganizationId::new(), invoice.id).await.unwrap_err();
        assert_eq!(expect_domain(err), DomainError::NotFound);
    }

    #[tokio::test]
    async fn flag_overdue_only_touches_sent_past_due() {
        let (_store, service) = service();
        let org = OrganizationId::new();
        let subscription = service.bus().subscribe();

        let past_due = service.create(org, new_invoice(date(2025, 3, 1))).await.unwrap();
        let not_due = service.create(org, new_invoice(date(2025, 4, 30))).await.unwrap();
        let draft = service.create(org, new_invoice(date(2025, 3, 1))).await.unwrap();
        service.send(org, past_due.id).await.unwrap();
        service.send(org, not_due.id).await.unwrap();

        let flagged = service.flag_overdue(org, date(2025, 3, 15)).await.unwrap();
        assert_eq!(flagged, vec![past_due.id]);

        assert_eq!(service.get(org, past_due.id).await.unwrap().status, InvoiceStatus::Overdue);
        assert_eq!(service.get(org, not_due.id).await.unwrap().status, InvoiceStatus::Sent);
        assert_eq!(service.get(org, draft.id).await.unwrap().status, InvoiceStatus::Draft);

        let types: Vec<String> = std::iter::from_fn(|| subscription.try_recv().ok())
            .map(|e| e.event_type().to_string())
            .collect();
        assert_eq!(
            types,
            vec!["billing.invoice.sent", "billing.invoice.sent", "billing.invoice.overdue"]
        );
    }

    #[tokio::test]
    async fn statement_resolves_display_names() {
        let (store, service) = service();
        let org = OrganizationId::new();
        let staff = StaffId::new();
        let mut input = new_invoice(date(2025, 3, 14));
        input.line_items = vec![line("1", "67.56", "0", Some(staff))];
        store
            .register_participant(org, input.participant_id, "Alex Chen")
            .unwrap();
        store.register_staff(org, staff, "Jordan Lee").unwrap();

        let invoice = service.create(org, input).await.unwrap();
        let statement = service.statement(org, invoice.id).await.unwrap();

        assert_eq!(statement.participant_name, "Alex Chen");
        assert_eq!(statement.lines[0].staff_name.as_deref(), Some("Jordan Lee"));
        assert_eq!(statement.total, dec("67.56"));
    }
}
