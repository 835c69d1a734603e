use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use careledger_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, OrganizationId, ParticipantId,
};
use careledger_events::Event;

use crate::ledger::{self, LedgerTotals};
use crate::line_item::{InvoiceLineItem, LineItemDraft};
use crate::numbering::InvoiceNumber;

/// Aggregate type name used on event envelopes.
pub const AGGREGATE_TYPE: &str = "billing.invoice";

/// Invoice identifier (organization-scoped via `organization_id` on commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for InvoiceId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Invoice status lifecycle.
///
/// ```text
/// draft ──send──► sent ──flag──► overdue
///   │               │               │
///   ├──pay──► paid ◄┴───────pay─────┤
///   └──cancel──► cancelled ◄─cancel─┘ (also from sent)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    /// No further transition is possible from a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Cancelled)
    }

    /// Financial fields (dates, line items, totals) may only change in draft.
    pub fn allows_financial_edits(&self) -> bool {
        matches!(self, InvoiceStatus::Draft)
    }
}

impl core::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for InvoiceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(InvoiceStatus::Draft),
            "sent" => Ok(InvoiceStatus::Sent),
            "paid" => Ok(InvoiceStatus::Paid),
            "overdue" => Ok(InvoiceStatus::Overdue),
            "cancelled" => Ok(InvoiceStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown invoice status '{other}'"))),
        }
    }
}

/// Full persisted/exported shape of an invoice (header + line items).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSnapshot {
    pub id: InvoiceId,
    pub invoice_number: InvoiceNumber,
    pub organization_id: OrganizationId,
    pub participant_id: ParticipantId,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
    pub subtotal: Decimal,
    pub gst: Decimal,
    pub total: Decimal,
    pub notes: Option<String>,
    pub payment_method: Option<String>,
    pub payment_date: Option<NaiveDate>,
    pub payment_reference: Option<String>,
    pub sent_date: Option<DateTime<Utc>>,
    pub cancelled_date: Option<DateTime<Utc>>,
    pub line_items: Vec<InvoiceLineItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl InvoiceSnapshot {
    pub fn totals(&self) -> LedgerTotals {
        LedgerTotals {
            subtotal: self.subtotal,
            gst: self.gst,
            total: self.total,
        }
    }

    fn set_totals(&mut self, totals: LedgerTotals) {
        self.subtotal = totals.subtotal;
        self.gst = totals.gst;
        self.total = totals.total;
    }
}

/// Aggregate root: Invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    id: InvoiceId,
    state: Option<InvoiceSnapshot>,
    version: u64,
}

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            state: None,
            version: 0,
        }
    }

    /// Rebuild the aggregate from persisted state.
    ///
    /// Rejects a snapshot whose stored totals cannot be re-derived from its
    /// line items.
    pub fn from_snapshot(snapshot: InvoiceSnapshot) -> Result<Self, DomainError> {
        let derived = ledger::totals_from_lines(&snapshot.line_items)?;
        if derived != snapshot.totals() {
            return Err(DomainError::validation(format!(
                "invoice {} totals do not match its line items",
                snapshot.invoice_number
            )));
        }
        Ok(Self {
            id: snapshot.id,
            version: snapshot.version,
            state: Some(snapshot),
        })
    }

    pub fn snapshot(&self) -> Option<&InvoiceSnapshot> {
        self.state.as_ref()
    }

    pub fn into_snapshot(self) -> Option<InvoiceSnapshot> {
        self.state
    }

    pub fn status(&self) -> Option<InvoiceStatus> {
        self.state.as_ref().map(|s| s.status)
    }

    pub fn organization_id(&self) -> Option<OrganizationId> {
        self.state.as_ref().map(|s| s.organization_id)
    }

    pub fn totals(&self) -> LedgerTotals {
        self.state
            .as_ref()
            .map(InvoiceSnapshot::totals)
            .unwrap_or_default()
    }

    pub fn line_items(&self) -> &[InvoiceLineItem] {
        self.state
            .as_ref()
            .map(|s| s.line_items.as_slice())
            .unwrap_or(&[])
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateInvoice.
///
/// The invoice number is allocated by the caller (store sequence) before the
/// command is handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInvoice {
    pub organization_id: OrganizationId,
    pub participant_id: ParticipantId,
    pub invoice_id: InvoiceId,
    pub invoice_number: InvoiceNumber,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub line_items: Vec<LineItemDraft>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateInvoice (full replace of line items).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInvoice {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub line_items: Vec<LineItemDraft>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SendInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendInvoice {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkPaid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPaid {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub payment_method: String,
    pub payment_date: NaiveDate,
    pub payment_reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelInvoice {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: FlagOverdue (scheduled, per invoice).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagOverdue {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub as_of: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    CreateInvoice(CreateInvoice),
    UpdateInvoice(UpdateInvoice),
    SendInvoice(SendInvoice),
    MarkPaid(MarkPaid),
    CancelInvoice(CancelInvoice),
    FlagOverdue(FlagOverdue),
}

/// Event: InvoiceCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCreated {
    pub organization_id: OrganizationId,
    pub participant_id: ParticipantId,
    pub invoice_id: InvoiceId,
    pub invoice_number: InvoiceNumber,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub line_items: Vec<InvoiceLineItem>,
    pub totals: LedgerTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceUpdated (line items replaced, totals recomputed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceUpdated {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub line_items: Vec<InvoiceLineItem>,
    pub totals: LedgerTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceSent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSent {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub invoice_number: InvoiceNumber,
    pub total: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoicePaid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePaid {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub invoice_number: InvoiceNumber,
    pub previous_status: InvoiceStatus,
    pub payment_method: String,
    pub payment_date: NaiveDate,
    pub payment_reference: Option<String>,
    pub total: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCancelled {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub invoice_number: InvoiceNumber,
    pub previous_status: InvoiceStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceMarkedOverdue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceMarkedOverdue {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub invoice_number: InvoiceNumber,
    pub due_date: NaiveDate,
    pub as_of: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceCreated(InvoiceCreated),
    InvoiceUpdated(InvoiceUpdated),
    InvoiceSent(InvoiceSent),
    InvoicePaid(InvoicePaid),
    InvoiceCancelled(InvoiceCancelled),
    InvoiceMarkedOverdue(InvoiceMarkedOverdue),
}

impl InvoiceEvent {
    pub fn invoice_id(&self) -> InvoiceId {
        match self {
            InvoiceEvent::InvoiceCreated(e) => e.invoice_id,
            InvoiceEvent::InvoiceUpdated(e) => e.invoice_id,
            InvoiceEvent::InvoiceSent(e) => e.invoice_id,
            InvoiceEvent::InvoicePaid(e) => e.invoice_id,
            InvoiceEvent::InvoiceCancelled(e) => e.invoice_id,
            InvoiceEvent::InvoiceMarkedOverdue(e) => e.invoice_id,
        }
    }

    pub fn organization_id(&self) -> OrganizationId {
        match self {
            InvoiceEvent::InvoiceCreated(e) => e.organization_id,
            InvoiceEvent::InvoiceUpdated(e) => e.organization_id,
            InvoiceEvent::InvoiceSent(e) => e.organization_id,
            InvoiceEvent::InvoicePaid(e) => e.organization_id,
            InvoiceEvent::InvoiceCancelled(e) => e.organization_id,
            InvoiceEvent::InvoiceMarkedOverdue(e) => e.organization_id,
        }
    }

    /// Whether notification collaborators care about this transition.
    pub fn is_notifiable(&self) -> bool {
        !matches!(
            self,
            InvoiceEvent::InvoiceCreated(_) | InvoiceEvent::InvoiceUpdated(_)
        )
    }
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceCreated(_) => "billing.invoice.created",
            InvoiceEvent::InvoiceUpdated(_) => "billing.invoice.updated",
            InvoiceEvent::InvoiceSent(_) => "billing.invoice.sent",
            InvoiceEvent::InvoicePaid(_) => "billing.invoice.paid",
            InvoiceEvent::InvoiceCancelled(_) => "billing.invoice.cancelled",
            InvoiceEvent::InvoiceMarkedOverdue(_) => "billing.invoice.overdue",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceCreated(e) => e.occurred_at,
            InvoiceEvent::InvoiceUpdated(e) => e.occurred_at,
            InvoiceEvent::InvoiceSent(e) => e.occurred_at,
            InvoiceEvent::InvoicePaid(e) => e.occurred_at,
            InvoiceEvent::InvoiceCancelled(e) => e.occurred_at,
            InvoiceEvent::InvoiceMarkedOverdue(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceCreated(e) => {
                self.id = e.invoice_id;
                self.state = Some(InvoiceSnapshot {
                    id: e.invoice_id,
                    invoice_number: e.invoice_number.clone(),
                    organization_id: e.organization_id,
                    participant_id: e.participant_id,
                    invoice_date: e.invoice_date,
                    due_date: e.due_date,
                    status: InvoiceStatus::Draft,
                    subtotal: e.totals.subtotal,
                    gst: e.totals.gst,
                    total: e.totals.total,
                    notes: e.notes.clone(),
                    payment_method: None,
                    payment_date: None,
                    payment_reference: None,
                    sent_date: None,
                    cancelled_date: None,
                    line_items: e.line_items.clone(),
                    created_at: e.occurred_at,
                    updated_at: e.occurred_at,
                    version: 0,
                });
            }
            InvoiceEvent::InvoiceUpdated(e) => {
                if let Some(s) = self.state.as_mut() {
                    s.invoice_date = e.invoice_date;
                    s.due_date = e.due_date;
                    s.notes = e.notes.clone();
                    s.line_items = e.line_items.clone();
                    s.set_totals(e.totals);
                    s.updated_at = e.occurred_at;
                }
            }
            InvoiceEvent::InvoiceSent(e) => {
                if let Some(s) = self.state.as_mut() {
                    s.status = InvoiceStatus::Sent;
                    s.sent_date = Some(e.occurred_at);
                    s.updated_at = e.occurred_at;
                }
            }
            InvoiceEvent::InvoicePaid(e) => {
                if let Some(s) = self.state.as_mut() {
                    s.status = InvoiceStatus::Paid;
                    s.payment_method = Some(e.payment_method.clone());
                    s.payment_date = Some(e.payment_date);
                    s.payment_reference = e.payment_reference.clone();
                    s.updated_at = e.occurred_at;
                }
            }
            InvoiceEvent::InvoiceCancelled(e) => {
                if let Some(s) = self.state.as_mut() {
                    s.status = InvoiceStatus::Cancelled;
                    s.cancelled_date = Some(e.occurred_at);
                    s.updated_at = e.occurred_at;
                }
            }
            InvoiceEvent::InvoiceMarkedOverdue(e) => {
                if let Some(s) = self.state.as_mut() {
                    s.status = InvoiceStatus::Overdue;
                    s.updated_at = e.occurred_at;
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
        if let Some(s) = self.state.as_mut() {
            s.version = self.version;
        }
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::CreateInvoice(cmd) => self.handle_create(cmd),
            InvoiceCommand::UpdateInvoice(cmd) => self.handle_update(cmd),
            InvoiceCommand::SendInvoice(cmd) => self.handle_send(cmd),
            InvoiceCommand::MarkPaid(cmd) => self.handle_mark_paid(cmd),
            InvoiceCommand::CancelInvoice(cmd) => self.handle_cancel(cmd),
            InvoiceCommand::FlagOverdue(cmd) => self.handle_flag_overdue(cmd),
        }
    }
}

impl Invoice {
    /// Current state, visible only to the owning organization.
    fn owned_by(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
    ) -> Result<&InvoiceSnapshot, DomainError> {
        let state = self.state.as_ref().ok_or_else(DomainError::not_found)?;
        if state.organization_id != organization_id {
            return Err(DomainError::not_found());
        }
        if self.id != invoice_id {
            return Err(DomainError::validation("invoice_id mismatch"));
        }
        Ok(state)
    }

    fn ensure_dates(invoice_date: NaiveDate, due_date: NaiveDate) -> Result<(), DomainError> {
        if due_date < invoice_date {
            return Err(DomainError::validation(format!(
                "due_date {due_date} is before invoice_date {invoice_date}"
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.state.is_some() {
            return Err(DomainError::conflict("invoice already exists"));
        }
        Self::ensure_dates(cmd.invoice_date, cmd.due_date)?;
        let (line_items, totals) = ledger::price_line_items(&cmd.line_items)?;

        Ok(vec![InvoiceEvent::InvoiceCreated(InvoiceCreated {
            organization_id: cmd.organization_id,
            participant_id: cmd.participant_id,
            invoice_id: cmd.invoice_id,
            invoice_number: cmd.invoice_number.clone(),
            invoice_date: cmd.invoice_date,
            due_date: cmd.due_date,
            notes: cmd.notes.clone(),
            line_items,
            totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        let state = self.owned_by(cmd.organization_id, cmd.invoice_id)?;
        if !state.status.allows_financial_edits() {
            return Err(DomainError::invalid_state(format!(
                "invoice can only be edited while draft (status: {})",
                state.status
            )));
        }
        Self::ensure_dates(cmd.invoice_date, cmd.due_date)?;
        let (line_items, totals) = ledger::price_line_items(&cmd.line_items)?;

        Ok(vec![InvoiceEvent::InvoiceUpdated(InvoiceUpdated {
            organization_id: cmd.organization_id,
            invoice_id: cmd.invoice_id,
            invoice_date: cmd.invoice_date,
            due_date: cmd.due_date,
            notes: cmd.notes.clone(),
            line_items,
            totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_send(&self, cmd: &SendInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        let state = self.owned_by(cmd.organization_id, cmd.invoice_id)?;
        if state.status != InvoiceStatus::Draft {
            return Err(DomainError::invalid_state(format!(
                "only draft invoices can be sent (status: {})",
                state.status
            )));
        }

        Ok(vec![InvoiceEvent::InvoiceSent(InvoiceSent {
            organization_id: cmd.organization_id,
            invoice_id: cmd.invoice_id,
            invoice_number: state.invoice_number.clone(),
            total: state.total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_paid(&self, cmd: &MarkPaid) -> Result<Vec<InvoiceEvent>, DomainError> {
        let state = self.owned_by(cmd.organization_id, cmd.invoice_id)?;
        // Cancelled is terminal too, so it is rejected alongside paid. Draft is
        // accepted: an invoice may be settled without being sent first.
        if state.status.is_terminal() {
            return Err(DomainError::invalid_state(match state.status {
                InvoiceStatus::Paid => "invoice is already paid",
                _ => "cancelled invoice cannot be paid",
            }));
        }
        if cmd.payment_method.trim().is_empty() {
            return Err(DomainError::validation("payment_method is required"));
        }

        Ok(vec![InvoiceEvent::InvoicePaid(InvoicePaid {
            organization_id: cmd.organization_id,
            invoice_id: cmd.invoice_id,
            invoice_number: state.invoice_number.clone(),
            previous_status: state.status,
            payment_method: cmd.payment_method.clone(),
            payment_date: cmd.payment_date,
            payment_reference: cmd.payment_reference.clone(),
            total: state.total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        let state = self.owned_by(cmd.organization_id, cmd.invoice_id)?;
        if state.status.is_terminal() {
            return Err(DomainError::invalid_state(match state.status {
                InvoiceStatus::Paid => "paid invoice cannot be cancelled",
                _ => "invoice is already cancelled",
            }));
        }

        Ok(vec![InvoiceEvent::InvoiceCancelled(InvoiceCancelled {
            organization_id: cmd.organization_id,
            invoice_id: cmd.invoice_id,
            invoice_number: state.invoice_number.clone(),
            previous_status: state.status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_flag_overdue(&self, cmd: &FlagOverdue) -> Result<Vec<InvoiceEvent>, DomainError> {
        let state = self.owned_by(cmd.organization_id, cmd.invoice_id)?;
        if state.status != InvoiceStatus::Sent {
            return Err(DomainError::invalid_state(format!(
                "only sent invoices can become overdue (status: {})",
                state.status
            )));
        }
        if state.due_date >= cmd.as_of {
            return Err(DomainError::invalid_state(format!(
                "invoice is not past due (due: {}, as of: {})",
                state.due_date, cmd.as_of
            )));
        }

        Ok(vec![InvoiceEvent::InvoiceMarkedOverdue(InvoiceMarkedOverdue {
            organization_id: cmd.organization_id,
            invoice_id: cmd.invoice_id,
            invoice_number: state.invoice_number.clone(),
            due_date: state.due_date,
            as_of: cmd.as_of,
            occurred_at: cmd.occurred_at,
        })])
    }
}
