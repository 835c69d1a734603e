//! Export view of an invoice for the reporting collaborator (PDF/CSV rendering).

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use careledger_core::StaffId;

use crate::invoice::{InvoiceSnapshot, InvoiceStatus};
use crate::numbering::InvoiceNumber;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementLine {
    pub line_no: u32,
    pub service_date: NaiveDate,
    pub support_item_number: String,
    pub support_item_name: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub gst_amount: Decimal,
    pub amount: Decimal,
    pub claim_type: String,
    pub funding_category: String,
    /// Display name of the staff member who delivered the service, if known.
    pub staff_name: Option<String>,
}

/// Header + lines + resolved display names. Plain data, no rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceStatement {
    pub invoice_number: InvoiceNumber,
    pub participant_name: String,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
    pub lines: Vec<StatementLine>,
    pub subtotal: Decimal,
    pub gst: Decimal,
    pub total: Decimal,
    pub notes: Option<String>,
    pub payment_method: Option<String>,
    pub payment_date: Option<NaiveDate>,
    pub payment_reference: Option<String>,
}

impl InvoiceStatement {
    /// Build the statement; staff ids missing from `staff_names` render without a name.
    pub fn build(
        invoice: &InvoiceSnapshot,
        participant_name: impl Into<String>,
        staff_names: &HashMap<StaffId, String>,
    ) -> Self {
        let lines = invoice
            .line_items
            .iter()
            .map(|line| StatementLine {
                line_no: line.line_no,
                service_date: line.service_date,
                support_item_number: line.support_item_number.clone(),
                support_item_name: line.support_item_name.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                gst_amount: line.gst_amount,
                amount: line.amount,
                claim_type: line.claim_type.clone(),
                funding_category: line.funding_category.clone(),
                staff_name: line
                    .staff_member_id
                    .and_then(|id| staff_names.get(&id).cloned()),
            })
            .collect();

        Self {
            invoice_number: invoice.invoice_number.clone(),
            participant_name: participant_name.into(),
            invoice_date: invoice.invoice_date,
            due_date: invoice.due_date,
            status: invoice.status,
            lines,
            subtotal: invoice.subtotal,
            gst: invoice.gst,
            total: invoice.total,
            notes: invoice.notes.clone(),
            payment_method: invoice.payment_method.clone(),
            payment_date: invoice.payment_date,
            payment_reference: invoice.payment_reference.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use careledger_core::{OrganizationId, ParticipantId};

    use crate::invoice::InvoiceId;
    use crate::ledger::price_line_items;
    use crate::line_item::LineItemDraft;

    fn draft(staff: Option<StaffId>) -> LineItemDraft {
        LineItemDraft {
            support_item_number: "15_037_0117_1_3".to_string(),
            support_item_name: "Specialist Behavioural Intervention Support".to_string(),
            service_date: NaiveDate::from_ymd_opt(2025, 5, 6).unwrap(),
            quantity: "1.5".parse().unwrap(),
            unit_price: "214.41".parse().unwrap(),
            gst_amount: Decimal::ZERO,
            claim_type: "standard".to_string(),
            funding_category: "capacity_building".to_string(),
            staff_member_id: staff,
        }
    }

    #[test]
    fn resolves_staff_names_and_keeps_totals() {
        let known = StaffId::new();
        let unknown = StaffId::new();
        let (line_items, totals) =
            price_line_items(&[draft(Some(known)), draft(Some(unknown)), draft(None)]).unwrap();
        let org = OrganizationId::new();
        let now = Utc::now();

        let snapshot = InvoiceSnapshot {
            id: InvoiceId::generate(),
            invoice_number: InvoiceNumber::format(org, 7),
            organization_id: org,
            participant_id: ParticipantId::new(),
            invoice_date: NaiveDate::from_ymd_opt(2025, 5, 31).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
            status: InvoiceStatus::Sent,
            subtotal: totals.subtotal,
            gst: totals.gst,
            total: totals.total,
            notes: None,
            payment_method: None,
            payment_date: None,
            payment_reference: None,
            sent_date: Some(now),
            cancelled_date: None,
            line_items,
            created_at: now,
            updated_at: now,
            version: 2,
        };

        let names = HashMap::from([(known, "Priya Nair".to_string())]);
        let statement = InvoiceStatement::build(&snapshot, "Sam Taylor", &names);

        assert_eq!(statement.participant_name, "Sam Taylor");
        assert_eq!(statement.lines[0].staff_name.as_deref(), Some("Priya Nair"));
        assert_eq!(statement.lines[1].staff_name, None);
        assert_eq!(statement.lines[2].staff_name, None);
        assert_eq!(statement.lines[0].amount, "321.62".parse::<Decimal>().unwrap());
        assert_eq!(statement.total, snapshot.total);
    }
}
