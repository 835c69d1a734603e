use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use careledger_core::StaffId;

/// A line item as submitted by the caller, before pricing.
///
/// `amount` is never accepted from the caller; it is derived by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemDraft {
    pub support_item_number: String,
    pub support_item_name: String,
    pub service_date: NaiveDate,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub gst_amount: Decimal,
    pub claim_type: String,
    pub funding_category: String,
    #[serde(default)]
    pub staff_member_id: Option<StaffId>,
}

/// A priced line item owned by an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    /// 1-based position within the invoice.
    pub line_no: u32,
    pub support_item_number: String,
    pub support_item_name: String,
    pub service_date: NaiveDate,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub gst_amount: Decimal,
    /// `round_half_up(quantity * unit_price, 2)`.
    pub amount: Decimal,
    pub claim_type: String,
    pub funding_category: String,
    pub staff_member_id: Option<StaffId>,
}
