//! Ledger arithmetic: line-item pricing and invoice totals.
//!
//! Pure functions. Invoice creation and invoice update both price through
//! [`price_line_items`], so the persisted totals can always be re-derived by
//! replaying the current line items.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use careledger_core::{DomainError, DomainResult, round_currency};

use crate::line_item::{InvoiceLineItem, LineItemDraft};

/// Invoice totals, each rounded to 2 decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub subtotal: Decimal,
    pub gst: Decimal,
    pub total: Decimal,
}

impl LedgerTotals {
    pub fn zero() -> Self {
        Self {
            subtotal: round_currency(Decimal::ZERO),
            gst: round_currency(Decimal::ZERO),
            total: round_currency(Decimal::ZERO),
        }
    }
}

impl Default for LedgerTotals {
    fn default() -> Self {
        Self::zero()
    }
}

/// `round_half_up(quantity * unit_price, 2)`, rejecting non-positive quantities
/// and negative prices.
pub fn line_amount(quantity: Decimal, unit_price: Decimal) -> DomainResult<Decimal> {
    if quantity <= Decimal::ZERO {
        return Err(DomainError::invalid_line_item(format!(
            "quantity must be positive (got {quantity})"
        )));
    }
    if unit_price < Decimal::ZERO {
        return Err(DomainError::invalid_line_item(format!(
            "unit_price must not be negative (got {unit_price})"
        )));
    }
    let raw = quantity
        .checked_mul(unit_price)
        .ok_or_else(|| DomainError::invalid_line_item("line amount overflow"))?;
    Ok(round_currency(raw))
}

/// Price every draft (in order) and compute the invoice totals.
///
/// Fails with `InvalidLineItem` on the first offending item; nothing is
/// returned for a partially valid set.
pub fn price_line_items(
    drafts: &[LineItemDraft],
) -> DomainResult<(Vec<InvoiceLineItem>, LedgerTotals)> {
    let mut lines = Vec::with_capacity(drafts.len());

    for (idx, draft) in drafts.iter().enumerate() {
        let line_no = (idx as u32) + 1;
        let amount = line_amount(draft.quantity, draft.unit_price)
            .map_err(|e| prefix_line(line_no, e))?;
        if draft.gst_amount < Decimal::ZERO {
            return Err(DomainError::invalid_line_item(format!(
                "line {line_no}: gst_amount must not be negative (got {})",
                draft.gst_amount
            )));
        }

        lines.push(InvoiceLineItem {
            line_no,
            support_item_number: draft.support_item_number.clone(),
            support_item_name: draft.support_item_name.clone(),
            service_date: draft.service_date,
            quantity: draft.quantity,
            unit_price: draft.unit_price,
            gst_amount: round_currency(draft.gst_amount),
            amount,
            claim_type: draft.claim_type.clone(),
            funding_category: draft.funding_category.clone(),
            staff_member_id: draft.staff_member_id,
        });
    }

    let totals = totals_from_lines(&lines)?;
    Ok((lines, totals))
}

/// Compute totals for a set of drafts without keeping the priced lines.
pub fn compute_totals(drafts: &[LineItemDraft]) -> DomainResult<LedgerTotals> {
    price_line_items(drafts).map(|(_, totals)| totals)
}

/// Re-derive totals from already priced lines.
pub fn totals_from_lines(lines: &[InvoiceLineItem]) -> DomainResult<LedgerTotals> {
    let mut subtotal = Decimal::ZERO;
    let mut gst = Decimal::ZERO;
    for line in lines {
        subtotal = subtotal
            .checked_add(line.amount)
            .ok_or_else(|| DomainError::invalid_line_item("invoice subtotal overflow"))?;
        gst = gst
            .checked_add(line.gst_amount)
            .ok_or_else(|| DomainError::invalid_line_item("invoice gst overflow"))?;
    }

    let subtotal = round_currency(subtotal);
    let gst = round_currency(gst);
    let total = subtotal
        .checked_add(gst)
        .map(round_currency)
        .ok_or_else(|| DomainError::invalid_line_item("invoice total overflow"))?;

    Ok(LedgerTotals {
        subtotal,
        gst,
        total,
    })
}

fn prefix_line(line_no: u32, err: DomainError) -> DomainError {
    match err {
        DomainError::InvalidLineItem(msg) => {
            DomainError::invalid_line_item(format!("line {line_no}: {msg}"))
        }
        other => other,
    }
}
