//! `careledger-billing`: invoice lifecycle and ledger arithmetic.
//!
//! Pure domain logic: no IO, no clocks. Callers pass `occurred_at` and the
//! allocated invoice number in through commands.

pub mod invoice;
pub mod ledger;
pub mod line_item;
pub mod numbering;
pub mod statement;

pub use invoice::{
    AGGREGATE_TYPE, CancelInvoice, CreateInvoice, FlagOverdue, Invoice, InvoiceCommand,
    InvoiceEvent, InvoiceId, InvoiceSnapshot, InvoiceStatus, MarkPaid, SendInvoice,
    UpdateInvoice,
};
pub use ledger::{LedgerTotals, compute_totals, line_amount, price_line_items, totals_from_lines};
pub use line_item::{InvoiceLineItem, LineItemDraft};
pub use numbering::InvoiceNumber;
pub use statement::{InvoiceStatement, StatementLine};
