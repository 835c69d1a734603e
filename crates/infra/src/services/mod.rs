//! Application services: load → decide (pure domain) → atomic save → notify.
//!
//! ```text
//! API / job ─► service ─► store (commit) ─► event bus (publish)
//! ```
//!
//! The services hold no mutable state of their own; everything durable lives
//! behind the store traits.

pub mod billing;
pub mod compliance;
pub mod scheduling;

use thiserror::Error;

use careledger_core::DomainError;

use crate::store::StoreError;

pub use billing::{InvoiceChanges, InvoiceEnvelope, InvoiceService, NewInvoice, Payment};
pub use compliance::ComplianceService;
pub use scheduling::{BookingResult, SchedulingService, SeriesStatus};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => ServiceError::Domain(DomainError::conflict(msg)),
            StoreError::NotFound(_) => ServiceError::Domain(DomainError::not_found()),
            other => ServiceError::Store(other),
        }
    }
}

impl ServiceError {
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(e) => Some(e),
            ServiceError::Store(_) => None,
        }
    }
}
