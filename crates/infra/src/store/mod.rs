//! Persistence for invoices, appointments, audit logs and display names.
//!
//! Every trait has an in-memory implementation (tests/dev) and a Postgres
//! implementation. Writes that must be atomic (invoice header + line items,
//! a generated series) are a single call on the trait, so a backend can wrap
//! them in one transaction.

mod r#trait;
pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use r#trait::{AppointmentStore, AuditLogStore, Directory, InvoiceStore, StoreError};
