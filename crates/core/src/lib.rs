//! `careledger-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{ActorId, AggregateId, OrganizationId, ParticipantId, StaffId};
pub use money::{round_currency, round_rate, CURRENCY_SCALE};
