//! Lifecycle events and their in-process distribution.
//!
//! Aggregates emit events; infra services persist state first and only then
//! publish the events here for notification collaborators.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
