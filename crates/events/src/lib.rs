//! Outbound domain events and the bus that distributes them.
//!
//! The engine publishes an event only after the state change it describes has
//! been committed. Consumers (the audit trail, notifications) are decoupled and
//! must tolerate duplicates.

pub mod bus;
pub mod company;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use company::CompanyScoped;
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
