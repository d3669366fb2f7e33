//! Background consumers of the journal event bus.

pub mod audit_trail;
pub mod event_worker;

pub use audit_trail::{AuditRecord, AuditSink, AuditSinkError, AuditTrailWorker, InMemoryAuditSink};
pub use event_worker::{EventWorker, WorkerHandle};
