//! Audit trail of journal changes, fed from the event bus.

use std::io;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use tallybook_accounting::JournalEvent;
use tallybook_core::{CompanyId, JournalId, UserId};
use tallybook_events::{Event, EventBus, EventEnvelope};

use super::event_worker::{EventWorker, WorkerHandle};

#[derive(Debug, Error)]
pub enum AuditSinkError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("audit payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One audited journal change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub event_id: Uuid,
    pub company_id: CompanyId,
    pub journal_id: JournalId,
    pub event_type: String,
    pub actor: Option<UserId>,
    /// Journal version right after the change.
    pub sequence_number: u64,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

impl AuditRecord {
    pub fn from_envelope(envelope: &EventEnvelope<JournalEvent>) -> Result<Self, AuditSinkError> {
        let event = envelope.payload();
        Ok(Self {
            event_id: envelope.event_id(),
            company_id: envelope.company_id(),
            journal_id: event.journal_id(),
            event_type: event.event_type().to_string(),
            actor: event.actor(),
            sequence_number: envelope.sequence_number(),
            occurred_at: event.occurred_at(),
            payload: serde_json::to_value(event)?,
        })
    }
}

/// Destination of audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord) -> Result<(), AuditSinkError>;
}

impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    fn record(&self, record: AuditRecord) -> Result<(), AuditSinkError> {
        (**self).record(record)
    }
}

/// In-memory audit sink for tests/dev.
///
/// Redelivered records (same journal and sequence number) are ignored.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records of one company, oldest first.
    pub fn records(&self, company_id: CompanyId) -> Vec<AuditRecord> {
        match self.records.read() {
            Ok(records) => records
                .iter()
                .filter(|r| r.company_id == company_id)
                .cloned()
                .collect(),
            Err(_) => vec![],
        }
    }

    /// Records of one journal, oldest first.
    pub fn journal_history(
        &self,
        company_id: CompanyId,
        journal_id: JournalId,
    ) -> Vec<AuditRecord> {
        self.records(company_id)
            .into_iter()
            .filter(|r| r.journal_id == journal_id)
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, record: AuditRecord) -> Result<(), AuditSinkError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| AuditSinkError::Unavailable("lock poisoned".to_string()))?;

        let seen = records.iter().any(|r| {
            r.journal_id == record.journal_id && r.sequence_number == record.sequence_number
        });
        if !seen {
            records.push(record);
        }
        Ok(())
    }
}

/// Consumes journal events from the bus into an [`AuditSink`].
#[derive(Debug)]
pub struct AuditTrailWorker;

impl AuditTrailWorker {
    pub const NAME: &'static str = "audit-trail";

    pub fn spawn<B, S>(bus: &B, sink: S) -> io::Result<WorkerHandle>
    where
        B: EventBus<EventEnvelope<JournalEvent>> + ?Sized,
        S: AuditSink + 'static,
    {
        EventWorker::spawn(Self::NAME, bus, None, move |envelope: EventEnvelope<JournalEvent>| {
            sink.record(AuditRecord::from_envelope(&envelope)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tallybook_accounting::JournalVoided;
    use tallybook_events::InMemoryEventBus;

    fn voided(company_id: CompanyId, journal_id: JournalId) -> JournalEvent {
        JournalEvent::Voided(JournalVoided {
            company_id,
            journal_id,
            voided_by: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn worker_records_published_events() {
        let bus: InMemoryEventBus<EventEnvelope<JournalEvent>> = InMemoryEventBus::new();
        let sink = Arc::new(InMemoryAuditSink::new());
        let handle = AuditTrailWorker::spawn(&bus, sink.clone()).unwrap();

        let company_id = CompanyId::new();
        let journal_id = JournalId::new();
        bus.publish(EventEnvelope::new(
            company_id,
            journal_id,
            "accounting.journal",
            3,
            voided(company_id, journal_id),
        ))
        .unwrap();

        assert!(wait_for(|| !sink.records(company_id).is_empty()));
        let record = &sink.journal_history(company_id, journal_id)[0];
        assert_eq!(record.event_type, "accounting.journal.voided");
        assert_eq!(record.sequence_number, 3);
        assert!(record.actor.is_some());

        handle.shutdown();
    }

    #[test]
    fn redelivered_records_are_kept_once() {
        let sink = InMemoryAuditSink::new();
        let company_id = CompanyId::new();
        let journal_id = JournalId::new();
        let envelope = EventEnvelope::new(
            company_id,
            journal_id,
            "accounting.journal",
            2,
            voided(company_id, journal_id),
        );

        sink.record(AuditRecord::from_envelope(&envelope).unwrap()).unwrap();
        sink.record(AuditRecord::from_envelope(&envelope).unwrap()).unwrap();

        assert_eq!(sink.records(company_id).len(), 1);
        assert!(sink.records(CompanyId::new()).is_empty());
    }
}
