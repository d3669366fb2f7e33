//! Engine wiring shared by every route.

use std::io;
use std::sync::{Arc, Mutex};

use tallybook_accounting::JournalEvent;
use tallybook_events::{EventEnvelope, InMemoryEventBus};
use tallybook_infra::{
    AccountRegistry, AccountingStore, FinancialStatementComposer, InMemoryAccountingStore,
    JournalNumberGenerator, JournalPostingEngine, LedgerReader, PostgresAccountingStore,
    StoreError, TrialBalanceBuilder,
    workers::{AuditTrailWorker, InMemoryAuditSink, WorkerHandle},
};

use crate::config::AppConfig;

pub type Store = Arc<dyn AccountingStore>;
pub type Bus = Arc<InMemoryEventBus<EventEnvelope<JournalEvent>>>;

pub struct AppServices {
    pub app_name: String,
    pub registry: AccountRegistry<Store>,
    pub engine: JournalPostingEngine<Store, Bus>,
    pub ledger: LedgerReader<Store>,
    pub trial_balance: TrialBalanceBuilder<Store>,
    pub statements: FinancialStatementComposer<Store>,
    pub audit: Arc<InMemoryAuditSink>,
    audit_worker: Mutex<Option<WorkerHandle>>,
}

impl AppServices {
    /// Stop the audit trail worker and wait for it. Later calls do nothing.
    pub fn shutdown(&self) {
        let handle = match self.audit_worker.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            handle.shutdown();
        }
    }
}

/// Open the store the configuration asks for: Postgres when
/// `USE_PERSISTENT_STORES=true`, in-memory otherwise.
pub async fn open_store(config: &AppConfig) -> Result<Store, StoreError> {
    match (&config.database_url, config.use_persistent_stores) {
        (Some(url), true) => {
            let store =
                PostgresAccountingStore::connect(url, config.database_max_connections).await?;
            tracing::info!("using Postgres accounting store");
            Ok(Arc::new(store))
        }
        (None, true) => Err(StoreError::Unavailable(
            "USE_PERSISTENT_STORES=true but DATABASE_URL is not set".to_string(),
        )),
        (_, false) => Ok(in_memory_store()),
    }
}

pub fn in_memory_store() -> Store {
    Arc::new(InMemoryAccountingStore::new())
}

/// One store and one bus shared by every component, plus the audit trail worker
/// draining the bus.
pub fn build_services(config: &AppConfig, store: Store) -> io::Result<AppServices> {
    let bus: Bus = Arc::new(InMemoryEventBus::new());

    let audit = Arc::new(InMemoryAuditSink::new());
    let audit_worker = AuditTrailWorker::spawn(&bus, audit.clone())?;

    let engine = JournalPostingEngine::new(store.clone(), bus)
        .with_numbering(JournalNumberGenerator::new(config.journal_number_prefix.clone()));
    let statements = FinancialStatementComposer::new(store.clone())
        .with_cash_accounts(config.cash_account_codes.clone());

    Ok(AppServices {
        app_name: config.app_name.clone(),
        registry: AccountRegistry::new(store.clone()),
        engine,
        ledger: LedgerReader::new(store.clone()),
        trial_balance: TrialBalanceBuilder::new(store),
        statements,
        audit,
        audit_worker: Mutex::new(Some(audit_worker)),
    })
}
