//! Infrastructure layer: storage, journal orchestration, reports and workers.

pub mod error;
pub mod ledger;
pub mod numbering;
pub mod posting;
pub mod registry;
pub mod reports;
pub mod store;
pub mod workers;


pub use error::{EngineError, EngineResult};
pub use ledger::LedgerReader;
pub use numbering::JournalNumberGenerator;
pub use posting::{CashEntry, JOURNAL_AGGREGATE_TYPE, JournalPostingEngine, NewJournal};
pub use registry::AccountRegistry;
pub use reports::{DEFAULT_CASH_ACCOUNT_CODES, FinancialStatementComposer, TrialBalanceBuilder};
pub use store::{
    AccountStore, AccountingStore, BalanceUpdate, InMemoryAccountingStore, JournalStore,
    LedgerLine, LedgerStore, PostgresAccountingStore, PostingBatch, StoreError,
};
