//! Persistence boundary for accounts, journals and the ledger.
//!
//! The traits make no storage assumptions. The in-memory implementation backs tests
//! and development; the Postgres one is used when persistence is configured.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryAccountingStore;
pub use postgres::PostgresAccountingStore;
pub use r#trait::{
    AccountStore, AccountingStore, BalanceUpdate, JournalStore, LedgerLine, LedgerStore,
    PostingBatch, StoreError,
};
