//! Accounting domain: chart of accounts, journals, ledger rows and the report
//! arithmetic derived from them.
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod account;
pub mod cash;
pub mod chart;
pub mod error;
pub mod journal;
pub mod ledger;
pub mod numbering;
pub mod statements;
pub mod trial_balance;
pub mod validation;

pub use account::{
    Account, AccountCategory, AccountRecord, AccountType, AccountUpdate, NewAccount, NormalSide,
};
pub use cash::{CashDirection, CashMovement};
pub use chart::{ChartTemplateEntry, DEFAULT_CHART};
pub use error::{AccountingError, AccountingResult};
pub use journal::{
    CreateJournal, DeleteJournal, EntryLine, Journal, JournalAction, JournalCommand,
    JournalCreated, JournalDeleted, JournalEntry, JournalEvent, JournalPosted, JournalRecord,
    JournalStatus, JournalUpdated, JournalVoided, PostJournal, UpdateJournal, VoidJournal,
};
pub use ledger::{AccountActivity, LedgerRow, LedgerRowRecord, RawBalance, SignedBalance};
pub use numbering::JournalNumber;
pub use statements::{
    BalanceSheet, CashFlowItem, CashFlowStatement, IncomeStatement, StatementLine,
};
pub use trial_balance::{TrialBalance, TrialBalanceLine};
pub use validation::{JournalTotals, JournalValidator, JournalViolation};
