use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tallybook_accounting::{
    Account, AccountActivity, AccountUpdate, Journal, JournalNumber, JournalStatus, LedgerRow,
    RawBalance, SignedBalance,
};
use tallybook_core::{AccountId, CompanyId, DateRange, ExpectedVersion, JournalId};

/// Storage operation error.
///
/// These are **infrastructure errors** (availability, concurrency, uniqueness), as
/// opposed to accounting rule violations. They propagate to the caller unchanged;
/// nothing is retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("rejected: {0}")]
    Rejected(String),
}

/// A ledger row joined with its journal and account, as returned by ledger queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerLine {
    #[serde(flatten)]
    pub row: LedgerRow,
    pub journal_number: JournalNumber,
    pub transaction_date: NaiveDate,
    pub account_code: String,
    pub account_name: String,
}

/// New cached balance of one account touched by a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceUpdate {
    pub account_id: AccountId,
    /// Raw ledger balance through the batch's `as_of` that the new balance was
    /// computed from. The commit fails if the ledger has moved since.
    pub observed: RawBalance,
    pub balance: SignedBalance,
}

/// Everything one posting writes, applied as a single unit.
///
/// Only the cached balance of each account is written; name, description and
/// active flag belong to [`AccountStore::update_account`].
#[derive(Debug, Clone)]
pub struct PostingBatch {
    /// The journal in its posted state.
    pub journal: Journal,
    /// Version the stored journal must still be at.
    pub expected_version: ExpectedVersion,
    /// Date the observed balances were read through.
    pub as_of: NaiveDate,
    pub rows: Vec<LedgerRow>,
    pub balances: Vec<BalanceUpdate>,
}

/// Chart-of-accounts persistence. Code is unique per company.
pub trait AccountStore: Send + Sync {
    fn insert_account(&self, account: Account) -> Result<(), StoreError>;

    fn account(&self, company_id: CompanyId, id: AccountId) -> Result<Option<Account>, StoreError>;

    fn account_by_code(
        &self,
        company_id: CompanyId,
        code: &str,
    ) -> Result<Option<Account>, StoreError>;

    /// All accounts of a company, ordered by code.
    fn accounts(&self, company_id: CompanyId) -> Result<Vec<Account>, StoreError>;

    /// Apply the whitelisted fields of `update` to the stored account in place and
    /// return the result. The cached balance is left untouched. `None` when the
    /// company has no such account.
    fn update_account(
        &self,
        company_id: CompanyId,
        id: AccountId,
        update: AccountUpdate,
    ) -> Result<Option<Account>, StoreError>;
}

/// Journal persistence. Journal numbers are unique per company.
pub trait JournalStore: Send + Sync {
    fn insert_journal(&self, journal: Journal) -> Result<(), StoreError>;

    fn journal(
        &self,
        company_id: CompanyId,
        id: JournalId,
    ) -> Result<Option<Journal>, StoreError>;

    /// Journals dated within `range`, newest first (date desc, then number desc).
    fn journals(
        &self,
        company_id: CompanyId,
        range: DateRange,
    ) -> Result<Vec<Journal>, StoreError>;

    /// Journals with `status`, newest first.
    fn journals_by_status(
        &self,
        company_id: CompanyId,
        status: JournalStatus,
    ) -> Result<Vec<Journal>, StoreError>;

    fn replace_journal(
        &self,
        journal: Journal,
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError>;

    /// Hard-remove a journal together with its entries.
    fn remove_journal(
        &self,
        company_id: CompanyId,
        id: JournalId,
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError>;

    /// Reserve the next sequence of `period` (a `<prefix>/<YYYYMM>/` string) for the
    /// company. Sequences only grow: deleting a journal never frees its number.
    fn next_journal_sequence(
        &self,
        company_id: CompanyId,
        period: &str,
    ) -> Result<u32, StoreError>;
}

/// Append-only ledger.
///
/// Every query joins rows against their journal and only sees rows whose journal is
/// `posted` and whose transaction date falls in the requested range.
pub trait LedgerStore: Send + Sync {
    fn append(&self, row: LedgerRow) -> Result<(), StoreError>;

    /// Lines of one account, ordered by transaction date then append order.
    fn by_account(
        &self,
        company_id: CompanyId,
        account_id: AccountId,
        range: DateRange,
    ) -> Result<Vec<LedgerLine>, StoreError>;

    /// Lines of every account of a company, ordered by transaction date then append order.
    fn by_company(
        &self,
        company_id: CompanyId,
        range: DateRange,
    ) -> Result<Vec<LedgerLine>, StoreError>;

    /// Raw `Σ(debit − credit)` of one account through `as_of`.
    fn account_balance(
        &self,
        company_id: CompanyId,
        account_id: AccountId,
        as_of: NaiveDate,
    ) -> Result<RawBalance, StoreError>;

    /// Debit/credit totals per account over `range`. Accounts without rows are absent.
    fn activity_by_account(
        &self,
        company_id: CompanyId,
        range: DateRange,
    ) -> Result<HashMap<AccountId, AccountActivity>, StoreError>;

    /// Every row written for a journal, whatever its current status, in append order.
    fn journal_rows(
        &self,
        company_id: CompanyId,
        journal_id: JournalId,
    ) -> Result<Vec<LedgerRow>, StoreError>;

    /// Atomically store a posted journal, its ledger rows and the updated account
    /// balances. Either all of it is applied or none. Fails with
    /// [`StoreError::Concurrency`] when the journal version or any observed ledger
    /// balance no longer matches.
    fn commit_posting(&self, batch: PostingBatch) -> Result<(), StoreError>;
}

/// A store that holds accounts, journals and the ledger together.
pub trait AccountingStore: AccountStore + JournalStore + LedgerStore {}

impl<S> AccountingStore for S where S: AccountStore + JournalStore + LedgerStore + ?Sized {}

impl<S> AccountStore for Arc<S>
where
    S: AccountStore + ?Sized,
{
    fn insert_account(&self, account: Account) -> Result<(), StoreError> {
        (**self).insert_account(account)
    }

    fn account(&self, company_id: CompanyId, id: AccountId) -> Result<Option<Account>, StoreError> {
        (**self).account(company_id, id)
    }

    fn account_by_code(
        &self,
        company_id: CompanyId,
        code: &str,
    ) -> Result<Option<Account>, StoreError> {
        (**self).account_by_code(company_id, code)
    }

    fn accounts(&self, company_id: CompanyId) -> Result<Vec<Account>, StoreError> {
        (**self).accounts(company_id)
    }

    fn update_account(
        &self,
        company_id: CompanyId,
        id: AccountId,
        update: AccountUpdate,
    ) -> Result<Option<Account>, StoreError> {
        (**self).update_account(company_id, id, update)
    }
}

impl<S> JournalStore for Arc<S>
where
    S: JournalStore + ?Sized,
{
    fn insert_journal(&self, journal: Journal) -> Result<(), StoreError> {
        (**self).insert_journal(journal)
    }

    fn journal(
        &self,
        company_id: CompanyId,
        id: JournalId,
    ) -> Result<Option<Journal>, StoreError> {
        (**self).journal(company_id, id)
    }

    fn journals(
        &self,
        company_id: CompanyId,
        range: DateRange,
    ) -> Result<Vec<Journal>, StoreError> {
        (**self).journals(company_id, range)
    }

    fn journals_by_status(
        &self,
        company_id: CompanyId,
        status: JournalStatus,
    ) -> Result<Vec<Journal>, StoreError> {
        (**self).journals_by_status(company_id, status)
    }

    fn replace_journal(
        &self,
        journal: Journal,
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError> {
        (**self).replace_journal(journal, expected_version)
    }

    fn remove_journal(
        &self,
        company_id: CompanyId,
        id: JournalId,
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError> {
        (**self).remove_journal(company_id, id, expected_version)
    }

    fn next_journal_sequence(
        &self,
        company_id: CompanyId,
        period: &str,
    ) -> Result<u32, StoreError> {
        (**self).next_journal_sequence(company_id, period)
    }
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn append(&self, row: LedgerRow) -> Result<(), StoreError> {
        (**self).append(row)
    }

    fn by_account(
        &self,
        company_id: CompanyId,
        account_id: AccountId,
        range: DateRange,
    ) -> Result<Vec<LedgerLine>, StoreError> {
        (**self).by_account(company_id, account_id, range)
    }

    fn by_company(
        &self,
        company_id: CompanyId,
        range: DateRange,
    ) -> Result<Vec<LedgerLine>, StoreError> {
        (**self).by_company(company_id, range)
    }

    fn account_balance(
        &self,
        company_id: CompanyId,
        account_id: AccountId,
        as_of: NaiveDate,
    ) -> Result<RawBalance, StoreError> {
        (**self).account_balance(company_id, account_id, as_of)
    }

    fn activity_by_account(
        &self,
        company_id: CompanyId,
        range: DateRange,
    ) -> Result<HashMap<AccountId, AccountActivity>, StoreError> {
        (**self).activity_by_account(company_id, range)
    }

    fn journal_rows(
        &self,
        company_id: CompanyId,
        journal_id: JournalId,
    ) -> Result<Vec<LedgerRow>, StoreError> {
        (**self).journal_rows(company_id, journal_id)
    }

    fn commit_posting(&self, batch: PostingBatch) -> Result<(), StoreError> {
        (**self).commit_posting(batch)
    }
}
