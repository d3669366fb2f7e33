use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::NaiveDate;

use tallybook_accounting::{
    Account, AccountActivity, AccountUpdate, Journal, JournalStatus, LedgerRow, RawBalance,
};
use tallybook_core::{
    AccountId, AggregateRoot, CompanyId, DateRange, Entity, ExpectedVersion, JournalId,
};

use super::r#trait::{
    AccountStore, JournalStore, LedgerLine, LedgerStore, PostingBatch, StoreError,
};

#[derive(Debug, Default)]
struct Books {
    accounts: HashMap<AccountId, Account>,
    journals: HashMap<JournalId, Journal>,
    /// Append order is the tie-breaker for rows sharing a transaction date.
    rows: Vec<LedgerRow>,
    /// Highest journal sequence handed out per company and period.
    sequences: HashMap<(CompanyId, String), u32>,
}

impl Books {
    fn account_in(&self, company_id: CompanyId, id: AccountId) -> Option<&Account> {
        self.accounts.get(&id).filter(|a| a.company_id() == company_id)
    }

    fn journal_in(&self, company_id: CompanyId, id: JournalId) -> Option<&Journal> {
        self.journals.get(&id).filter(|j| j.company_id() == company_id)
    }

    fn check_version(
        &self,
        company_id: CompanyId,
        id: JournalId,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let current = self
            .journal_in(company_id, id)
            .ok_or_else(|| StoreError::NotFound(format!("journal {id}")))?;

        if !expected.matches(current.version()) {
            return Err(StoreError::Concurrency(format!(
                "journal {id}: expected {expected:?}, found {}",
                current.version()
            )));
        }
        Ok(())
    }

    /// Rows of posted journals dated within `range`, joined with journal and account.
    fn posted_lines(
        &self,
        company_id: CompanyId,
        range: DateRange,
        account_id: Option<AccountId>,
    ) -> Vec<LedgerLine> {
        let mut lines: Vec<LedgerLine> = self
            .rows
            .iter()
            .filter(|row| row.company_id() == company_id)
            .filter(|row| account_id.is_none_or(|id| row.account_id() == id))
            .filter_map(|row| {
                let journal = self.journal_in(company_id, row.journal_id())?;
                if journal.status() != JournalStatus::Posted
                    || !range.contains(journal.transaction_date())
                {
                    return None;
                }
                let account = self.account_in(company_id, row.account_id())?;

                Some(LedgerLine {
                    row: row.clone(),
                    journal_number: journal.number().clone(),
                    transaction_date: journal.transaction_date(),
                    account_code: account.code().to_string(),
                    account_name: account.name().to_string(),
                })
            })
            .collect();

        // Stable: rows of the same date keep append order.
        lines.sort_by_key(|l| l.transaction_date);
        lines
    }

    fn raw_balance(
        &self,
        company_id: CompanyId,
        account_id: AccountId,
        as_of: NaiveDate,
    ) -> RawBalance {
        self.posted_lines(company_id, DateRange::through(as_of), Some(account_id))
            .iter()
            .fold(RawBalance::ZERO, |acc, line| acc + line.row.raw())
    }

    fn newest_first(mut journals: Vec<Journal>) -> Vec<Journal> {
        journals.sort_by(|a, b| {
            b.transaction_date()
                .cmp(&a.transaction_date())
                .then_with(|| b.number().cmp(a.number()))
        });
        journals
    }
}

/// In-memory accounting store.
///
/// Intended for tests/dev. One lock guards accounts, journals and ledger rows, so a
/// posting batch is applied atomically.
#[derive(Debug, Default)]
pub struct InMemoryAccountingStore {
    books: RwLock<Books>,
}

impl InMemoryAccountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Books>, StoreError> {
        self.books
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Books>, StoreError> {
        self.books
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }
}

impl AccountStore for InMemoryAccountingStore {
    fn insert_account(&self, account: Account) -> Result<(), StoreError> {
        let mut books = self.write()?;

        if books.accounts.contains_key(account.id()) {
            return Err(StoreError::Duplicate(format!("account {}", account.id())));
        }
        let code_taken = books
            .accounts
            .values()
            .any(|a| a.company_id() == account.company_id() && a.code() == account.code());
        if code_taken {
            return Err(StoreError::Duplicate(format!("account code {}", account.code())));
        }

        books.accounts.insert(*account.id(), account);
        Ok(())
    }

    fn account(&self, company_id: CompanyId, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.read()?.account_in(company_id, id).cloned())
    }

    fn account_by_code(
        &self,
        company_id: CompanyId,
        code: &str,
    ) -> Result<Option<Account>, StoreError> {
        let books = self.read()?;
        Ok(books
            .accounts
            .values()
            .find(|a| a.company_id() == company_id && a.code() == code)
            .cloned())
    }

    fn accounts(&self, company_id: CompanyId) -> Result<Vec<Account>, StoreError> {
        let books = self.read()?;
        let mut accounts: Vec<Account> = books
            .accounts
            .values()
            .filter(|a| a.company_id() == company_id)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.code().cmp(b.code()));
        Ok(accounts)
    }

    fn update_account(
        &self,
        company_id: CompanyId,
        id: AccountId,
        update: AccountUpdate,
    ) -> Result<Option<Account>, StoreError> {
        let mut books = self.write()?;
        let Some(account) = books
            .accounts
            .get_mut(&id)
            .filter(|a| a.company_id() == company_id)
        else {
            return Ok(None);
        };

        account
            .apply_update(update)
            .map_err(|e| StoreError::Rejected(e.to_string()))?;
        Ok(Some(account.clone()))
    }
}

impl JournalStore for InMemoryAccountingStore {
    fn insert_journal(&self, journal: Journal) -> Result<(), StoreError> {
        let mut books = self.write()?;

        if books.journals.contains_key(journal.id()) {
            return Err(StoreError::Duplicate(format!("journal {}", journal.id())));
        }
        let number_taken = books
            .journals
            .values()
            .any(|j| j.company_id() == journal.company_id() && j.number() == journal.number());
        if number_taken {
            return Err(StoreError::Duplicate(format!("journal number {}", journal.number())));
        }

        books.journals.insert(*journal.id(), journal);
        Ok(())
    }

    fn journal(
        &self,
        company_id: CompanyId,
        id: JournalId,
    ) -> Result<Option<Journal>, StoreError> {
        Ok(self.read()?.journal_in(company_id, id).cloned())
    }

    fn journals(
        &self,
        company_id: CompanyId,
        range: DateRange,
    ) -> Result<Vec<Journal>, StoreError> {
        let books = self.read()?;
        let journals = books
            .journals
            .values()
            .filter(|j| j.company_id() == company_id && range.contains(j.transaction_date()))
            .cloned()
            .collect();
        Ok(Books::newest_first(journals))
    }

    fn journals_by_status(
        &self,
        company_id: CompanyId,
        status: JournalStatus,
    ) -> Result<Vec<Journal>, StoreError> {
        let books = self.read()?;
        let journals = books
            .journals
            .values()
            .filter(|j| j.company_id() == company_id && j.status() == status)
            .cloned()
            .collect();
        Ok(Books::newest_first(journals))
    }

    fn replace_journal(
        &self,
        journal: Journal,
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut books = self.write()?;
        books.check_version(journal.company_id(), *journal.id(), expected_version)?;
        books.journals.insert(*journal.id(), journal);
        Ok(())
    }

    fn remove_journal(
        &self,
        company_id: CompanyId,
        id: JournalId,
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut books = self.write()?;
        books.check_version(company_id, id, expected_version)?;
        books.journals.remove(&id);
        Ok(())
    }

    fn next_journal_sequence(
        &self,
        company_id: CompanyId,
        period: &str,
    ) -> Result<u32, StoreError> {
        let mut books = self.write()?;

        // Journals inserted directly (imports, fixtures) also raise the mark.
        let stored = books
            .journals
            .values()
            .filter(|j| j.company_id() == company_id)
            .filter_map(|j| j.number().sequence_within(period))
            .max()
            .unwrap_or(0);
        let mark = books
            .sequences
            .entry((company_id, period.to_string()))
            .or_insert(0);

        *mark = (*mark).max(stored) + 1;
        Ok(*mark)
    }
}

impl LedgerStore for InMemoryAccountingStore {
    fn append(&self, row: LedgerRow) -> Result<(), StoreError> {
        let mut books = self.write()?;

        if books.journal_in(row.company_id(), row.journal_id()).is_none() {
            return Err(StoreError::NotFound(format!("journal {}", row.journal_id())));
        }
        if books.account_in(row.company_id(), row.account_id()).is_none() {
            return Err(StoreError::NotFound(format!("account {}", row.account_id())));
        }

        books.rows.push(row);
        Ok(())
    }

    fn by_account(
        &self,
        company_id: CompanyId,
        account_id: AccountId,
        range: DateRange,
    ) -> Result<Vec<LedgerLine>, StoreError> {
        Ok(self.read()?.posted_lines(company_id, range, Some(account_id)))
    }

    fn by_company(
        &self,
        company_id: CompanyId,
        range: DateRange,
    ) -> Result<Vec<LedgerLine>, StoreError> {
        Ok(self.read()?.posted_lines(company_id, range, None))
    }

    fn account_balance(
        &self,
        company_id: CompanyId,
        account_id: AccountId,
        as_of: NaiveDate,
    ) -> Result<RawBalance, StoreError> {
        Ok(self.read()?.raw_balance(company_id, account_id, as_of))
    }

    fn activity_by_account(
        &self,
        company_id: CompanyId,
        range: DateRange,
    ) -> Result<HashMap<AccountId, AccountActivity>, StoreError> {
        let books = self.read()?;
        let mut activity: HashMap<AccountId, AccountActivity> = HashMap::new();
        for line in books.posted_lines(company_id, range, None) {
            activity
                .entry(line.row.account_id())
                .or_default()
                .record(line.row.debit(), line.row.credit());
        }
        Ok(activity)
    }

    fn journal_rows(
        &self,
        company_id: CompanyId,
        journal_id: JournalId,
    ) -> Result<Vec<LedgerRow>, StoreError> {
        let books = self.read()?;
        Ok(books
            .rows
            .iter()
            .filter(|r| r.company_id() == company_id && r.journal_id() == journal_id)
            .cloned()
            .collect())
    }

    fn commit_posting(&self, batch: PostingBatch) -> Result<(), StoreError> {
        let mut books = self.write()?;
        let company_id = batch.journal.company_id();

        // Validate everything before touching state.
        books.check_version(company_id, *batch.journal.id(), batch.expected_version)?;
        for row in &batch.rows {
            if row.company_id() != company_id || row.journal_id() != *batch.journal.id() {
                return Err(StoreError::Concurrency(format!(
                    "ledger row for journal {} does not belong to the batch",
                    row.journal_id()
                )));
            }
            if books.account_in(company_id, row.account_id()).is_none() {
                return Err(StoreError::NotFound(format!("account {}", row.account_id())));
            }
        }

        let mut updated = Vec::with_capacity(batch.balances.len());
        for update in &batch.balances {
            let mut account = books
                .account_in(company_id, update.account_id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("account {}", update.account_id)))?;

            let current = books.raw_balance(company_id, update.account_id, batch.as_of);
            if current != update.observed {
                return Err(StoreError::Concurrency(format!(
                    "ledger of account {} moved from {} to {} since it was read",
                    account.code(),
                    update.observed.amount(),
                    current.amount()
                )));
            }

            account
                .record_posted_balance(update.balance)
                .map_err(|e| StoreError::Rejected(e.to_string()))?;
            updated.push(account);
        }

        for account in updated {
            books.accounts.insert(*account.id(), account);
        }
        books.rows.extend(batch.rows);
        books.journals.insert(*batch.journal.id(), batch.journal);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BalanceUpdate;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tallybook_accounting::{
        AccountCategory, CreateJournal, EntryLine, JournalCommand, JournalNumber, NewAccount,
        PostJournal, SignedBalance,
    };
    use tallybook_core::{Aggregate, UserId};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn open(
        store: &InMemoryAccountingStore,
        company_id: CompanyId,
        code: &str,
        category: AccountCategory,
    ) -> Account {
        let account = Account::open(
            AccountId::new(),
            NewAccount {
                company_id,
                code: code.into(),
                name: format!("Account {code}"),
                description: String::new(),
                account_type: category.account_type(),
                category,
                parent_id: None,
                level: 3,
                is_header: false,
                balance: Decimal::ZERO,
            },
            Utc::now(),
        )
        .unwrap();
        store.insert_account(account.clone()).unwrap();
        account
    }

    fn line(account: &Account, debit: Decimal, credit: Decimal, position: u32) -> EntryLine {
        EntryLine {
            account_id: *account.id(),
            description: String::new(),
            debit,
            credit,
            position,
        }
    }

    fn draft(
        company_id: CompanyId,
        number: u32,
        date: NaiveDate,
        debit: &Account,
        credit: &Account,
        amount: Decimal,
    ) -> Journal {
        let id = JournalId::new();
        let mut journal = Journal::empty(id, company_id);
        let events = journal
            .handle(&JournalCommand::Create(CreateJournal {
                company_id,
                journal_id: id,
                number: JournalNumber::compose("JRN", date, number),
                transaction_date: date,
                description: "test".into(),
                entries: vec![
                    line(debit, amount, Decimal::ZERO, 1),
                    line(credit, Decimal::ZERO, amount, 2),
                ],
                created_by: UserId::new(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        for e in &events {
            journal.apply(e);
        }
        journal
    }

    fn posted(journal: &Journal) -> Journal {
        let mut posted = journal.clone();
        let events = posted
            .handle(&JournalCommand::Post(PostJournal {
                company_id: journal.company_id(),
                journal_id: *journal.id(),
                posted_by: UserId::new(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        for e in &events {
            posted.apply(e);
        }
        posted
    }

    fn rows_for(journal: &Journal) -> Vec<LedgerRow> {
        journal
            .entries()
            .iter()
            .map(|e| {
                LedgerRow::new(
                    journal.company_id(),
                    e.account_id,
                    *journal.id(),
                    e.id,
                    e.debit,
                    e.credit,
                    SignedBalance::ZERO,
                    e.description.clone(),
                    Utc::now(),
                )
            })
            .collect()
    }

    fn batch(journal: &Journal, balances: Vec<BalanceUpdate>) -> PostingBatch {
        PostingBatch {
            journal: posted(journal),
            expected_version: ExpectedVersion::Exact(journal.version()),
            as_of: d(2030, 1, 1),
            rows: rows_for(journal),
            balances,
        }
    }

    fn to_balance(account: &Account, observed: Decimal, balance: Decimal) -> BalanceUpdate {
        BalanceUpdate {
            account_id: *account.id(),
            observed: RawBalance::new(observed),
            balance: SignedBalance::new(balance),
        }
    }

    #[test]
    fn account_codes_are_unique_per_company_only() {
        let store = InMemoryAccountingStore::new();
        let a = CompanyId::new();
        let b = CompanyId::new();
        open(&store, a, "1-1100", AccountCategory::CurrentAsset);
        open(&store, b, "1-1100", AccountCategory::CurrentAsset);

        let dup = Account::open(
            AccountId::new(),
            NewAccount {
                company_id: a,
                code: "1-1100".into(),
                name: "Cash again".into(),
                description: String::new(),
                account_type: AccountCategory::CurrentAsset.account_type(),
                category: AccountCategory::CurrentAsset,
                parent_id: None,
                level: 3,
                is_header: false,
                balance: Decimal::ZERO,
            },
            Utc::now(),
        )
        .unwrap();
        assert!(matches!(store.insert_account(dup), Err(StoreError::Duplicate(_))));
    }

    #[test]
    fn other_companies_cannot_see_each_others_records() {
        let store = InMemoryAccountingStore::new();
        let a = CompanyId::new();
        let cash = open(&store, a, "1-1100", AccountCategory::CurrentAsset);

        assert!(store.account(CompanyId::new(), *cash.id()).unwrap().is_none());
        assert!(store.accounts(CompanyId::new()).unwrap().is_empty());
    }

    #[test]
    fn ledger_queries_only_see_posted_journals_in_range() {
        let store = InMemoryAccountingStore::new();
        let c = CompanyId::new();
        let cash = open(&store, c, "1-1100", AccountCategory::CurrentAsset);
        let sales = open(&store, c, "4-1000", AccountCategory::OperatingRevenue);

        let january = draft(c, 1, d(2024, 1, 10), &cash, &sales, dec!(100));
        let february = draft(c, 1, d(2024, 2, 10), &cash, &sales, dec!(50));
        let unposted = draft(c, 2, d(2024, 1, 20), &cash, &sales, dec!(999));
        for j in [&january, &february, &unposted] {
            store.insert_journal(j.clone()).unwrap();
        }
        for j in [&january, &february] {
            store
                .commit_posting(batch(j, vec![]))
                .unwrap();
        }
        for row in rows_for(&unposted) {
            store.append(row).unwrap();
        }

        let balance = |account: &Account, as_of| {
            store.account_balance(c, *account.id(), as_of).unwrap().amount()
        };
        assert_eq!(balance(&cash, d(2024, 1, 31)), dec!(100));
        assert_eq!(balance(&cash, d(2024, 2, 29)), dec!(150));
        assert_eq!(balance(&sales, d(2024, 2, 29)), dec!(-150));

        let lines = store.by_company(c, DateRange::through(d(2024, 12, 31))).unwrap();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].transaction_date, d(2024, 1, 10));
        assert_eq!(lines[0].account_code, "1-1100");
        assert_eq!(lines[3].transaction_date, d(2024, 2, 10));

        let activity = store
            .activity_by_account(c, DateRange::new(d(2024, 2, 1), d(2024, 2, 29)).unwrap())
            .unwrap();
        assert_eq!(activity[cash.id()].debit, dec!(50));
        assert_eq!(activity[sales.id()].credit, dec!(50));
    }

    #[test]
    fn commit_posting_is_all_or_nothing() {
        let store = InMemoryAccountingStore::new();
        let c = CompanyId::new();
        let cash = open(&store, c, "1-1100", AccountCategory::CurrentAsset);
        let sales = open(&store, c, "4-1000", AccountCategory::OperatingRevenue);
        let journal = draft(c, 1, d(2024, 1, 10), &cash, &sales, dec!(100));
        store.insert_journal(journal.clone()).unwrap();

        let mut rows = rows_for(&journal);
        rows.push(LedgerRow::new(
            c,
            AccountId::new(),
            *journal.id(),
            tallybook_core::EntryId::new(),
            dec!(1),
            Decimal::ZERO,
            SignedBalance::ZERO,
            "",
            Utc::now(),
        ));

        let err = store
            .commit_posting(PostingBatch {
                rows,
                ..batch(&journal, vec![])
            })
            .unwrap_err();

        assert!(matches!(err, StoreError::NotFound(_)));
        let stored = store.journal(c, *journal.id()).unwrap().unwrap();
        assert_eq!(stored.status(), JournalStatus::Draft);
        assert!(store.by_company(c, DateRange::through(d(2030, 1, 1))).unwrap().is_empty());
    }

    #[test]
    fn stale_versions_are_rejected() {
        let store = InMemoryAccountingStore::new();
        let c = CompanyId::new();
        let cash = open(&store, c, "1-1100", AccountCategory::CurrentAsset);
        let sales = open(&store, c, "4-1000", AccountCategory::OperatingRevenue);
        let journal = draft(c, 1, d(2024, 1, 10), &cash, &sales, dec!(100));
        store.insert_journal(journal.clone()).unwrap();

        let err = store
            .replace_journal(posted(&journal), ExpectedVersion::Exact(journal.version() + 1))
            .unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
    }

    #[test]
    fn journals_are_listed_newest_first() {
        let store = InMemoryAccountingStore::new();
        let c = CompanyId::new();
        let cash = open(&store, c, "1-1100", AccountCategory::CurrentAsset);
        let sales = open(&store, c, "4-1000", AccountCategory::OperatingRevenue);

        let older = draft(c, 1, d(2024, 1, 5), &cash, &sales, dec!(1));
        let same_day_first = draft(c, 2, d(2024, 1, 9), &cash, &sales, dec!(1));
        let same_day_second = draft(c, 3, d(2024, 1, 9), &cash, &sales, dec!(1));
        for j in [&older, &same_day_second, &same_day_first] {
            store.insert_journal(j.clone()).unwrap();
        }

        let listed = store.journals(c, DateRange::through(d(2024, 1, 31))).unwrap();
        let numbers: Vec<&str> = listed.iter().map(|j| j.number().as_str()).collect();
        assert_eq!(numbers, ["JRN/202401/0003", "JRN/202401/0002", "JRN/202401/0001"]);
    }

    #[test]
    fn account_updates_never_touch_the_cached_balance() {
        let store = InMemoryAccountingStore::new();
        let c = CompanyId::new();
        let cash = open(&store, c, "1-1100", AccountCategory::CurrentAsset);
        let sales = open(&store, c, "4-1000", AccountCategory::OperatingRevenue);
        let journal = draft(c, 1, d(2024, 1, 10), &cash, &sales, dec!(100));
        store.insert_journal(journal.clone()).unwrap();

        store
            .commit_posting(batch(&journal, vec![to_balance(&cash, dec!(0), dec!(100))]))
            .unwrap();
        let renamed = store
            .update_account(
                c,
                *cash.id(),
                AccountUpdate {
                    name: Some("Cash on hand".into()),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();

        assert_eq!(renamed.name(), "Cash on hand");
        assert_eq!(renamed.balance().amount(), dec!(100));
        let foreign = store
            .update_account(CompanyId::new(), *cash.id(), AccountUpdate::default())
            .unwrap();
        assert!(foreign.is_none());
    }

    #[test]
    fn posting_writes_balances_without_undoing_a_rename() {
        let store = InMemoryAccountingStore::new();
        let c = CompanyId::new();
        let cash = open(&store, c, "1-1100", AccountCategory::CurrentAsset);
        let sales = open(&store, c, "4-1000", AccountCategory::OperatingRevenue);
        let journal = draft(c, 1, d(2024, 1, 10), &cash, &sales, dec!(100));
        store.insert_journal(journal.clone()).unwrap();

        store
            .update_account(
                c,
                *cash.id(),
                AccountUpdate {
                    name: Some("Petty cash".into()),
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .commit_posting(batch(&journal, vec![to_balance(&cash, dec!(0), dec!(100))]))
            .unwrap();

        let stored = store.account(c, *cash.id()).unwrap().unwrap();
        assert_eq!(stored.name(), "Petty cash");
        assert!(!stored.is_active());
        assert_eq!(stored.balance().amount(), dec!(100));
    }

    #[test]
    fn commit_fails_when_the_ledger_moved_since_it_was_read() {
        let store = InMemoryAccountingStore::new();
        let c = CompanyId::new();
        let cash = open(&store, c, "1-1100", AccountCategory::CurrentAsset);
        let sales = open(&store, c, "4-1000", AccountCategory::OperatingRevenue);
        let first = draft(c, 1, d(2024, 1, 10), &cash, &sales, dec!(100));
        let second = draft(c, 2, d(2024, 1, 11), &cash, &sales, dec!(40));
        store.insert_journal(first.clone()).unwrap();
        store.insert_journal(second.clone()).unwrap();

        // Both balances were computed from an empty ledger; the second commit is stale.
        store
            .commit_posting(batch(&first, vec![to_balance(&cash, dec!(0), dec!(100))]))
            .unwrap();
        let err = store
            .commit_posting(batch(&second, vec![to_balance(&cash, dec!(0), dec!(40))]))
            .unwrap_err();

        assert!(matches!(err, StoreError::Concurrency(_)));
        let cached = store.account(c, *cash.id()).unwrap().unwrap().balance();
        assert_eq!(cached.amount(), dec!(100));
        assert_eq!(
            store.journal(c, *second.id()).unwrap().unwrap().status(),
            JournalStatus::Draft
        );
        assert!(store.journal_rows(c, *second.id()).unwrap().is_empty());
    }

    #[test]
    fn journal_sequences_are_not_handed_out_twice() {
        let store = InMemoryAccountingStore::new();
        let c = CompanyId::new();
        let cash = open(&store, c, "1-1100", AccountCategory::CurrentAsset);
        let sales = open(&store, c, "4-1000", AccountCategory::OperatingRevenue);
        let period = JournalNumber::period_prefix("JRN", d(2024, 1, 1));

        assert_eq!(store.next_journal_sequence(c, &period).unwrap(), 1);
        assert_eq!(store.next_journal_sequence(c, &period).unwrap(), 2);
        let latest = draft(c, 2, d(2024, 1, 10), &cash, &sales, dec!(1));
        store.insert_journal(latest.clone()).unwrap();
        store
            .remove_journal(c, *latest.id(), ExpectedVersion::Exact(latest.version()))
            .unwrap();

        assert_eq!(store.next_journal_sequence(c, &period).unwrap(), 3);
        assert_eq!(store.next_journal_sequence(CompanyId::new(), &period).unwrap(), 1);
    }
}
