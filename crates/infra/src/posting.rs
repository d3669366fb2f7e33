//! Journal lifecycle orchestration.
//!
//! ```text
//! command
//!   ↓
//! 1. take the company's posting lock
//!   ↓
//! 2. load the journal, decide events (pure aggregate logic)
//!   ↓
//! 3. persist the new state (posting: journal + ledger rows + balances in one batch)
//!   ↓
//! 4. publish the events for the audit trail
//! ```
//!
//! Step 3 carries the journal's expected version, so a write based on a stale read
//! is rejected by the store. Publication happens only after persistence succeeds and
//! its failure never undoes the committed change.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use tallybook_accounting::{
    Account, AccountingError, CashDirection, CashMovement, CreateJournal, DeleteJournal,
    EntryLine, Journal, JournalCommand, JournalEvent, JournalStatus, JournalValidator, LedgerRow,
    PostJournal, RawBalance, SignedBalance, UpdateJournal, VoidJournal,
};
use tallybook_core::{
    AccountId, Aggregate, AggregateRoot, CompanyId, DateRange, Entity, ExpectedVersion, JournalId, UserId,
};
use tallybook_events::{EventBus, EventEnvelope};

use crate::error::{EngineError, EngineResult};
use crate::numbering::JournalNumberGenerator;
use crate::store::{AccountingStore, BalanceUpdate, PostingBatch, StoreError};

/// `aggregate_type` of journal event envelopes.
pub const JOURNAL_AGGREGATE_TYPE: &str = "accounting.journal";

/// Input for creating a draft journal. Number and id are assigned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJournal {
    pub company_id: CompanyId,
    pub transaction_date: NaiveDate,
    pub description: String,
    pub entries: Vec<EntryLine>,
    pub created_by: UserId,
}

/// A cash or bank movement to record as a two-entry draft journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashEntry {
    pub company_id: CompanyId,
    pub cash_account_id: AccountId,
    pub contra_account_id: AccountId,
    pub amount: Decimal,
    pub transaction_date: NaiveDate,
    pub description: String,
    pub created_by: UserId,
}

#[derive(Debug)]
pub struct JournalPostingEngine<S, B> {
    store: S,
    bus: B,
    numbers: JournalNumberGenerator,
    company_locks: Mutex<HashMap<CompanyId, Arc<Mutex<()>>>>,
}

/// An account touched by the journal being posted.
struct Touched {
    account: Account,
    /// Raw ledger balance through the posting date, before this journal.
    observed: RawBalance,
    opening: SignedBalance,
    /// Signed movement of this journal's earlier entries.
    moved: Decimal,
}

fn poisoned() -> EngineError {
    StoreError::Unavailable("posting lock poisoned".to_string()).into()
}

impl<S, B> JournalPostingEngine<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            numbers: JournalNumberGenerator::default(),
            company_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_numbering(mut self, numbers: JournalNumberGenerator) -> Self {
        self.numbers = numbers;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutex serializing every journal write of one company.
    fn company_lock(&self, company_id: CompanyId) -> EngineResult<Arc<Mutex<()>>> {
        let mut locks = self.company_locks.lock().map_err(|_| poisoned())?;
        Ok(locks.entry(company_id).or_default().clone())
    }
}

fn hold(lock: &Mutex<()>) -> EngineResult<MutexGuard<'_, ()>> {
    lock.lock().map_err(|_| poisoned())
}

impl<S, B> JournalPostingEngine<S, B>
where
    S: AccountingStore,
    B: EventBus<EventEnvelope<JournalEvent>>,
{
    /// Create a draft journal with the next number of its company and month.
    pub fn create(&self, input: NewJournal) -> EngineResult<Journal> {
        let lock = self.company_lock(input.company_id)?;
        let _guard = hold(&lock)?;

        // Refuse bad input before a number is reserved for it.
        JournalValidator::validate(&input.entries).map_err(AccountingError::Validation)?;
        self.ensure_postable(input.company_id, input.entries.iter().map(|e| e.account_id))?;

        let number = self
            .numbers
            .next(&self.store, input.company_id, input.transaction_date)?;
        let journal_id = JournalId::new();
        let empty = Journal::empty(journal_id, input.company_id);

        let (journal, events) = execute(
            &empty,
            JournalCommand::Create(CreateJournal {
                company_id: input.company_id,
                journal_id,
                number,
                transaction_date: input.transaction_date,
                description: input.description,
                entries: input.entries,
                created_by: input.created_by,
                occurred_at: Utc::now(),
            }),
        )?;

        self.store.insert_journal(journal.clone())?;
        self.publish(&empty, &events);

        info!(
            company_id = %journal.company_id(),
            journal_id = %journal_id,
            number = %journal.number(),
            "journal created"
        );
        Ok(journal)
    }

    /// Record money coming into a cash/bank account (cash debit, contra credit).
    pub fn cash_in(&self, entry: CashEntry) -> EngineResult<Journal> {
        self.record_cash(CashDirection::In, entry)
    }

    /// Record money leaving a cash/bank account (contra debit, cash credit).
    pub fn cash_out(&self, entry: CashEntry) -> EngineResult<Journal> {
        self.record_cash(CashDirection::Out, entry)
    }

    fn record_cash(&self, direction: CashDirection, entry: CashEntry) -> EngineResult<Journal> {
        let movement = CashMovement {
            direction,
            cash_account_id: entry.cash_account_id,
            contra_account_id: entry.contra_account_id,
            amount: entry.amount,
            description: entry.description.clone(),
        };

        self.create(NewJournal {
            company_id: entry.company_id,
            transaction_date: entry.transaction_date,
            description: entry.description,
            entries: movement.entry_lines()?,
            created_by: entry.created_by,
        })
    }

    pub fn get(&self, company_id: CompanyId, journal_id: JournalId) -> EngineResult<Journal> {
        self.load(company_id, journal_id)
    }

    /// Journals dated within `range`, newest first.
    pub fn list(&self, company_id: CompanyId, range: DateRange) -> EngineResult<Vec<Journal>> {
        Ok(self.store.journals(company_id, range)?)
    }

    pub fn list_by_status(
        &self,
        company_id: CompanyId,
        status: JournalStatus,
    ) -> EngineResult<Vec<Journal>> {
        Ok(self.store.journals_by_status(company_id, status)?)
    }

    /// Replace date, description and entries of a draft.
    pub fn update(&self, cmd: UpdateJournal) -> EngineResult<Journal> {
        let lock = self.company_lock(cmd.company_id)?;
        let _guard = hold(&lock)?;

        let current = self.load(cmd.company_id, cmd.journal_id)?;
        let (journal, events) = execute(&current, JournalCommand::Update(cmd))?;
        self.ensure_postable(
            journal.company_id(),
            journal.entries().iter().map(|e| e.account_id),
        )?;

        self.store
            .replace_journal(journal.clone(), ExpectedVersion::Exact(current.version()))?;
        self.publish(&current, &events);
        Ok(journal)
    }

    /// Hard-delete a draft together with its entries.
    pub fn delete(&self, cmd: DeleteJournal) -> EngineResult<()> {
        let lock = self.company_lock(cmd.company_id)?;
        let _guard = hold(&lock)?;

        let current = self.load(cmd.company_id, cmd.journal_id)?;
        let (_, events) = execute(&current, JournalCommand::Delete(cmd.clone()))?;

        self.store.remove_journal(
            cmd.company_id,
            cmd.journal_id,
            ExpectedVersion::Exact(current.version()),
        )?;
        self.publish(&current, &events);

        info!(
            company_id = %cmd.company_id,
            number = %current.number(),
            "draft journal deleted"
        );
        Ok(())
    }

    /// Post a draft: one ledger row per entry and the new cached account balances,
    /// committed together with the status change.
    ///
    /// Each entry starts from the account's signed ledger balance as of the posting
    /// date (`occurred_at`), not the journal's transaction date. Earlier entries of
    /// the same journal count towards that balance when the journal is not dated
    /// after the posting date.
    pub fn post(&self, cmd: PostJournal) -> EngineResult<Journal> {
        let lock = self.company_lock(cmd.company_id)?;
        let _guard = hold(&lock)?;

        let current = self.load(cmd.company_id, cmd.journal_id)?;
        let (posted, events) = execute(&current, JournalCommand::Post(cmd.clone()))?;

        let company_id = cmd.company_id;
        let posting_date = cmd.occurred_at.date_naive();
        let counts_own_rows = posted.transaction_date() <= posting_date;

        let mut touched: HashMap<AccountId, Touched> = HashMap::new();
        let mut rows = Vec::with_capacity(posted.entries().len());

        for entry in posted.entries() {
            let slot = match touched.entry(entry.account_id) {
                Entry::Occupied(slot) => slot.into_mut(),
                Entry::Vacant(slot) => {
                    let account = self.load_account(company_id, entry.account_id)?;
                    let observed = self
                        .store
                        .account_balance(company_id, entry.account_id, posting_date)?;
                    slot.insert(Touched {
                        opening: account.normal_side().sign(observed),
                        observed,
                        account,
                        moved: Decimal::ZERO,
                    })
                }
            };

            let prior = if counts_own_rows {
                slot.opening.adjusted_by(slot.moved)
            } else {
                slot.opening
            };
            let delta = slot.account.normal_side().delta(entry.debit, entry.credit);
            let balance = prior.adjusted_by(delta);
            slot.moved += delta;
            slot.account.record_posted_balance(balance)?;

            let description = if entry.description.is_empty() {
                posted.description().to_string()
            } else {
                entry.description.clone()
            };
            rows.push(LedgerRow::new(
                company_id,
                entry.account_id,
                cmd.journal_id,
                entry.id,
                entry.debit,
                entry.credit,
                balance,
                description,
                cmd.occurred_at,
            ));
        }

        let balances = touched
            .into_values()
            .map(|t| BalanceUpdate {
                account_id: *t.account.id(),
                observed: t.observed,
                balance: t.account.balance(),
            })
            .collect();

        let row_count = rows.len();
        self.store.commit_posting(PostingBatch {
            journal: posted.clone(),
            expected_version: ExpectedVersion::Exact(current.version()),
            as_of: posting_date,
            rows,
            balances,
        })?;
        self.publish(&current, &events);

        info!(
            company_id = %company_id,
            number = %posted.number(),
            rows = row_count,
            "journal posted"
        );
        Ok(posted)
    }

    /// Mark a posted journal voided. Ledger rows stay; reports skip them because
    /// they only read posted journals. Cached account balances are left as they are.
    pub fn void(&self, cmd: VoidJournal) -> EngineResult<Journal> {
        let lock = self.company_lock(cmd.company_id)?;
        let _guard = hold(&lock)?;

        let current = self.load(cmd.company_id, cmd.journal_id)?;
        let (voided, events) = execute(&current, JournalCommand::Void(cmd))?;

        self.store
            .replace_journal(voided.clone(), ExpectedVersion::Exact(current.version()))?;
        self.publish(&current, &events);

        info!(
            company_id = %voided.company_id(),
            number = %voided.number(),
            "journal voided"
        );
        Ok(voided)
    }

    fn load(&self, company_id: CompanyId, journal_id: JournalId) -> EngineResult<Journal> {
        self.store
            .journal(company_id, journal_id)?
            .ok_or_else(|| AccountingError::JournalNotFound(journal_id).into())
    }

    fn load_account(&self, company_id: CompanyId, account_id: AccountId) -> EngineResult<Account> {
        self.store
            .account(company_id, account_id)?
            .ok_or_else(|| AccountingError::AccountNotFound(account_id.to_string()).into())
    }

    /// Every entry must reference an active, non-header account of the company.
    fn ensure_postable(
        &self,
        company_id: CompanyId,
        account_ids: impl IntoIterator<Item = AccountId>,
    ) -> EngineResult<()> {
        for account_id in account_ids {
            self.load_account(company_id, account_id)?.ensure_postable()?;
        }
        Ok(())
    }

    /// Best-effort: the change is already committed, so a failed publish is logged only.
    fn publish(&self, before: &Journal, events: &[JournalEvent]) {
        for (offset, event) in (1u64..).zip(events) {
            let envelope = EventEnvelope::new(
                before.company_id(),
                *before.id(),
                JOURNAL_AGGREGATE_TYPE,
                before.version() + offset,
                event.clone(),
            );
            if let Err(err) = self.bus.publish(envelope) {
                warn!(
                    journal_id = %before.id(),
                    error = ?err,
                    "failed to publish journal event"
                );
            }
        }
    }
}

/// Run `command` against `journal` and return the resulting state with its events.
fn execute(
    journal: &Journal,
    command: JournalCommand,
) -> EngineResult<(Journal, Vec<JournalEvent>)> {
    let events = journal.handle(&command)?;
    let mut next = journal.clone();
    for event in &events {
        next.apply(event);
    }
    Ok((next, events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AccountRegistry;
    use crate::store::{AccountStore, InMemoryAccountingStore, JournalStore, LedgerStore};
    use rust_decimal_macros::dec;
    use tallybook_accounting::JournalAction;
    use tallybook_core::Entity;
    use tallybook_events::InMemoryEventBus;

    type Engine = JournalPostingEngine<
        Arc<InMemoryAccountingStore>,
        Arc<InMemoryEventBus<EventEnvelope<JournalEvent>>>,
    >;

    struct Fixture {
        engine: Engine,
        bus: Arc<InMemoryEventBus<EventEnvelope<JournalEvent>>>,
        company_id: CompanyId,
        cash: AccountId,
        sales: AccountId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryAccountingStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let company_id = CompanyId::new();
        let registry = AccountRegistry::new(store.clone());
        registry.seed_default_chart(company_id).unwrap();
        let cash = *registry.find_by_code(company_id, "1-1100").unwrap().id();
        let sales = *registry.find_by_code(company_id, "4-1000").unwrap().id();

        Fixture {
            engine: JournalPostingEngine::new(store, bus.clone()),
            bus,
            company_id,
            cash,
            sales,
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn line(account_id: AccountId, debit: Decimal, credit: Decimal, position: u32) -> EntryLine {
        EntryLine {
            account_id,
            description: String::new(),
            debit,
            credit,
            position,
        }
    }

    fn sale(f: &Fixture, date: NaiveDate, amount: Decimal) -> NewJournal {
        NewJournal {
            company_id: f.company_id,
            transaction_date: date,
            description: "Cash sale".into(),
            entries: vec![
                line(f.cash, amount, Decimal::ZERO, 1),
                line(f.sales, Decimal::ZERO, amount, 2),
            ],
            created_by: UserId::new(),
        }
    }

    fn post_cmd(f: &Fixture, journal: &Journal) -> PostJournal {
        PostJournal {
            company_id: f.company_id,
            journal_id: *journal.id(),
            posted_by: UserId::new(),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn numbers_follow_the_month_and_skip_deleted_gaps() {
        let f = fixture();
        let first = f.engine.create(sale(&f, d(2024, 3, 1), dec!(10))).unwrap();
        let second = f.engine.create(sale(&f, d(2024, 3, 2), dec!(10))).unwrap();
        let april = f.engine.create(sale(&f, d(2024, 4, 2), dec!(10))).unwrap();

        assert_eq!(first.number().as_str(), "JRN/202403/0001");
        assert_eq!(second.number().as_str(), "JRN/202403/0002");
        assert_eq!(april.number().as_str(), "JRN/202404/0001");

        f.engine
            .delete(DeleteJournal {
                company_id: f.company_id,
                journal_id: *first.id(),
                deleted_by: UserId::new(),
                occurred_at: Utc::now(),
            })
            .unwrap();
        let third = f.engine.create(sale(&f, d(2024, 3, 3), dec!(10))).unwrap();
        assert_eq!(third.number().as_str(), "JRN/202403/0003");

        // Deleting the latest draft of the month does not free its number either.
        f.engine
            .delete(DeleteJournal {
                company_id: f.company_id,
                journal_id: *third.id(),
                deleted_by: UserId::new(),
                occurred_at: Utc::now(),
            })
            .unwrap();
        let fourth = f.engine.create(sale(&f, d(2024, 3, 4), dec!(10))).unwrap();
        assert_eq!(fourth.number().as_str(), "JRN/202403/0004");
    }

    #[test]
    fn rejected_journals_do_not_use_up_a_number() {
        let f = fixture();
        let mut unbalanced = sale(&f, d(2024, 6, 1), dec!(100));
        unbalanced.entries[1].credit = dec!(90);
        assert!(matches!(
            f.engine.create(unbalanced),
            Err(EngineError::Accounting(AccountingError::Validation(_)))
        ));

        let journal = f.engine.create(sale(&f, d(2024, 6, 1), dec!(100))).unwrap();
        assert_eq!(journal.number().as_str(), "JRN/202406/0001");
    }

    #[test]
    fn header_and_unknown_accounts_are_refused_at_creation() {
        let f = fixture();
        let header = *AccountRegistry::new(f.engine.store().clone())
            .find_by_code(f.company_id, "1-0000")
            .unwrap()
            .id();

        let mut input = sale(&f, d(2024, 1, 1), dec!(5));
        input.entries[0].account_id = header;
        assert!(matches!(
            f.engine.create(input),
            Err(EngineError::Accounting(AccountingError::HeaderAccountPosting(_)))
        ));

        let mut input = sale(&f, d(2024, 1, 1), dec!(5));
        input.entries[1].account_id = AccountId::new();
        assert!(matches!(
            f.engine.create(input),
            Err(EngineError::Accounting(AccountingError::AccountNotFound(_)))
        ));
        assert!(f.engine.list_by_status(f.company_id, JournalStatus::Draft).unwrap().is_empty());
    }

    #[test]
    fn posting_writes_one_row_per_entry_and_signed_balances() {
        let f = fixture();
        let journal = f.engine.create(sale(&f, d(2024, 1, 10), dec!(100.00))).unwrap();
        let posted = f.engine.post(post_cmd(&f, &journal)).unwrap();

        assert_eq!(posted.status(), JournalStatus::Posted);
        let store = f.engine.store();
        let lines = store
            .by_company(f.company_id, DateRange::through(d(2024, 12, 31)))
            .unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].row.balance().amount(), dec!(100.00));
        assert_eq!(lines[1].row.balance().amount(), dec!(100.00));

        let cash = store.account(f.company_id, f.cash).unwrap().unwrap();
        let sales = store.account(f.company_id, f.sales).unwrap().unwrap();
        assert_eq!(cash.balance().amount(), dec!(100.00));
        assert_eq!(sales.balance().amount(), dec!(100.00));
    }

    #[test]
    fn repeated_account_in_one_journal_accumulates() {
        let f = fixture();
        let journal = f
            .engine
            .create(NewJournal {
                company_id: f.company_id,
                transaction_date: d(2024, 1, 10),
                description: "split".into(),
                entries: vec![
                    line(f.cash, dec!(30), Decimal::ZERO, 1),
                    line(f.cash, dec!(70), Decimal::ZERO, 2),
                    line(f.sales, Decimal::ZERO, dec!(100), 3),
                ],
                created_by: UserId::new(),
            })
            .unwrap();
        f.engine.post(post_cmd(&f, &journal)).unwrap();

        let cash = f.engine.store().account(f.company_id, f.cash).unwrap().unwrap();
        assert_eq!(cash.balance().amount(), dec!(100));
    }

    #[test]
    fn posting_twice_conflicts_and_leaves_the_ledger_alone() {
        let f = fixture();
        let journal = f.engine.create(sale(&f, d(2024, 1, 10), dec!(100))).unwrap();
        f.engine.post(post_cmd(&f, &journal)).unwrap();

        let err = f.engine.post(post_cmd(&f, &journal)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Accounting(AccountingError::StateConflict {
                action: JournalAction::Post,
                ..
            })
        ));
        let lines = f
            .engine
            .store()
            .by_company(f.company_id, DateRange::through(d(2024, 12, 31)))
            .unwrap();
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn void_keeps_rows_but_hides_them_from_posted_queries() {
        let f = fixture();
        let journal = f.engine.create(sale(&f, d(2024, 1, 10), dec!(100))).unwrap();
        f.engine.post(post_cmd(&f, &journal)).unwrap();
        let voided = f
            .engine
            .void(VoidJournal {
                company_id: f.company_id,
                journal_id: *journal.id(),
                voided_by: UserId::new(),
                occurred_at: Utc::now(),
            })
            .unwrap();

        assert_eq!(voided.status(), JournalStatus::Voided);
        let store = f.engine.store();
        assert_eq!(
            store.account_balance(f.company_id, f.cash, d(2024, 12, 31)).unwrap().amount(),
            Decimal::ZERO
        );
        let cash = store.account(f.company_id, f.cash).unwrap().unwrap();
        assert_eq!(cash.balance().amount(), dec!(100), "cached balance is not rolled back");
    }

    #[test]
    fn events_are_published_after_each_change() {
        let f = fixture();
        let sub = f.bus.subscribe();
        let journal = f.engine.create(sale(&f, d(2024, 1, 10), dec!(1))).unwrap();
        f.engine.post(post_cmd(&f, &journal)).unwrap();

        let created = sub.try_recv().unwrap();
        let posted = sub.try_recv().unwrap();
        assert!(matches!(created.payload(), JournalEvent::Created(_)));
        assert_eq!(created.sequence_number(), 1);
        assert!(matches!(posted.payload(), JournalEvent::Posted(_)));
        assert_eq!(posted.sequence_number(), 2);
        assert_eq!(posted.aggregate_type(), JOURNAL_AGGREGATE_TYPE);
    }

    #[test]
    fn cash_out_builds_a_balanced_draft() {
        let f = fixture();
        let rent = *AccountRegistry::new(f.engine.store().clone())
            .find_by_code(f.company_id, "5-1200")
            .unwrap()
            .id();

        let journal = f
            .engine
            .cash_out(CashEntry {
                company_id: f.company_id,
                cash_account_id: f.cash,
                contra_account_id: rent,
                amount: dec!(250),
                transaction_date: d(2024, 5, 1),
                description: "May rent".into(),
                created_by: UserId::new(),
            })
            .unwrap();

        assert_eq!(journal.status(), JournalStatus::Draft);
        assert_eq!(journal.entries()[0].account_id, rent);
        assert_eq!(journal.entries()[1].account_id, f.cash);
        assert_eq!(journal.total_credit(), dec!(250));
    }

    #[test]
    fn journals_of_other_companies_are_invisible() {
        let f = fixture();
        let journal = f.engine.create(sale(&f, d(2024, 1, 10), dec!(1))).unwrap();

        assert!(matches!(
            f.engine.get(CompanyId::new(), *journal.id()),
            Err(EngineError::Accounting(AccountingError::JournalNotFound(_)))
        ));
        assert!(f.engine.store().journal(f.company_id, *journal.id()).unwrap().is_some());
    }
}
