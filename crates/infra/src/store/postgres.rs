//! Postgres-backed accounting store.
//!
//! Accounts, journals, journal entries and ledger rows live in one database, so a
//! posting batch is written in a single transaction.
//!
//! ## Error Mapping
//!
//! | SQLx Error | Code | StoreError | Scenario |
//! |------------|------|------------|----------|
//! | Database (unique violation) | `23505` | `Duplicate` | Account code or number taken |
//! | Database (foreign key violation) | `23503` | `NotFound` | Unknown account or journal |
//! | Database (serialization failure) | `40001` | `Concurrency` | Conflicting transaction |
//! | Database (deadlock) | `40P01` | `Concurrency` | Conflicting transaction |
//! | Database (other) | Any other | `Unavailable` | Other database errors |
//! | PoolClosed / Io / other | N/A | `Unavailable` | Connection or decode failures |
//!
//! ## Concurrency
//!
//! `commit_posting` locks the journal row and every touched account row
//! (`SELECT ... FOR UPDATE`, accounts in id order), then re-reads the raw ledger
//! balance of each account. A balance that moved since the engine read it fails the
//! batch with `StoreError::Concurrency`, so two processes posting against the same
//! account can never both commit a cached balance computed from the same snapshot.
//! `update_account` is a single `UPDATE` of the whitelisted columns and never writes
//! the balance column.
//!
//! ## Sync bridge
//!
//! The store traits are synchronous. Each trait method runs its async counterpart
//! on the current tokio runtime through `block_in_place`, which needs the
//! multi-threaded runtime (the API server's `#[tokio::main]`).

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use tallybook_accounting::{
    Account, AccountActivity, AccountCategory, AccountRecord, AccountUpdate, Journal,
    JournalEntry, JournalNumber, JournalRecord, JournalStatus, LedgerRow, LedgerRowRecord,
    RawBalance, SignedBalance,
};
use tallybook_core::{
    AccountId, AggregateRoot, CompanyId, DateRange, EntryId, Entity, ExpectedVersion, JournalId,
    LedgerRowId, UserId,
};

use super::r#trait::{
    AccountStore, JournalStore, LedgerLine, LedgerStore, PostingBatch, StoreError,
};

/// Tables and indexes, created idempotently by [`PostgresAccountingStore::migrate`].
///
/// Amounts are unconstrained `NUMERIC` so decimals round-trip exactly. The script
/// runs as one implicit transaction; the advisory lock keeps concurrent callers from
/// racing on `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = r#"
SELECT pg_advisory_xact_lock(7347021);

CREATE TABLE IF NOT EXISTS accounts (
    id          UUID PRIMARY KEY,
    company_id  UUID NOT NULL,
    code        TEXT NOT NULL,
    name        TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    category    TEXT NOT NULL,
    parent_id   UUID,
    level       SMALLINT NOT NULL,
    is_header   BOOLEAN NOT NULL,
    is_active   BOOLEAN NOT NULL,
    balance     NUMERIC NOT NULL DEFAULT 0,
    created_at  TIMESTAMPTZ NOT NULL,
    UNIQUE (company_id, code)
);

CREATE TABLE IF NOT EXISTS journals (
    id               UUID PRIMARY KEY,
    company_id       UUID NOT NULL,
    number           TEXT NOT NULL,
    transaction_date DATE NOT NULL,
    description      TEXT NOT NULL,
    status           TEXT NOT NULL,
    created_by       UUID NOT NULL,
    created_at       TIMESTAMPTZ NOT NULL,
    updated_at       TIMESTAMPTZ NOT NULL,
    posted_at        TIMESTAMPTZ,
    posted_by        UUID,
    version          BIGINT NOT NULL,
    UNIQUE (company_id, number)
);

CREATE INDEX IF NOT EXISTS journals_company_date_idx
    ON journals (company_id, transaction_date);

CREATE TABLE IF NOT EXISTS journal_entries (
    id          UUID PRIMARY KEY,
    journal_id  UUID NOT NULL REFERENCES journals (id) ON DELETE CASCADE,
    account_id  UUID NOT NULL REFERENCES accounts (id),
    description TEXT NOT NULL,
    debit       NUMERIC NOT NULL,
    credit      NUMERIC NOT NULL,
    position    INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS journal_entries_journal_idx ON journal_entries (journal_id);

CREATE TABLE IF NOT EXISTS ledger_entries (
    seq         BIGSERIAL UNIQUE,
    id          UUID PRIMARY KEY,
    company_id  UUID NOT NULL,
    account_id  UUID NOT NULL REFERENCES accounts (id),
    journal_id  UUID NOT NULL REFERENCES journals (id),
    entry_id    UUID NOT NULL,
    debit       NUMERIC NOT NULL,
    credit      NUMERIC NOT NULL,
    balance     NUMERIC NOT NULL,
    description TEXT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS ledger_entries_account_idx
    ON ledger_entries (company_id, account_id);
CREATE INDEX IF NOT EXISTS ledger_entries_journal_idx ON ledger_entries (journal_id);

CREATE TABLE IF NOT EXISTS journal_sequences (
    company_id UUID NOT NULL,
    period     TEXT NOT NULL,
    last_value INTEGER NOT NULL,
    PRIMARY KEY (company_id, period)
);
"#;

const ACCOUNT_COLUMNS: &str = "id, company_id, code, name, description, category, parent_id, \
     level, is_header, is_active, balance, created_at";

const JOURNAL_COLUMNS: &str = "id, company_id, number, transaction_date, description, status, \
     created_by, created_at, updated_at, posted_at, posted_by, version";

const LEDGER_COLUMNS: &str = "l.id, l.company_id, l.account_id, l.journal_id, l.entry_id, \
     l.debit, l.credit, l.balance, l.description, l.created_at";

/// Posted rows of a company, optionally narrowed to one account, within a date range.
const POSTED_LINES: &str = r#"
    FROM ledger_entries l
    JOIN journals j ON j.id = l.journal_id AND j.company_id = l.company_id
    JOIN accounts a ON a.id = l.account_id AND a.company_id = l.company_id
    WHERE l.company_id = $1
      AND ($2::uuid IS NULL OR l.account_id = $2)
      AND j.status = 'posted'
      AND ($3::date IS NULL OR j.transaction_date >= $3)
      AND j.transaction_date <= $4
"#;

const RAW_BALANCE: &str = r#"
    SELECT COALESCE(SUM(l.debit - l.credit), 0)
    FROM ledger_entries l
    JOIN journals j ON j.id = l.journal_id AND j.company_id = l.company_id
    WHERE l.company_id = $1
      AND l.account_id = $2
      AND j.status = 'posted'
      AND j.transaction_date <= $3
"#;

/// Postgres-backed accounting store.
///
/// Every query filters on `company_id`, so one company's rows are never read or
/// written on behalf of another.
#[derive(Debug, Clone)]
pub struct PostgresAccountingStore {
    pool: Arc<PgPool>,
}

impl PostgresAccountingStore {
    /// Create a store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect to `database_url` and make sure the schema exists.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Create missing tables and indexes.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        debug!("accounting schema ready");
        Ok(())
    }

    async fn begin(&self, operation: &str) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }

    // ---- accounts ----

    #[instrument(
        skip(self, account),
        fields(company_id = %account.company_id(), code = %account.code()),
        err
    )]
    pub async fn insert_account_async(&self, account: Account) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, company_id, code, name, description, category, parent_id,
                level, is_header, is_active, balance, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(account.id().as_uuid())
        .bind(account.company_id().as_uuid())
        .bind(account.code())
        .bind(account.name())
        .bind(account.description())
        .bind(account.category().as_str())
        .bind(account.parent_id().map(|p| *p.as_uuid()))
        .bind(i16::from(account.level()))
        .bind(account.is_header())
        .bind(account.is_active())
        .bind(account.balance().amount())
        .bind(account.created_at())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_account", e))?;
        Ok(())
    }

    pub async fn account_async(
        &self,
        company_id: CompanyId,
        id: AccountId,
    ) -> Result<Option<Account>, StoreError> {
        let sql =
            format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE company_id = $1 AND id = $2");
        let row = sqlx::query(&sql)
            .bind(company_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("account", e))?;
        row.as_ref().map(account_from_row).transpose()
    }

    pub async fn account_by_code_async(
        &self,
        company_id: CompanyId,
        code: &str,
    ) -> Result<Option<Account>, StoreError> {
        let sql =
            format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE company_id = $1 AND code = $2");
        let row = sqlx::query(&sql)
            .bind(company_id.as_uuid())
            .bind(code)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("account_by_code", e))?;
        row.as_ref().map(account_from_row).transpose()
    }

    pub async fn accounts_async(&self, company_id: CompanyId) -> Result<Vec<Account>, StoreError> {
        let sql =
            format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE company_id = $1 ORDER BY code");
        let rows = sqlx::query(&sql)
            .bind(company_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("accounts", e))?;
        rows.iter().map(account_from_row).collect()
    }

    /// Writes only name, description and active flag; `balance` is never touched.
    #[instrument(skip(self, update), fields(company_id = %company_id, account_id = %id), err)]
    pub async fn update_account_async(
        &self,
        company_id: CompanyId,
        id: AccountId,
        update: AccountUpdate,
    ) -> Result<Option<Account>, StoreError> {
        update
            .validate()
            .map_err(|e| StoreError::Rejected(e.to_string()))?;

        let sql = format!(
            r#"
            UPDATE accounts
            SET name = COALESCE($3, name),
                description = COALESCE($4, description),
                is_active = COALESCE($5, is_active)
            WHERE company_id = $1 AND id = $2
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(company_id.as_uuid())
            .bind(id.as_uuid())
            .bind(update.name)
            .bind(update.description)
            .bind(update.is_active)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_account", e))?;
        row.as_ref().map(account_from_row).transpose()
    }

    // ---- journals ----

    #[instrument(
        skip(self, journal),
        fields(company_id = %journal.company_id(), number = %journal.number()),
        err
    )]
    pub async fn insert_journal_async(&self, journal: Journal) -> Result<(), StoreError> {
        let mut tx = self.begin("insert_journal").await?;
        sqlx::query(
            r#"
            INSERT INTO journals (
                id, company_id, number, transaction_date, description, status,
                created_by, created_at, updated_at, posted_at, posted_by, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(journal.id().as_uuid())
        .bind(journal.company_id().as_uuid())
        .bind(journal.number().as_str())
        .bind(journal.transaction_date())
        .bind(journal.description())
        .bind(journal.status().as_str())
        .bind(journal.created_by().as_uuid())
        .bind(journal.created_at())
        .bind(journal.updated_at())
        .bind(journal.posted_at())
        .bind(journal.posted_by().map(|u| *u.as_uuid()))
        .bind(version_to_db(journal.version())?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_journal", e))?;

        insert_entries(&mut tx, &journal).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("insert_journal", e))
    }

    pub async fn journal_async(
        &self,
        company_id: CompanyId,
        id: JournalId,
    ) -> Result<Option<Journal>, StoreError> {
        let sql =
            format!("SELECT {JOURNAL_COLUMNS} FROM journals WHERE company_id = $1 AND id = $2");
        let row = sqlx::query(&sql)
            .bind(company_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("journal", e))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut journals = self.with_entries(vec![row]).await?;
        Ok(journals.pop())
    }

    pub async fn journals_async(
        &self,
        company_id: CompanyId,
        range: DateRange,
    ) -> Result<Vec<Journal>, StoreError> {
        let sql = format!(
            r#"
            SELECT {JOURNAL_COLUMNS} FROM journals
            WHERE company_id = $1
              AND ($2::date IS NULL OR transaction_date >= $2)
              AND transaction_date <= $3
            ORDER BY transaction_date DESC, number DESC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(company_id.as_uuid())
            .bind(range.start().map(storable))
            .bind(storable(range.end()))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("journals", e))?;
        self.with_entries(rows).await
    }

    pub async fn journals_by_status_async(
        &self,
        company_id: CompanyId,
        status: JournalStatus,
    ) -> Result<Vec<Journal>, StoreError> {
        let sql = format!(
            r#"
            SELECT {JOURNAL_COLUMNS} FROM journals
            WHERE company_id = $1 AND status = $2
            ORDER BY transaction_date DESC, number DESC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(company_id.as_uuid())
            .bind(status.as_str())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("journals_by_status", e))?;
        self.with_entries(rows).await
    }

    #[instrument(
        skip(self, journal),
        fields(journal_id = %journal.id(), expected_version = ?expected_version),
        err
    )]
    pub async fn replace_journal_async(
        &self,
        journal: Journal,
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut tx = self.begin("replace_journal").await?;
        lock_journal(&mut tx, journal.company_id(), *journal.id(), expected_version).await?;

        sqlx::query(
            r#"
            UPDATE journals
            SET transaction_date = $3, description = $4, status = $5, updated_at = $6,
                posted_at = $7, posted_by = $8, version = $9
            WHERE company_id = $1 AND id = $2
            "#,
        )
        .bind(journal.company_id().as_uuid())
        .bind(journal.id().as_uuid())
        .bind(journal.transaction_date())
        .bind(journal.description())
        .bind(journal.status().as_str())
        .bind(journal.updated_at())
        .bind(journal.posted_at())
        .bind(journal.posted_by().map(|u| *u.as_uuid()))
        .bind(version_to_db(journal.version())?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("replace_journal", e))?;

        sqlx::query("DELETE FROM journal_entries WHERE journal_id = $1")
            .bind(journal.id().as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace_journal", e))?;
        insert_entries(&mut tx, &journal).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("replace_journal", e))
    }

    pub async fn remove_journal_async(
        &self,
        company_id: CompanyId,
        id: JournalId,
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut tx = self.begin("remove_journal").await?;
        lock_journal(&mut tx, company_id, id, expected_version).await?;

        sqlx::query("DELETE FROM journals WHERE company_id = $1 AND id = $2")
            .bind(company_id.as_uuid())
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("remove_journal", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("remove_journal", e))
    }

    /// Bumps the period's high-water mark. Numbers already stored for the period
    /// (imports, journals written before the mark existed) raise it first.
    pub async fn next_journal_sequence_async(
        &self,
        company_id: CompanyId,
        period: &str,
    ) -> Result<u32, StoreError> {
        let mut tx = self.begin("next_journal_sequence").await?;

        let numbers: Vec<String> = sqlx::query_scalar(
            "SELECT number FROM journals WHERE company_id = $1 AND left(number, length($2)) = $2",
        )
        .bind(company_id.as_uuid())
        .bind(period)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("next_journal_sequence", e))?;
        let stored = numbers
            .into_iter()
            .filter_map(|n| JournalNumber::restore(n).sequence_within(period))
            .max()
            .unwrap_or(0);
        let stored = i32::try_from(stored)
            .map_err(|_| StoreError::Unavailable(format!("sequence of {period} out of range")))?;

        let next: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO journal_sequences (company_id, period, last_value)
            VALUES ($1, $2, $3 + 1)
            ON CONFLICT (company_id, period)
            DO UPDATE SET last_value = GREATEST(journal_sequences.last_value, $3) + 1
            RETURNING last_value
            "#,
        )
        .bind(company_id.as_uuid())
        .bind(period)
        .bind(stored)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("next_journal_sequence", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("next_journal_sequence", e))?;
        u32::try_from(next)
            .map_err(|_| StoreError::Unavailable(format!("negative sequence for {period}")))
    }

    /// Attach entries to journal rows, keeping the row order.
    async fn with_entries(&self, rows: Vec<PgRow>) -> Result<Vec<Journal>, StoreError> {
        let ids: Vec<Uuid> = rows
            .iter()
            .map(|r| r.try_get::<Uuid, _>("id"))
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("journal_entries", e))?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let entry_rows = sqlx::query(
            r#"
            SELECT id, journal_id, account_id, description, debit, credit, position
            FROM journal_entries
            WHERE journal_id = ANY($1)
            ORDER BY position
            "#,
        )
        .bind(ids.as_slice())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("journal_entries", e))?;

        let mut entries: HashMap<Uuid, Vec<JournalEntry>> = HashMap::new();
        for row in &entry_rows {
            let journal_id: Uuid = get(row, "journal_id")?;
            entries.entry(journal_id).or_default().push(entry_from_row(row)?);
        }

        rows.iter()
            .map(|row| {
                let id: Uuid = get(row, "id")?;
                journal_from_row(row, entries.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    // ---- ledger ----

    pub async fn append_async(&self, row: LedgerRow) -> Result<(), StoreError> {
        let mut tx = self.begin("append").await?;
        let known: Option<bool> = sqlx::query_scalar(
            r#"
            SELECT EXISTS (SELECT 1 FROM accounts WHERE company_id = $1 AND id = $3)
            FROM journals WHERE company_id = $1 AND id = $2
            "#,
        )
        .bind(row.company_id().as_uuid())
        .bind(row.journal_id().as_uuid())
        .bind(row.account_id().as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("append", e))?;
        match known {
            None => return Err(StoreError::NotFound(format!("journal {}", row.journal_id()))),
            Some(false) => {
                return Err(StoreError::NotFound(format!("account {}", row.account_id())));
            }
            Some(true) => {}
        }

        insert_row(&mut tx, &row).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("append", e))
    }

    async fn posted_lines(
        &self,
        company_id: CompanyId,
        account_id: Option<AccountId>,
        range: DateRange,
    ) -> Result<Vec<LedgerLine>, StoreError> {
        let sql = format!(
            r#"
            SELECT {LEDGER_COLUMNS},
                   j.number AS journal_number, j.transaction_date,
                   a.code AS account_code, a.name AS account_name
            {POSTED_LINES}
            ORDER BY j.transaction_date, l.seq
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(company_id.as_uuid())
            .bind(account_id.map(|a| *a.as_uuid()))
            .bind(range.start().map(storable))
            .bind(storable(range.end()))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ledger_lines", e))?;

        rows.iter()
            .map(|row| {
                Ok(LedgerLine {
                    row: ledger_row_from_row(row)?,
                    journal_number: JournalNumber::restore(get::<String>(row, "journal_number")?),
                    transaction_date: get(row, "transaction_date")?,
                    account_code: get(row, "account_code")?,
                    account_name: get(row, "account_name")?,
                })
            })
            .collect()
    }

    pub async fn by_account_async(
        &self,
        company_id: CompanyId,
        account_id: AccountId,
        range: DateRange,
    ) -> Result<Vec<LedgerLine>, StoreError> {
        self.posted_lines(company_id, Some(account_id), range).await
    }

    pub async fn by_company_async(
        &self,
        company_id: CompanyId,
        range: DateRange,
    ) -> Result<Vec<LedgerLine>, StoreError> {
        self.posted_lines(company_id, None, range).await
    }

    pub async fn account_balance_async(
        &self,
        company_id: CompanyId,
        account_id: AccountId,
        as_of: NaiveDate,
    ) -> Result<RawBalance, StoreError> {
        let raw: Decimal = sqlx::query_scalar(RAW_BALANCE)
            .bind(company_id.as_uuid())
            .bind(account_id.as_uuid())
            .bind(storable(as_of))
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("account_balance", e))?;
        Ok(RawBalance::new(raw))
    }

    pub async fn activity_by_account_async(
        &self,
        company_id: CompanyId,
        range: DateRange,
    ) -> Result<HashMap<AccountId, AccountActivity>, StoreError> {
        let sql = format!(
            r#"
            SELECT l.account_id, SUM(l.debit) AS debit, SUM(l.credit) AS credit
            {POSTED_LINES}
            GROUP BY l.account_id
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(company_id.as_uuid())
            .bind(None::<Uuid>)
            .bind(range.start().map(storable))
            .bind(storable(range.end()))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("activity_by_account", e))?;

        let mut activity = HashMap::with_capacity(rows.len());
        for row in &rows {
            let account_id = AccountId::from_uuid(get(row, "account_id")?);
            let mut totals = AccountActivity::default();
            totals.record(get(row, "debit")?, get(row, "credit")?);
            activity.insert(account_id, totals);
        }
        Ok(activity)
    }

    pub async fn journal_rows_async(
        &self,
        company_id: CompanyId,
        journal_id: JournalId,
    ) -> Result<Vec<LedgerRow>, StoreError> {
        let sql = format!(
            r#"
            SELECT {LEDGER_COLUMNS} FROM ledger_entries l
            WHERE l.company_id = $1 AND l.journal_id = $2
            ORDER BY l.seq
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(company_id.as_uuid())
            .bind(journal_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("journal_rows", e))?;
        rows.iter().map(ledger_row_from_row).collect()
    }

    /// Apply a posting batch in one transaction.
    ///
    /// 1. Lock the journal row and check its version
    /// 2. Lock every touched account row, in id order
    /// 3. Check each account's raw ledger balance still equals what the batch observed
    /// 4. Insert ledger rows, write cached balances and the posted journal
    #[instrument(
        skip(self, batch),
        fields(
            company_id = %batch.journal.company_id(),
            journal_id = %batch.journal.id(),
            rows = batch.rows.len()
        ),
        err
    )]
    pub async fn commit_posting_async(&self, batch: PostingBatch) -> Result<(), StoreError> {
        let journal = &batch.journal;
        let company_id = journal.company_id();
        let journal_id = *journal.id();

        for row in &batch.rows {
            if row.company_id() != company_id || row.journal_id() != journal_id {
                return Err(StoreError::Concurrency(format!(
                    "ledger row for journal {} does not belong to the batch",
                    row.journal_id()
                )));
            }
        }

        let mut tx = self.begin("commit_posting").await?;
        lock_journal(&mut tx, company_id, journal_id, batch.expected_version).await?;

        let wanted: BTreeSet<Uuid> = batch
            .balances
            .iter()
            .map(|b| *b.account_id.as_uuid())
            .chain(batch.rows.iter().map(|r| *r.account_id().as_uuid()))
            .collect();
        let ids: Vec<Uuid> = wanted.iter().copied().collect();
        let locked = sqlx::query(
            r#"
            SELECT id, code, is_header FROM accounts
            WHERE company_id = $1 AND id = ANY($2)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(company_id.as_uuid())
        .bind(ids.as_slice())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("commit_posting", e))?;

        let mut headers: HashMap<Uuid, String> = HashMap::new();
        let mut found = BTreeSet::new();
        for row in &locked {
            let id: Uuid = get(row, "id")?;
            if get::<bool>(row, "is_header")? {
                headers.insert(id, get(row, "code")?);
            }
            found.insert(id);
        }
        if let Some(missing) = wanted.difference(&found).next() {
            return Err(StoreError::NotFound(format!("account {missing}")));
        }

        let as_of = storable(batch.as_of);
        for update in &batch.balances {
            let nonzero = !update.balance.amount().is_zero();
            if let Some(code) = headers.get(update.account_id.as_uuid()).filter(|_| nonzero) {
                return Err(StoreError::Rejected(format!(
                    "header account {code} cannot carry a balance"
                )));
            }
            let current: Decimal = sqlx::query_scalar(RAW_BALANCE)
                .bind(company_id.as_uuid())
                .bind(update.account_id.as_uuid())
                .bind(as_of)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("commit_posting", e))?;
            if RawBalance::new(current) != update.observed {
                return Err(StoreError::Concurrency(format!(
                    "ledger of account {} moved since it was read",
                    update.account_id
                )));
            }
        }

        for row in &batch.rows {
            insert_row(&mut tx, row).await?;
        }
        for update in &batch.balances {
            sqlx::query("UPDATE accounts SET balance = $3 WHERE company_id = $1 AND id = $2")
                .bind(company_id.as_uuid())
                .bind(update.account_id.as_uuid())
                .bind(update.balance.amount())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("commit_posting", e))?;
        }

        sqlx::query(
            r#"
            UPDATE journals
            SET status = $3, updated_at = $4, posted_at = $5, posted_by = $6, version = $7
            WHERE company_id = $1 AND id = $2
            "#,
        )
        .bind(company_id.as_uuid())
        .bind(journal_id.as_uuid())
        .bind(journal.status().as_str())
        .bind(journal.updated_at())
        .bind(journal.posted_at())
        .bind(journal.posted_by().map(|u| *u.as_uuid()))
        .bind(version_to_db(journal.version())?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("commit_posting", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_posting", e))
    }
}

/// Lock a journal row for the rest of the transaction and check its version.
async fn lock_journal(
    tx: &mut Transaction<'static, Postgres>,
    company_id: CompanyId,
    id: JournalId,
    expected: ExpectedVersion,
) -> Result<(), StoreError> {
    let version: Option<i64> = sqlx::query_scalar(
        "SELECT version FROM journals WHERE company_id = $1 AND id = $2 FOR UPDATE",
    )
    .bind(company_id.as_uuid())
    .bind(id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_journal", e))?;

    let current = version.ok_or_else(|| StoreError::NotFound(format!("journal {id}")))?;
    let current = version_from_db(current)?;
    if !expected.matches(current) {
        return Err(StoreError::Concurrency(format!(
            "journal {id}: expected {expected:?}, found {current}"
        )));
    }
    Ok(())
}

async fn insert_entries(
    tx: &mut Transaction<'static, Postgres>,
    journal: &Journal,
) -> Result<(), StoreError> {
    for entry in journal.entries() {
        let position = i32::try_from(entry.position)
            .map_err(|_| StoreError::Rejected(format!("entry position {}", entry.position)))?;
        sqlx::query(
            r#"
            INSERT INTO journal_entries (
                id, journal_id, account_id, description, debit, credit, position
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(journal.id().as_uuid())
        .bind(entry.account_id.as_uuid())
        .bind(&entry.description)
        .bind(entry.debit)
        .bind(entry.credit)
        .bind(position)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_entries", e))?;
    }
    Ok(())
}

async fn insert_row(
    tx: &mut Transaction<'static, Postgres>,
    row: &LedgerRow,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO ledger_entries (
            id, company_id, account_id, journal_id, entry_id,
            debit, credit, balance, description, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(row.id().as_uuid())
    .bind(row.company_id().as_uuid())
    .bind(row.account_id().as_uuid())
    .bind(row.journal_id().as_uuid())
    .bind(row.entry_id().as_uuid())
    .bind(row.debit())
    .bind(row.credit())
    .bind(row.balance().amount())
    .bind(row.description())
    .bind(row.created_at())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_ledger_row", e))?;
    Ok(())
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| map_sqlx_error("decode", e))
}

fn corrupt(what: &str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(format!("corrupt {what} row: {detail}"))
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    let category: String = get(row, "category")?;
    let category: AccountCategory = category.parse().map_err(|e| corrupt("account", e))?;
    let level: i16 = get(row, "level")?;
    let level = u8::try_from(level).map_err(|e| corrupt("account", e))?;

    Ok(Account::restore(AccountRecord {
        id: AccountId::from_uuid(get(row, "id")?),
        company_id: CompanyId::from_uuid(get(row, "company_id")?),
        code: get(row, "code")?,
        name: get(row, "name")?,
        description: get(row, "description")?,
        category,
        parent_id: get::<Option<Uuid>>(row, "parent_id")?.map(AccountId::from_uuid),
        level,
        is_header: get(row, "is_header")?,
        is_active: get(row, "is_active")?,
        balance: SignedBalance::new(get(row, "balance")?),
        created_at: get(row, "created_at")?,
    }))
}

fn entry_from_row(row: &PgRow) -> Result<JournalEntry, StoreError> {
    let position: i32 = get(row, "position")?;
    Ok(JournalEntry {
        id: EntryId::from_uuid(get(row, "id")?),
        account_id: AccountId::from_uuid(get(row, "account_id")?),
        description: get(row, "description")?,
        debit: get(row, "debit")?,
        credit: get(row, "credit")?,
        position: u32::try_from(position).map_err(|e| corrupt("journal entry", e))?,
    })
}

fn journal_from_row(row: &PgRow, entries: Vec<JournalEntry>) -> Result<Journal, StoreError> {
    let status: String = get(row, "status")?;
    let status: JournalStatus = status.parse().map_err(|e| corrupt("journal", e))?;
    let posted_at: Option<DateTime<Utc>> = get(row, "posted_at")?;

    Ok(Journal::restore(JournalRecord {
        id: JournalId::from_uuid(get(row, "id")?),
        company_id: CompanyId::from_uuid(get(row, "company_id")?),
        number: JournalNumber::restore(get::<String>(row, "number")?),
        transaction_date: get(row, "transaction_date")?,
        description: get(row, "description")?,
        status,
        created_by: UserId::from_uuid(get(row, "created_by")?),
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
        posted_at,
        posted_by: get::<Option<Uuid>>(row, "posted_by")?.map(UserId::from_uuid),
        entries,
        version: version_from_db(get(row, "version")?)?,
    }))
}

fn ledger_row_from_row(row: &PgRow) -> Result<LedgerRow, StoreError> {
    Ok(LedgerRow::from(LedgerRowRecord {
        id: LedgerRowId::from_uuid(get(row, "id")?),
        company_id: CompanyId::from_uuid(get(row, "company_id")?),
        account_id: AccountId::from_uuid(get(row, "account_id")?),
        journal_id: JournalId::from_uuid(get(row, "journal_id")?),
        entry_id: EntryId::from_uuid(get(row, "entry_id")?),
        debit: get(row, "debit")?,
        credit: get(row, "credit")?,
        balance: SignedBalance::new(get(row, "balance")?),
        description: get(row, "description")?,
        created_at: get(row, "created_at")?,
    }))
}

fn version_to_db(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|_| StoreError::Rejected(format!("version {version}")))
}

fn version_from_db(version: i64) -> Result<u64, StoreError> {
    u64::try_from(version).map_err(|e| corrupt("journal", e))
}

/// Open-ended ranges use chrono's extreme dates, which Postgres cannot store.
fn storable(date: NaiveDate) -> NaiveDate {
    match (NaiveDate::from_ymd_opt(1, 1, 1), NaiveDate::from_ymd_opt(9999, 12, 31)) {
        (Some(lo), Some(hi)) => date.clamp(lo, hi),
        _ => date,
    }
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Duplicate(msg),
                Some("23503") => StoreError::NotFound(msg),
                Some("40001") | Some("40P01") => StoreError::Concurrency(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}

/// Run an async store operation from a synchronous trait method.
fn block_on<F>(fut: F) -> Result<F::Output, StoreError>
where
    F: Future,
{
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        StoreError::Unavailable(
            "PostgresAccountingStore requires a tokio runtime; call it from within one"
                .to_string(),
        )
    })?;
    Ok(tokio::task::block_in_place(|| handle.block_on(fut)))
}

impl AccountStore for PostgresAccountingStore {
    fn insert_account(&self, account: Account) -> Result<(), StoreError> {
        block_on(self.insert_account_async(account))?
    }

    fn account(&self, company_id: CompanyId, id: AccountId) -> Result<Option<Account>, StoreError> {
        block_on(self.account_async(company_id, id))?
    }

    fn account_by_code(
        &self,
        company_id: CompanyId,
        code: &str,
    ) -> Result<Option<Account>, StoreError> {
        block_on(self.account_by_code_async(company_id, code))?
    }

    fn accounts(&self, company_id: CompanyId) -> Result<Vec<Account>, StoreError> {
        block_on(self.accounts_async(company_id))?
    }

    fn update_account(
        &self,
        company_id: CompanyId,
        id: AccountId,
        update: AccountUpdate,
    ) -> Result<Option<Account>, StoreError> {
        block_on(self.update_account_async(company_id, id, update))?
    }
}

impl JournalStore for PostgresAccountingStore {
    fn insert_journal(&self, journal: Journal) -> Result<(), StoreError> {
        block_on(self.insert_journal_async(journal))?
    }

    fn journal(
        &self,
        company_id: CompanyId,
        id: JournalId,
    ) -> Result<Option<Journal>, StoreError> {
        block_on(self.journal_async(company_id, id))?
    }

    fn journals(
        &self,
        company_id: CompanyId,
        range: DateRange,
    ) -> Result<Vec<Journal>, StoreError> {
        block_on(self.journals_async(company_id, range))?
    }

    fn journals_by_status(
        &self,
        company_id: CompanyId,
        status: JournalStatus,
    ) -> Result<Vec<Journal>, StoreError> {
        block_on(self.journals_by_status_async(company_id, status))?
    }

    fn replace_journal(
        &self,
        journal: Journal,
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError> {
        block_on(self.replace_journal_async(journal, expected_version))?
    }

    fn remove_journal(
        &self,
        company_id: CompanyId,
        id: JournalId,
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError> {
        block_on(self.remove_journal_async(company_id, id, expected_version))?
    }

    fn next_journal_sequence(
        &self,
        company_id: CompanyId,
        period: &str,
    ) -> Result<u32, StoreError> {
        block_on(self.next_journal_sequence_async(company_id, period))?
    }
}

impl LedgerStore for PostgresAccountingStore {
    fn append(&self, row: LedgerRow) -> Result<(), StoreError> {
        block_on(self.append_async(row))?
    }

    fn by_account(
        &self,
        company_id: CompanyId,
        account_id: AccountId,
        range: DateRange,
    ) -> Result<Vec<LedgerLine>, StoreError> {
        block_on(self.by_account_async(company_id, account_id, range))?
    }

    fn by_company(
        &self,
        company_id: CompanyId,
        range: DateRange,
    ) -> Result<Vec<LedgerLine>, StoreError> {
        block_on(self.by_company_async(company_id, range))?
    }

    fn account_balance(
        &self,
        company_id: CompanyId,
        account_id: AccountId,
        as_of: NaiveDate,
    ) -> Result<RawBalance, StoreError> {
        block_on(self.account_balance_async(company_id, account_id, as_of))?
    }

    fn activity_by_account(
        &self,
        company_id: CompanyId,
        range: DateRange,
    ) -> Result<HashMap<AccountId, AccountActivity>, StoreError> {
        block_on(self.activity_by_account_async(company_id, range))?
    }

    fn journal_rows(
        &self,
        company_id: CompanyId,
        journal_id: JournalId,
    ) -> Result<Vec<LedgerRow>, StoreError> {
        block_on(self.journal_rows_async(company_id, journal_id))?
    }

    fn commit_posting(&self, batch: PostingBatch) -> Result<(), StoreError> {
        block_on(self.commit_posting_async(batch))?
    }
}

/// These run against a real database and are skipped unless
/// `TALLYBOOK_TEST_DATABASE_URL` is set. Every test works in a fresh company, so a
/// shared database is fine.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BalanceUpdate;
    use rust_decimal_macros::dec;
    use tallybook_accounting::{AccountType, NewAccount};

    async fn connect() -> Option<PostgresAccountingStore> {
        let url = std::env::var("TALLYBOOK_TEST_DATABASE_URL").ok()?;
        Some(PostgresAccountingStore::connect(&url, 4).await.unwrap())
    }

    fn open(company_id: CompanyId, code: &str, category: AccountCategory) -> Account {
        Account::open(
            AccountId::new(),
            NewAccount {
                company_id,
                code: code.to_string(),
                name: format!("Account {code}"),
                description: String::new(),
                account_type: category.account_type(),
                category,
                parent_id: None,
                level: 2,
                is_header: false,
                balance: Decimal::ZERO,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn accounts_round_trip_and_updates_leave_the_balance_alone() {
        let Some(store) = connect().await else {
            return;
        };
        let company_id = CompanyId::new();
        let cash = open(company_id, "1-1100", AccountCategory::CurrentAsset);
        store.insert_account(cash.clone()).unwrap();

        let stored = store.account(company_id, *cash.id()).unwrap().unwrap();
        assert_eq!(stored.code(), "1-1100");
        assert_eq!(stored.category(), AccountCategory::CurrentAsset);
        assert_eq!(stored.balance(), cash.balance());
        assert!(matches!(
            store.insert_account(open(company_id, "1-1100", AccountCategory::CurrentAsset)),
            Err(StoreError::Duplicate(_))
        ));
        assert_eq!(store.account(CompanyId::new(), *cash.id()).unwrap(), None);

        let update = AccountUpdate {
            name: Some("Cash on hand".into()),
            ..Default::default()
        };
        let updated = store
            .update_account(company_id, *cash.id(), update)
            .unwrap()
            .unwrap();
        assert_eq!(updated.name(), "Cash on hand");
        assert_eq!(updated.balance(), cash.balance());
        assert_eq!(updated.account_type(), AccountType::Asset);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stale_posting_is_refused_without_writing_anything() {
        let Some(store) = connect().await else {
            return;
        };
        let company_id = CompanyId::new();
        let cash = open(company_id, "1-1100", AccountCategory::CurrentAsset);
        store.insert_account(cash.clone()).unwrap();

        let user = UserId::new();
        let period = JournalNumber::period_prefix(JournalNumber::DEFAULT_PREFIX, date());
        let sequence = store.next_journal_sequence(company_id, &period).unwrap();
        let journal = Journal::restore(JournalRecord {
            id: JournalId::new(),
            company_id,
            number: JournalNumber::compose(JournalNumber::DEFAULT_PREFIX, date(), sequence),
            transaction_date: date(),
            description: "opening".into(),
            status: JournalStatus::Draft,
            created_by: user,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            posted_at: None,
            posted_by: None,
            entries: Vec::new(),
            version: 1,
        });
        store.insert_journal(journal.clone()).unwrap();

        let batch = PostingBatch {
            journal: journal.clone(),
            expected_version: ExpectedVersion::Exact(1),
            as_of: date(),
            rows: Vec::new(),
            balances: vec![BalanceUpdate {
                account_id: *cash.id(),
                observed: RawBalance::new(dec!(5)),
                balance: SignedBalance::new(dec!(5)),
            }],
        };
        assert!(matches!(
            store.commit_posting(batch),
            Err(StoreError::Concurrency(_))
        ));

        let stored = store.account(company_id, *cash.id()).unwrap().unwrap();
        assert_eq!(stored.balance(), SignedBalance::new(Decimal::ZERO));
        let journal = store.journal(company_id, *journal.id()).unwrap().unwrap();
        assert_eq!(journal.status(), JournalStatus::Draft);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn journal_sequences_only_grow() {
        let Some(store) = connect().await else {
            return;
        };
        let company_id = CompanyId::new();
        let period = "JRN/202406/";

        assert_eq!(store.next_journal_sequence(company_id, period).unwrap(), 1);
        assert_eq!(store.next_journal_sequence(company_id, period).unwrap(), 2);
        assert_eq!(store.next_journal_sequence(company_id, "JRN/202407/").unwrap(), 1);
        assert_eq!(store.next_journal_sequence(CompanyId::new(), period).unwrap(), 1);
        assert_eq!(store.next_journal_sequence(company_id, period).unwrap(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn posted_journal_lands_in_the_ledger_and_the_trial_balance() {
        use tallybook_accounting::{EntryLine, JournalEvent, PostJournal};
        use tallybook_events::{EventEnvelope, InMemoryEventBus};

        use crate::posting::{JournalPostingEngine, NewJournal};
        use crate::registry::AccountRegistry;
        use crate::reports::TrialBalanceBuilder;

        let Some(store) = connect().await else {
            return;
        };
        let store = Arc::new(store);
        let bus: Arc<InMemoryEventBus<EventEnvelope<JournalEvent>>> =
            Arc::new(InMemoryEventBus::new());
        let company_id = CompanyId::new();
        let registry = AccountRegistry::new(store.clone());
        registry.seed_default_chart(company_id).unwrap();
        let cash = *registry.find_by_code(company_id, "1-1100").unwrap().id();
        let sales = *registry.find_by_code(company_id, "4-1000").unwrap().id();

        let engine = JournalPostingEngine::new(store.clone(), bus);
        let line = |account_id, debit, credit, position| EntryLine {
            account_id,
            description: String::new(),
            debit,
            credit,
            position,
        };
        let draft = engine
            .create(NewJournal {
                company_id,
                transaction_date: date(),
                description: "cash sale".into(),
                entries: vec![
                    line(cash, dec!(125.50), Decimal::ZERO, 1),
                    line(sales, Decimal::ZERO, dec!(125.50), 2),
                ],
                created_by: UserId::new(),
            })
            .unwrap();
        assert_eq!(draft.number().as_str(), "JRN/202406/0001");

        engine
            .post(PostJournal {
                company_id,
                journal_id: *draft.id(),
                posted_by: UserId::new(),
                occurred_at: Utc::now(),
            })
            .unwrap();

        let lines = store.by_account(company_id, cash, DateRange::through(date())).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].row.debit(), dec!(125.50));
        assert_eq!(lines[0].journal_number, *draft.number());

        let account = registry.find_by_id(company_id, cash).unwrap();
        assert_eq!(account.balance().amount(), dec!(125.50));

        let tb = TrialBalanceBuilder::new(store).build(company_id, date()).unwrap();
        assert!(tb.is_balanced);
        assert_eq!(tb.line("4-1000").unwrap().credit_balance, dec!(125.50));
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }
}
