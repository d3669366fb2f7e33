//! Posted ledger rows and the two balance representations derived from them.
//!
//! [`RawBalance`] is `Σdebit − Σcredit`, independent of account type; reports are
//! built from it. [`SignedBalance`] is the normal-balance-adjusted figure cached on
//! the account. They are deliberately different types.

use core::ops::{Add, AddAssign};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tallybook_core::{AccountId, CompanyId, Entity, EntryId, JournalId, LedgerRowId};

/// `Σdebit − Σcredit` over a set of posted rows.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawBalance(Decimal);

impl RawBalance {
    pub const ZERO: RawBalance = RawBalance(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn of_movement(debit: Decimal, credit: Decimal) -> Self {
        Self(debit - credit)
    }

    pub fn amount(self) -> Decimal {
        self.0
    }
}

impl Add for RawBalance {
    type Output = RawBalance;

    fn add(self, rhs: Self) -> Self::Output {
        RawBalance(self.0 + rhs.0)
    }
}

impl AddAssign for RawBalance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

/// Normal-balance-signed balance: positive means the account carries a balance on
/// its normal side.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignedBalance(Decimal);

impl SignedBalance {
    pub const ZERO: SignedBalance = SignedBalance(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn amount(self) -> Decimal {
        self.0
    }

    /// Balance after applying `delta` (already signed for the account's side).
    pub fn adjusted_by(self, delta: Decimal) -> Self {
        Self(self.0 + delta)
    }
}

/// Debit and credit totals for one account over some set of posted rows.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountActivity {
    pub debit: Decimal,
    pub credit: Decimal,
}

impl AccountActivity {
    pub fn record(&mut self, debit: Decimal, credit: Decimal) {
        self.debit += debit;
        self.credit += credit;
    }

    pub fn raw(&self) -> RawBalance {
        RawBalance::of_movement(self.debit, self.credit)
    }
}

/// One posted line of the ledger. Written once by posting, never changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    id: LedgerRowId,
    company_id: CompanyId,
    account_id: AccountId,
    journal_id: JournalId,
    entry_id: EntryId,
    debit: Decimal,
    credit: Decimal,
    /// Account balance (normal-balance signed) right after this row.
    balance: SignedBalance,
    description: String,
    created_at: DateTime<Utc>,
}

/// A ledger row as persisted, used to rebuild [`LedgerRow`] from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRowRecord {
    pub id: LedgerRowId,
    pub company_id: CompanyId,
    pub account_id: AccountId,
    pub journal_id: JournalId,
    pub entry_id: EntryId,
    pub debit: Decimal,
    pub credit: Decimal,
    pub balance: SignedBalance,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<LedgerRowRecord> for LedgerRow {
    fn from(r: LedgerRowRecord) -> Self {
        Self {
            id: r.id,
            company_id: r.company_id,
            account_id: r.account_id,
            journal_id: r.journal_id,
            entry_id: r.entry_id,
            debit: r.debit,
            credit: r.credit,
            balance: r.balance,
            description: r.description,
            created_at: r.created_at,
        }
    }
}

impl LedgerRow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        company_id: CompanyId,
        account_id: AccountId,
        journal_id: JournalId,
        entry_id: EntryId,
        debit: Decimal,
        credit: Decimal,
        balance: SignedBalance,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LedgerRowId::new(),
            company_id,
            account_id,
            journal_id,
            entry_id,
            debit,
            credit,
            balance,
            description: description.into(),
            created_at,
        }
    }

    pub fn company_id(&self) -> CompanyId {
        self.company_id
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn journal_id(&self) -> JournalId {
        self.journal_id
    }

    pub fn entry_id(&self) -> EntryId {
        self.entry_id
    }

    pub fn debit(&self) -> Decimal {
        self.debit
    }

    pub fn credit(&self) -> Decimal {
        self.credit
    }

    pub fn balance(&self) -> SignedBalance {
        self.balance
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn raw(&self) -> RawBalance {
        RawBalance::of_movement(self.debit, self.credit)
    }
}

impl Entity for LedgerRow {
    type Id = LedgerRowId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
