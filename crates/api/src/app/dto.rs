use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tallybook_accounting::{AccountCategory, AccountType, EntryLine, NewAccount};
use tallybook_core::{AccountId, CompanyId, DateRange, DomainResult, UserId};
use tallybook_infra::{CashEntry, NewJournal};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub account_type: AccountType,
    pub category: AccountCategory,
    pub parent_id: Option<AccountId>,
    pub level: u8,
    #[serde(default)]
    pub is_header: bool,
    #[serde(default)]
    pub balance: Decimal,
}

impl CreateAccountRequest {
    pub fn into_new_account(self, company_id: CompanyId) -> NewAccount {
        NewAccount {
            company_id,
            code: self.code,
            name: self.name,
            description: self.description,
            account_type: self.account_type,
            category: self.category,
            parent_id: self.parent_id,
            level: self.level,
            is_header: self.is_header,
            balance: self.balance,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AccountListQuery {
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    /// Include header and inactive accounts.
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Deserialize)]
pub struct EntryRequest {
    pub account_id: AccountId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub debit: Decimal,
    #[serde(default)]
    pub credit: Decimal,
    /// Defaults to the entry's place in the request, starting at 1.
    pub position: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct JournalRequest {
    pub transaction_date: NaiveDate,
    #[serde(default)]
    pub description: String,
    pub entries: Vec<EntryRequest>,
}

impl JournalRequest {
    pub fn into_new_journal(self, company_id: CompanyId, created_by: UserId) -> NewJournal {
        NewJournal {
            company_id,
            transaction_date: self.transaction_date,
            description: self.description,
            entries: to_entry_lines(self.entries),
            created_by,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CashRequest {
    pub cash_account_id: AccountId,
    pub contra_account_id: AccountId,
    pub amount: Decimal,
    pub transaction_date: NaiveDate,
    #[serde(default)]
    pub description: String,
}

impl CashRequest {
    pub fn into_cash_entry(self, company_id: CompanyId, created_by: UserId) -> CashEntry {
        CashEntry {
            company_id,
            cash_account_id: self.cash_account_id,
            contra_account_id: self.contra_account_id,
            amount: self.amount,
            transaction_date: self.transaction_date,
            description: self.description,
            created_by,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DateRangeQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRangeQuery {
    /// Missing `end` means no upper bound; missing `start` means from inception.
    pub fn range(&self) -> DomainResult<DateRange> {
        let end = self.end.unwrap_or(NaiveDate::MAX);
        match self.start {
            Some(start) => DateRange::new(start, end),
            None => Ok(DateRange::through(end)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct JournalListQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct AsOfQuery {
    pub as_of: NaiveDate,
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn to_entry_lines(entries: Vec<EntryRequest>) -> Vec<EntryLine> {
    entries
        .into_iter()
        .zip(1u32..)
        .map(|(e, place)| EntryLine {
            account_id: e.account_id,
            description: e.description,
            debit: e.debit,
            credit: e.credit,
            position: e.position.unwrap_or(place),
        })
        .collect()
}

pub fn items<T: Serialize>(items: Vec<T>) -> serde_json::Value {
    serde_json::json!({ "items": items })
}
