//! Income statement, balance sheet and cash flow arithmetic.
//!
//! The composers are pure: callers supply accounts together with their posted
//! activity over the relevant window, already filtered to posted journals.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tallybook_core::{AccountId, CompanyId, Entity};

use crate::account::{Account, AccountCategory, AccountType};
use crate::ledger::{AccountActivity, RawBalance};

/// `YYYY-MM to YYYY-MM`.
pub fn period_label(start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "{:04}-{:02} to {:04}-{:02}",
        start.year(),
        start.month(),
        end.year(),
        end.month()
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementLine {
    pub account_id: AccountId,
    pub account_code: String,
    pub account_name: String,
    pub amount: Decimal,
}

impl StatementLine {
    fn new(account: &Account, amount: Decimal) -> Self {
        Self {
            account_id: *account.id(),
            account_code: account.code().to_string(),
            account_name: account.name().to_string(),
            amount,
        }
    }
}

fn total(lines: &[StatementLine]) -> Decimal {
    lines.iter().map(|l| l.amount).sum()
}

fn reportable_sorted<'a>(
    accounts: impl IntoIterator<Item = (&'a Account, AccountActivity)>,
) -> Vec<(&'a Account, AccountActivity)> {
    let mut rows: Vec<_> = accounts
        .into_iter()
        .filter(|(account, _)| account.is_reportable())
        .collect();
    rows.sort_by(|a, b| a.0.code().cmp(b.0.code()));
    rows
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeStatement {
    pub company_id: CompanyId,
    pub period: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub revenues: Vec<StatementLine>,
    pub total_revenue: Decimal,
    pub expenses: Vec<StatementLine>,
    pub total_expense: Decimal,
    pub net_income: Decimal,
    pub is_profit: bool,
}

impl IncomeStatement {
    /// `accounts` carries each account's posted activity dated within `[start, end]`.
    /// Accounts whose amount nets to zero are omitted.
    pub fn compose<'a>(
        company_id: CompanyId,
        start: NaiveDate,
        end: NaiveDate,
        accounts: impl IntoIterator<Item = (&'a Account, AccountActivity)>,
    ) -> Self {
        let mut revenues = Vec::new();
        let mut expenses = Vec::new();

        for (account, activity) in reportable_sorted(accounts) {
            match account.account_type() {
                AccountType::Revenue => {
                    let amount = activity.credit - activity.debit;
                    if !amount.is_zero() {
                        revenues.push(StatementLine::new(account, amount));
                    }
                }
                AccountType::Expense => {
                    let amount = activity.debit - activity.credit;
                    if !amount.is_zero() {
                        expenses.push(StatementLine::new(account, amount));
                    }
                }
                AccountType::Asset | AccountType::Liability | AccountType::Equity => {}
            }
        }

        let total_revenue = total(&revenues);
        let total_expense = total(&expenses);
        let net_income = total_revenue - total_expense;

        Self {
            company_id,
            period: period_label(start, end),
            start_date: start,
            end_date: end,
            revenues,
            total_revenue,
            expenses,
            total_expense,
            net_income,
            is_profit: net_income > Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub company_id: CompanyId,
    pub as_of_date: NaiveDate,
    pub current_assets: Vec<StatementLine>,
    pub total_current_assets: Decimal,
    pub fixed_assets: Vec<StatementLine>,
    pub total_fixed_assets: Decimal,
    pub total_assets: Decimal,
    pub current_liabilities: Vec<StatementLine>,
    pub total_current_liabilities: Decimal,
    pub long_term_liabilities: Vec<StatementLine>,
    pub total_long_term_liabilities: Decimal,
    pub total_liabilities: Decimal,
    pub equity: Vec<StatementLine>,
    pub total_equity: Decimal,
    pub total_liabilities_and_equity: Decimal,
    pub is_balanced: bool,
}

impl BalanceSheet {
    /// `accounts` carries each account's cumulative posted activity up to `as_of`.
    ///
    /// Asset lines are `Σdebit − Σcredit`, liability and equity lines `Σcredit − Σdebit`.
    /// Zero lines are kept. Revenue and expense accounts are not part of the sheet.
    pub fn compose<'a>(
        company_id: CompanyId,
        as_of: NaiveDate,
        accounts: impl IntoIterator<Item = (&'a Account, AccountActivity)>,
    ) -> Self {
        let mut current_assets = Vec::new();
        let mut fixed_assets = Vec::new();
        let mut current_liabilities = Vec::new();
        let mut long_term_liabilities = Vec::new();
        let mut equity = Vec::new();

        for (account, activity) in reportable_sorted(accounts) {
            let debit_side = activity.debit - activity.credit;
            let credit_side = activity.credit - activity.debit;
            match account.category() {
                AccountCategory::CurrentAsset => {
                    current_assets.push(StatementLine::new(account, debit_side))
                }
                AccountCategory::FixedAsset => {
                    fixed_assets.push(StatementLine::new(account, debit_side))
                }
                AccountCategory::CurrentLiability => {
                    current_liabilities.push(StatementLine::new(account, credit_side))
                }
                AccountCategory::LongTermLiability => {
                    long_term_liabilities.push(StatementLine::new(account, credit_side))
                }
                AccountCategory::Equity => equity.push(StatementLine::new(account, credit_side)),
                AccountCategory::OperatingRevenue
                | AccountCategory::OtherRevenue
                | AccountCategory::OperatingExpense
                | AccountCategory::OtherExpense => {}
            }
        }

        let total_current_assets = total(&current_assets);
        let total_fixed_assets = total(&fixed_assets);
        let total_assets = total_current_assets + total_fixed_assets;
        let total_current_liabilities = total(&current_liabilities);
        let total_long_term_liabilities = total(&long_term_liabilities);
        let total_liabilities = total_current_liabilities + total_long_term_liabilities;
        let total_equity = total(&equity);
        let total_liabilities_and_equity = total_liabilities + total_equity;

        Self {
            company_id,
            as_of_date: as_of,
            current_assets,
            total_current_assets,
            fixed_assets,
            total_fixed_assets,
            total_assets,
            current_liabilities,
            total_current_liabilities,
            long_term_liabilities,
            total_long_term_liabilities,
            total_liabilities,
            equity,
            total_equity,
            total_liabilities_and_equity,
            is_balanced: total_assets == total_liabilities_and_equity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashFlowItem {
    pub description: String,
    pub amount: Decimal,
}

/// Net movement of the designated cash and bank accounts over a period.
///
/// Everything is reported as operating activity; investing and financing stay empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashFlowStatement {
    pub company_id: CompanyId,
    pub period: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub operating_activities: Vec<CashFlowItem>,
    pub net_cash_from_operating: Decimal,
    pub investing_activities: Vec<CashFlowItem>,
    pub net_cash_from_investing: Decimal,
    pub financing_activities: Vec<CashFlowItem>,
    pub net_cash_from_financing: Decimal,
    pub net_increase_in_cash: Decimal,
    pub cash_at_beginning: Decimal,
    pub cash_at_end: Decimal,
}

impl CashFlowStatement {
    pub const OPERATING_LINE: &'static str = "Net cash from operations";

    /// `beginning` is the raw cash balance of rows dated before `start`, `ending`
    /// of rows dated on or before `end`.
    pub fn compose(
        company_id: CompanyId,
        start: NaiveDate,
        end: NaiveDate,
        beginning: RawBalance,
        ending: RawBalance,
    ) -> Self {
        let net = ending.amount() - beginning.amount();

        Self {
            company_id,
            period: period_label(start, end),
            start_date: start,
            end_date: end,
            operating_activities: vec![CashFlowItem {
                description: Self::OPERATING_LINE.to_string(),
                amount: net,
            }],
            net_cash_from_operating: net,
            investing_activities: Vec::new(),
            net_cash_from_investing: Decimal::ZERO,
            financing_activities: Vec::new(),
            net_cash_from_financing: Decimal::ZERO,
            net_increase_in_cash: net,
            cash_at_beginning: beginning.amount(),
            cash_at_end: ending.amount(),
        }
    }
}
