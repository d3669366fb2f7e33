//! Trial balance and financial statements over the posted ledger.
//!
//! Reports are pure reads and may run alongside posting.

use std::collections::HashMap;

use chrono::NaiveDate;

use tallybook_accounting::{
    Account, AccountActivity, BalanceSheet, CashFlowStatement, IncomeStatement, RawBalance,
    TrialBalance,
};
use tallybook_core::{AccountId, CompanyId, DateRange, Entity};

use crate::error::EngineResult;
use crate::store::AccountingStore;

/// Codes of the accounts the cash flow statement treats as cash and bank.
pub const DEFAULT_CASH_ACCOUNT_CODES: [&str; 2] = ["1-1100", "1-1200"];

fn with_activity<'a>(
    accounts: &'a [Account],
    activity: &HashMap<AccountId, AccountActivity>,
) -> impl Iterator<Item = (&'a Account, AccountActivity)> {
    accounts
        .iter()
        .map(|a| (a, activity.get(a.id()).copied().unwrap_or_default()))
}

#[derive(Debug)]
pub struct TrialBalanceBuilder<S> {
    store: S,
}

impl<S> TrialBalanceBuilder<S>
where
    S: AccountingStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Trial balance over posted rows dated on or before `as_of`.
    pub fn build(&self, company_id: CompanyId, as_of: NaiveDate) -> EngineResult<TrialBalance> {
        let accounts = self.store.accounts(company_id)?;
        let activity = self
            .store
            .activity_by_account(company_id, DateRange::through(as_of))?;

        Ok(TrialBalance::compose(
            company_id,
            as_of,
            with_activity(&accounts, &activity),
        ))
    }
}

#[derive(Debug)]
pub struct FinancialStatementComposer<S> {
    store: S,
    cash_account_codes: Vec<String>,
}

impl<S> FinancialStatementComposer<S>
where
    S: AccountingStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cash_account_codes: DEFAULT_CASH_ACCOUNT_CODES
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }

    pub fn with_cash_accounts(mut self, codes: Vec<String>) -> Self {
        self.cash_account_codes = codes;
        self
    }

    pub fn income_statement(
        &self,
        company_id: CompanyId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<IncomeStatement> {
        let range = DateRange::new(start, end)?;
        let accounts = self.store.accounts(company_id)?;
        let activity = self.store.activity_by_account(company_id, range)?;

        Ok(IncomeStatement::compose(
            company_id,
            start,
            end,
            with_activity(&accounts, &activity),
        ))
    }

    pub fn balance_sheet(
        &self,
        company_id: CompanyId,
        as_of: NaiveDate,
    ) -> EngineResult<BalanceSheet> {
        let accounts = self.store.accounts(company_id)?;
        let activity = self
            .store
            .activity_by_account(company_id, DateRange::through(as_of))?;

        Ok(BalanceSheet::compose(
            company_id,
            as_of,
            with_activity(&accounts, &activity),
        ))
    }

    /// Net movement of the active cash and bank accounts. `None` when the company
    /// has none of them.
    pub fn cash_flow(
        &self,
        company_id: CompanyId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Option<CashFlowStatement>> {
        DateRange::new(start, end)?;

        let cash_accounts: Vec<Account> = self
            .store
            .accounts(company_id)?
            .into_iter()
            .filter(|a| a.is_active() && self.cash_account_codes.iter().any(|c| c == a.code()))
            .collect();
        if cash_accounts.is_empty() {
            return Ok(None);
        }

        let beginning = self.cash_balance(company_id, &cash_accounts, DateRange::before(start))?;
        let ending = self.cash_balance(company_id, &cash_accounts, DateRange::through(end))?;

        Ok(Some(CashFlowStatement::compose(
            company_id, start, end, beginning, ending,
        )))
    }

    fn cash_balance(
        &self,
        company_id: CompanyId,
        cash_accounts: &[Account],
        range: DateRange,
    ) -> EngineResult<RawBalance> {
        let activity = self.store.activity_by_account(company_id, range)?;
        Ok(with_activity(cash_accounts, &activity)
            .fold(RawBalance::ZERO, |acc, (_, a)| acc + a.raw()))
    }
}
