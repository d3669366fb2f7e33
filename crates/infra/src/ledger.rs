//! Read side of the ledger: posted lines and raw balances.

use chrono::NaiveDate;

use tallybook_accounting::{AccountingError, RawBalance};
use tallybook_core::{AccountId, CompanyId, DateRange};

use crate::error::EngineResult;
use crate::store::{AccountingStore, LedgerLine};

#[derive(Debug)]
pub struct LedgerReader<S> {
    store: S,
}

impl<S> LedgerReader<S>
where
    S: AccountingStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Posted lines of one account dated within `range`.
    pub fn by_account(
        &self,
        company_id: CompanyId,
        account_id: AccountId,
        range: DateRange,
    ) -> EngineResult<Vec<LedgerLine>> {
        self.ensure_account(company_id, account_id)?;
        Ok(self.store.by_account(company_id, account_id, range)?)
    }

    pub fn by_company(
        &self,
        company_id: CompanyId,
        range: DateRange,
    ) -> EngineResult<Vec<LedgerLine>> {
        Ok(self.store.by_company(company_id, range)?)
    }

    /// Raw `Σ(debit − credit)` through `as_of`. Not adjusted for the account's
    /// normal side; see `Account::balance` for the signed figure.
    pub fn account_balance(
        &self,
        company_id: CompanyId,
        account_id: AccountId,
        as_of: NaiveDate,
    ) -> EngineResult<RawBalance> {
        self.ensure_account(company_id, account_id)?;
        Ok(self.store.account_balance(company_id, account_id, as_of)?)
    }

    fn ensure_account(&self, company_id: CompanyId, account_id: AccountId) -> EngineResult<()> {
        match self.store.account(company_id, account_id)? {
            Some(_) => Ok(()),
            None => Err(AccountingError::AccountNotFound(account_id.to_string()).into()),
        }
    }
}
