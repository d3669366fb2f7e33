//! Chart-of-accounts service.

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;

use tallybook_accounting::{
    Account, AccountType, AccountUpdate, AccountingError, DEFAULT_CHART, NewAccount,
};
use tallybook_core::{AccountId, CompanyId, Entity};

use crate::error::EngineResult;
use crate::store::AccountStore;

#[derive(Debug)]
pub struct AccountRegistry<S> {
    store: S,
}

impl<S> AccountRegistry<S>
where
    S: AccountStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Open a new account. Codes are unique per company; a parent must be an
    /// existing account of the same company.
    pub fn create(&self, input: NewAccount) -> EngineResult<Account> {
        if self
            .store
            .account_by_code(input.company_id, input.code.trim())?
            .is_some()
        {
            return Err(AccountingError::DuplicateAccountCode(input.code.trim().to_string()).into());
        }
        if let Some(parent_id) = input.parent_id {
            if self.store.account(input.company_id, parent_id)?.is_none() {
                return Err(AccountingError::AccountNotFound(parent_id.to_string()).into());
            }
        }

        let account = Account::open(AccountId::new(), input, Utc::now())?;
        self.store.insert_account(account.clone())?;

        info!(
            company_id = %account.company_id(),
            code = account.code(),
            "account created"
        );
        Ok(account)
    }

    pub fn find_by_code(&self, company_id: CompanyId, code: &str) -> EngineResult<Account> {
        self.store
            .account_by_code(company_id, code)?
            .ok_or_else(|| AccountingError::AccountNotFound(code.to_string()).into())
    }

    pub fn find_by_id(&self, company_id: CompanyId, id: AccountId) -> EngineResult<Account> {
        self.store
            .account(company_id, id)?
            .ok_or_else(|| AccountingError::AccountNotFound(id.to_string()).into())
    }

    /// Postable accounts: active and not headers, ordered by code.
    pub fn list_active(&self, company_id: CompanyId) -> EngineResult<Vec<Account>> {
        Ok(self
            .store
            .accounts(company_id)?
            .into_iter()
            .filter(Account::is_reportable)
            .collect())
    }

    pub fn list_all(&self, company_id: CompanyId) -> EngineResult<Vec<Account>> {
        Ok(self.store.accounts(company_id)?)
    }

    pub fn list_by_type(
        &self,
        company_id: CompanyId,
        account_type: AccountType,
    ) -> EngineResult<Vec<Account>> {
        Ok(self
            .store
            .accounts(company_id)?
            .into_iter()
            .filter(|a| a.account_type() == account_type)
            .collect())
    }

    /// Apply the whitelisted fields of `update`. Code, type, category and parent stay,
    /// and the cached balance is only ever written by posting.
    pub fn update(
        &self,
        company_id: CompanyId,
        id: AccountId,
        update: AccountUpdate,
    ) -> EngineResult<Account> {
        update.validate()?;
        let account = self
            .store
            .update_account(company_id, id, update)?
            .ok_or_else(|| AccountingError::AccountNotFound(id.to_string()))?;

        info!(
            company_id = %company_id,
            code = account.code(),
            active = account.is_active(),
            "account updated"
        );
        Ok(account)
    }

    /// Insert the default chart for a company that has none of its codes yet.
    pub fn seed_default_chart(&self, company_id: CompanyId) -> EngineResult<Vec<Account>> {
        for row in DEFAULT_CHART {
            if self.store.account_by_code(company_id, row.code)?.is_some() {
                return Err(AccountingError::DuplicateAccountCode(row.code.to_string()).into());
            }
        }

        let now = Utc::now();
        let mut ids_by_code: HashMap<&'static str, AccountId> = HashMap::new();
        let mut created = Vec::with_capacity(DEFAULT_CHART.len());

        for row in DEFAULT_CHART {
            let parent_id = match row.parent {
                Some(code) => Some(
                    *ids_by_code
                        .get(code)
                        .ok_or_else(|| AccountingError::AccountNotFound(code.to_string()))?,
                ),
                None => None,
            };

            let account = Account::open(
                AccountId::new(),
                NewAccount {
                    company_id,
                    code: row.code.to_string(),
                    name: row.name.to_string(),
                    description: String::new(),
                    account_type: row.account_type,
                    category: row.category,
                    parent_id,
                    level: row.level,
                    is_header: row.is_header,
                    balance: Decimal::ZERO,
                },
                now,
            )?;
            ids_by_code.insert(row.code, *account.id());
            self.store.insert_account(account.clone())?;
            created.push(account);
        }

        info!(company_id = %company_id, accounts = created.len(), "default chart seeded");
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::store::InMemoryAccountingStore;
    use tallybook_accounting::AccountCategory;

    fn registry() -> AccountRegistry<InMemoryAccountingStore> {
        AccountRegistry::new(InMemoryAccountingStore::new())
    }

    fn cash(company_id: CompanyId) -> NewAccount {
        NewAccount {
            company_id,
            code: "1-1100".into(),
            name: "Cash".into(),
            description: String::new(),
            account_type: AccountType::Asset,
            category: AccountCategory::CurrentAsset,
            parent_id: None,
            level: 3,
            is_header: false,
            balance: Decimal::ZERO,
        }
    }

    #[test]
    fn duplicate_code_is_rejected() {
        let registry = registry();
        let company_id = CompanyId::new();
        registry.create(cash(company_id)).unwrap();

        let err = registry.create(cash(company_id)).unwrap_err();
        assert_eq!(
            err,
            EngineError::Accounting(AccountingError::DuplicateAccountCode("1-1100".into()))
        );
    }

    #[test]
    fn seeded_chart_links_parents_and_lists_postable_accounts() {
        let registry = registry();
        let company_id = CompanyId::new();
        let created = registry.seed_default_chart(company_id).unwrap();
        assert_eq!(created.len(), 29);

        let cash = registry.find_by_code(company_id, "1-1100").unwrap();
        let current_assets = registry.find_by_code(company_id, "1-1000").unwrap();
        assert_eq!(cash.parent_id(), Some(*current_assets.id()));

        let active = registry.list_active(company_id).unwrap();
        assert!(active.iter().all(|a| !a.is_header()));
        assert_eq!(active.first().map(Account::code), Some("1-1100"));

        let revenue = registry.list_by_type(company_id, AccountType::Revenue).unwrap();
        assert_eq!(revenue.len(), 3);
    }

    #[test]
    fn seeding_twice_fails_without_inserting() {
        let registry = registry();
        let company_id = CompanyId::new();
        registry.seed_default_chart(company_id).unwrap();

        assert!(registry.seed_default_chart(company_id).is_err());
        assert_eq!(registry.list_all(company_id).unwrap().len(), 29);
    }

    #[test]
    fn deactivated_accounts_drop_out_of_the_active_list() {
        let registry = registry();
        let company_id = CompanyId::new();
        let account = registry.create(cash(company_id)).unwrap();

        let updated = registry
            .update(
                company_id,
                *account.id(),
                AccountUpdate {
                    is_active: Some(false),
                    name: Some("Petty cash".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.name(), "Petty cash");
        assert_eq!(updated.code(), "1-1100");
        assert!(registry.list_active(company_id).unwrap().is_empty());
        assert_eq!(registry.list_all(company_id).unwrap().len(), 1);
    }

    #[test]
    fn accounts_open_at_zero_and_reject_blank_names() {
        let registry = registry();
        let company_id = CompanyId::new();
        let mut input = cash(company_id);
        input.balance = Decimal::from(500);
        assert!(matches!(
            registry.create(input),
            Err(EngineError::Accounting(AccountingError::OpeningBalance(_)))
        ));

        let account = registry.create(cash(company_id)).unwrap();
        let blank = AccountUpdate {
            name: Some(" ".into()),
            ..Default::default()
        };
        assert!(registry.update(company_id, *account.id(), blank).is_err());
        assert!(matches!(
            registry.update(CompanyId::new(), *account.id(), AccountUpdate::default()),
            Err(EngineError::Accounting(AccountingError::AccountNotFound(_)))
        ));
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let registry = registry();
        let company_id = CompanyId::new();
        let mut input = cash(company_id);
        input.parent_id = Some(AccountId::new());

        assert!(matches!(
            registry.create(input),
            Err(EngineError::Accounting(AccountingError::AccountNotFound(_)))
        ));
    }
}
