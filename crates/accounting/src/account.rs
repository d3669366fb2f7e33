use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tallybook_core::{AccountId, CompanyId, Entity};

use crate::error::{AccountingError, AccountingResult};
use crate::ledger::{RawBalance, SignedBalance};

/// High-level account type (determines the normal balance side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

/// Which side of an entry increases an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalSide {
    Debit,
    Credit,
}

impl AccountType {
    pub const ALL: [AccountType; 5] = [
        AccountType::Asset,
        AccountType::Liability,
        AccountType::Equity,
        AccountType::Revenue,
        AccountType::Expense,
    ];

    /// The normal-balance table. Every balance computation goes through here.
    pub fn normal_side(self) -> NormalSide {
        match self {
            AccountType::Asset | AccountType::Expense => NormalSide::Debit,
            AccountType::Liability | AccountType::Equity | AccountType::Revenue => {
                NormalSide::Credit
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccountType::Asset => "asset",
            AccountType::Liability => "liability",
            AccountType::Equity => "equity",
            AccountType::Revenue => "revenue",
            AccountType::Expense => "expense",
        }
    }
}

impl core::fmt::Display for AccountType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for AccountType {
    type Err = AccountingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccountType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                AccountingError::Invalid(format!(
                    "account type must be one of: asset, liability, equity, revenue, expense (got '{s}')"
                ))
            })
    }
}

impl NormalSide {
    /// Signed effect of one debit/credit pair on an account with this normal side.
    pub fn delta(self, debit: Decimal, credit: Decimal) -> Decimal {
        match self {
            NormalSide::Debit => debit - credit,
            NormalSide::Credit => credit - debit,
        }
    }

    /// Convert a raw `Σdebit − Σcredit` balance into this side's signed view.
    pub fn sign(self, raw: RawBalance) -> SignedBalance {
        match self {
            NormalSide::Debit => SignedBalance::new(raw.amount()),
            NormalSide::Credit => SignedBalance::new(-raw.amount()),
        }
    }
}

/// Sub-classification used to partition the balance sheet and income statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountCategory {
    CurrentAsset,
    FixedAsset,
    CurrentLiability,
    LongTermLiability,
    Equity,
    OperatingRevenue,
    OtherRevenue,
    OperatingExpense,
    OtherExpense,
}

impl AccountCategory {
    pub const ALL: [AccountCategory; 9] = [
        AccountCategory::CurrentAsset,
        AccountCategory::FixedAsset,
        AccountCategory::CurrentLiability,
        AccountCategory::LongTermLiability,
        AccountCategory::Equity,
        AccountCategory::OperatingRevenue,
        AccountCategory::OtherRevenue,
        AccountCategory::OperatingExpense,
        AccountCategory::OtherExpense,
    ];

    /// The account type this category belongs to.
    pub fn account_type(self) -> AccountType {
        match self {
            AccountCategory::CurrentAsset | AccountCategory::FixedAsset => AccountType::Asset,
            AccountCategory::CurrentLiability | AccountCategory::LongTermLiability => {
                AccountType::Liability
            }
            AccountCategory::Equity => AccountType::Equity,
            AccountCategory::OperatingRevenue | AccountCategory::OtherRevenue => {
                AccountType::Revenue
            }
            AccountCategory::OperatingExpense | AccountCategory::OtherExpense => {
                AccountType::Expense
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccountCategory::CurrentAsset => "current_asset",
            AccountCategory::FixedAsset => "fixed_asset",
            AccountCategory::CurrentLiability => "current_liability",
            AccountCategory::LongTermLiability => "long_term_liability",
            AccountCategory::Equity => "equity",
            AccountCategory::OperatingRevenue => "operating_revenue",
            AccountCategory::OtherRevenue => "other_revenue",
            AccountCategory::OperatingExpense => "operating_expense",
            AccountCategory::OtherExpense => "other_expense",
        }
    }
}

impl core::fmt::Display for AccountCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for AccountCategory {
    type Err = AccountingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccountCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| AccountingError::Invalid(format!("unknown account category '{s}'")))
    }
}

/// Input for opening a new account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAccount {
    pub company_id: CompanyId,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub account_type: AccountType,
    pub category: AccountCategory,
    #[serde(default)]
    pub parent_id: Option<AccountId>,
    pub level: u8,
    #[serde(default)]
    pub is_header: bool,
    /// Opening cached balance. Must be zero: the cached balance is always derived
    /// from posted ledger rows, so opening figures are entered as a journal.
    #[serde(default)]
    pub balance: Decimal,
}

/// The only account fields that may change after creation.
///
/// Code, type, category and parent are structural and fixed at creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

impl AccountUpdate {
    pub fn validate(&self) -> AccountingResult<()> {
        if self.name.as_ref().is_some_and(|n| n.trim().is_empty()) {
            return Err(AccountingError::Invalid("account name must not be empty".into()));
        }
        Ok(())
    }
}

/// An account as persisted, used to rebuild [`Account`] from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountRecord {
    pub id: AccountId,
    pub company_id: CompanyId,
    pub code: String,
    pub name: String,
    pub description: String,
    pub category: AccountCategory,
    pub parent_id: Option<AccountId>,
    pub level: u8,
    pub is_header: bool,
    pub is_active: bool,
    pub balance: SignedBalance,
    pub created_at: DateTime<Utc>,
}

/// An account in a company's chart of accounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    id: AccountId,
    company_id: CompanyId,
    code: String,
    name: String,
    description: String,
    account_type: AccountType,
    category: AccountCategory,
    parent_id: Option<AccountId>,
    level: u8,
    is_header: bool,
    is_active: bool,
    balance: SignedBalance,
    created_at: DateTime<Utc>,
}

impl Account {
    /// Open an account from `input`, enforcing the structural rules.
    pub fn open(id: AccountId, input: NewAccount, now: DateTime<Utc>) -> AccountingResult<Self> {
        let code = input.code.trim().to_string();
        if code.is_empty() {
            return Err(AccountingError::Invalid("account code must not be empty".into()));
        }
        if input.name.trim().is_empty() {
            return Err(AccountingError::Invalid("account name must not be empty".into()));
        }
        if input.category.account_type() != input.account_type {
            return Err(AccountingError::CategoryMismatch {
                category: input.category,
                account_type: input.account_type,
            });
        }
        if input.is_header && !input.balance.is_zero() {
            return Err(AccountingError::HeaderAccountBalance(code));
        }
        if !input.balance.is_zero() {
            return Err(AccountingError::OpeningBalance(code));
        }

        Ok(Self {
            id,
            company_id: input.company_id,
            code,
            name: input.name,
            description: input.description,
            account_type: input.account_type,
            category: input.category,
            parent_id: input.parent_id,
            level: input.level,
            is_header: input.is_header,
            is_active: true,
            balance: SignedBalance::new(input.balance),
            created_at: now,
        })
    }

    /// Rebuild a stored account. No rule is re-checked.
    pub fn restore(record: AccountRecord) -> Self {
        Self {
            id: record.id,
            company_id: record.company_id,
            code: record.code,
            name: record.name,
            description: record.description,
            account_type: record.category.account_type(),
            category: record.category,
            parent_id: record.parent_id,
            level: record.level,
            is_header: record.is_header,
            is_active: record.is_active,
            balance: record.balance,
            created_at: record.created_at,
        }
    }

    pub fn company_id(&self) -> CompanyId {
        self.company_id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn account_type(&self) -> AccountType {
        self.account_type
    }

    pub fn category(&self) -> AccountCategory {
        self.category
    }

    pub fn normal_side(&self) -> NormalSide {
        self.account_type.normal_side()
    }

    pub fn parent_id(&self) -> Option<AccountId> {
        self.parent_id
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn is_header(&self) -> bool {
        self.is_header
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Cached, normal-balance-signed running total.
    pub fn balance(&self) -> SignedBalance {
        self.balance
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Active, non-header accounts are the only ones reports aggregate over.
    pub fn is_reportable(&self) -> bool {
        self.is_active && !self.is_header
    }

    /// Check that a journal entry may reference this account.
    pub fn ensure_postable(&self) -> AccountingResult<()> {
        if self.is_header {
            return Err(AccountingError::HeaderAccountPosting(self.code.clone()));
        }
        if !self.is_active {
            return Err(AccountingError::InactiveAccount(self.code.clone()));
        }
        Ok(())
    }

    pub fn apply_update(&mut self, update: AccountUpdate) -> AccountingResult<()> {
        update.validate()?;
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(is_active) = update.is_active {
            self.is_active = is_active;
        }
        Ok(())
    }

    /// Store the balance computed while posting an entry to this account.
    pub fn record_posted_balance(&mut self, balance: SignedBalance) -> AccountingResult<()> {
        if self.is_header && !balance.amount().is_zero() {
            return Err(AccountingError::HeaderAccountBalance(self.code.clone()));
        }
        self.balance = balance;
        Ok(())
    }
}

impl Entity for Account {
    type Id = AccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn new_account(code: &str, account_type: AccountType, category: AccountCategory) -> NewAccount {
        NewAccount {
            company_id: CompanyId::new(),
            code: code.to_string(),
            name: code.to_string(),
            description: String::new(),
            account_type,
            category,
            parent_id: None,
            level: 3,
            is_header: false,
            balance: Decimal::ZERO,
        }
    }

    #[test]
    fn normal_balance_table_matches_account_types() {
        for t in AccountType::ALL {
            let expected = match t {
                AccountType::Asset | AccountType::Expense => dec!(10),
                _ => dec!(-10),
            };
            assert_eq!(t.normal_side().delta(dec!(10), Decimal::ZERO), expected, "{t}");
            assert_eq!(t.normal_side().delta(Decimal::ZERO, dec!(10)), -expected, "{t}");
        }
    }

    #[test]
    fn signing_a_raw_balance_flips_credit_normal_accounts() {
        let raw = RawBalance::new(dec!(-250.00));
        assert_eq!(NormalSide::Credit.sign(raw).amount(), dec!(250.00));
        assert_eq!(NormalSide::Debit.sign(raw).amount(), dec!(-250.00));
    }

    #[test]
    fn header_account_with_balance_is_rejected() {
        let mut input = new_account("1-0000", AccountType::Asset, AccountCategory::CurrentAsset);
        input.is_header = true;
        input.balance = dec!(5);

        let err = Account::open(AccountId::new(), input, Utc::now()).unwrap_err();
        assert_eq!(err, AccountingError::HeaderAccountBalance("1-0000".into()));
    }

    #[test]
    fn postable_accounts_open_at_zero() {
        let mut input = new_account("1-1100", AccountType::Asset, AccountCategory::CurrentAsset);
        input.balance = dec!(500);

        let err = Account::open(AccountId::new(), input, Utc::now()).unwrap_err();
        assert_eq!(err, AccountingError::OpeningBalance("1-1100".into()));
    }

    #[test]
    fn blank_rename_is_refused_before_anything_changes() {
        let input = new_account("1-1100", AccountType::Asset, AccountCategory::CurrentAsset);
        let mut account = Account::open(AccountId::new(), input, Utc::now()).unwrap();

        let err = account
            .apply_update(AccountUpdate {
                name: Some("  ".into()),
                is_active: Some(false),
                ..Default::default()
            })
            .unwrap_err();

        assert!(matches!(err, AccountingError::Invalid(_)));
        assert!(account.is_active());
    }

    #[test]
    fn category_round_trips_through_its_stored_name() {
        for category in AccountCategory::ALL {
            assert_eq!(category.as_str().parse::<AccountCategory>().unwrap(), category);
        }
        assert!("cash".parse::<AccountCategory>().is_err());
    }

    #[test]
    fn category_must_belong_to_type() {
        let input = new_account("2-1100", AccountType::Liability, AccountCategory::FixedAsset);
        assert!(matches!(
            Account::open(AccountId::new(), input, Utc::now()),
            Err(AccountingError::CategoryMismatch { .. })
        ));
    }

    #[test]
    fn update_touches_only_whitelisted_fields() {
        let input = new_account("1-1100", AccountType::Asset, AccountCategory::CurrentAsset);
        let mut account = Account::open(AccountId::new(), input, Utc::now()).unwrap();

        account
            .apply_update(AccountUpdate {
                name: Some("Petty cash".into()),
                description: None,
                is_active: Some(false),
            })
            .unwrap();

        assert_eq!(account.name(), "Petty cash");
        assert_eq!(account.code(), "1-1100");
        assert_eq!(account.account_type(), AccountType::Asset);
        assert!(!account.is_active());
        assert!(matches!(
            account.ensure_postable(),
            Err(AccountingError::InactiveAccount(_))
        ));
    }

    #[test]
    fn account_type_parses_case_insensitively() {
        assert_eq!("Revenue".parse::<AccountType>().unwrap(), AccountType::Revenue);
        assert!("income".parse::<AccountType>().is_err());
    }
}
