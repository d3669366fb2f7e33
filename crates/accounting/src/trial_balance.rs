use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tallybook_core::{AccountId, CompanyId, Entity};

use crate::account::{Account, AccountType, NormalSide};
use crate::ledger::AccountActivity;

/// One account's row in a trial balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceLine {
    pub account_id: AccountId,
    pub account_code: String,
    pub account_name: String,
    pub account_type: AccountType,
    /// Raw Σdebit of posted rows up to the cutoff.
    pub debit: Decimal,
    /// Raw Σcredit of posted rows up to the cutoff.
    pub credit: Decimal,
    pub debit_balance: Decimal,
    pub credit_balance: Decimal,
}

impl TrialBalanceLine {
    pub fn for_account(account: &Account, activity: AccountActivity) -> Self {
        let (debit_balance, credit_balance) = match account.normal_side() {
            NormalSide::Debit => (activity.debit - activity.credit, Decimal::ZERO),
            NormalSide::Credit => (Decimal::ZERO, activity.credit - activity.debit),
        };

        Self {
            account_id: *account.id(),
            account_code: account.code().to_string(),
            account_name: account.name().to_string(),
            account_type: account.account_type(),
            debit: activity.debit,
            credit: activity.credit,
            debit_balance,
            credit_balance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalance {
    pub company_id: CompanyId,
    pub as_of: NaiveDate,
    pub lines: Vec<TrialBalanceLine>,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub total_debit_balance: Decimal,
    pub total_credit_balance: Decimal,
    pub is_balanced: bool,
}

impl TrialBalance {
    /// Build the trial balance from each account's posted activity up to `as_of`.
    ///
    /// Inactive and header accounts are skipped; accounts without activity appear
    /// with zero columns. Lines are ordered by account code.
    pub fn compose<'a>(
        company_id: CompanyId,
        as_of: NaiveDate,
        accounts: impl IntoIterator<Item = (&'a Account, AccountActivity)>,
    ) -> Self {
        let mut lines: Vec<TrialBalanceLine> = accounts
            .into_iter()
            .filter(|(account, _)| account.is_reportable())
            .map(|(account, activity)| TrialBalanceLine::for_account(account, activity))
            .collect();
        lines.sort_by(|a, b| a.account_code.cmp(&b.account_code));

        let mut total_debit = Decimal::ZERO;
        let mut total_credit = Decimal::ZERO;
        let mut total_debit_balance = Decimal::ZERO;
        let mut total_credit_balance = Decimal::ZERO;
        for line in &lines {
            total_debit += line.debit;
            total_credit += line.credit;
            total_debit_balance += line.debit_balance;
            total_credit_balance += line.credit_balance;
        }

        Self {
            company_id,
            as_of,
            lines,
            total_debit,
            total_credit,
            total_debit_balance,
            total_credit_balance,
            is_balanced: total_debit_balance == total_credit_balance,
        }
    }

    pub fn line(&self, account_code: &str) -> Option<&TrialBalanceLine> {
        self.lines.iter().find(|l| l.account_code == account_code)
    }
}
