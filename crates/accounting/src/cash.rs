use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tallybook_core::AccountId;

use crate::error::{AccountingError, AccountingResult};
use crate::journal::EntryLine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CashDirection {
    In,
    Out,
}

/// Money moving into or out of a cash/bank account against one contra account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashMovement {
    pub direction: CashDirection,
    pub cash_account_id: AccountId,
    pub contra_account_id: AccountId,
    pub amount: Decimal,
    pub description: String,
}

impl CashMovement {
    /// The two balanced entry lines of the journal recording this movement.
    ///
    /// Cash in debits the cash account; cash out debits the contra account.
    /// The debit line always comes first.
    pub fn entry_lines(&self) -> AccountingResult<Vec<EntryLine>> {
        if self.amount <= Decimal::ZERO {
            return Err(AccountingError::Invalid(
                "cash movement amount must be positive".into(),
            ));
        }
        if self.cash_account_id == self.contra_account_id {
            return Err(AccountingError::Invalid(
                "cash and contra account must differ".into(),
            ));
        }

        let (debit_account, credit_account) = match self.direction {
            CashDirection::In => (self.cash_account_id, self.contra_account_id),
            CashDirection::Out => (self.contra_account_id, self.cash_account_id),
        };

        Ok(vec![
            EntryLine {
                account_id: debit_account,
                description: self.description.clone(),
                debit: self.amount,
                credit: Decimal::ZERO,
                position: 1,
            },
            EntryLine {
                account_id: credit_account,
                description: self.description.clone(),
                debit: Decimal::ZERO,
                credit: self.amount,
                position: 2,
            },
        ])
    }
}
