use thiserror::Error;

use tallybook_core::{DomainError, JournalId};

use crate::account::{AccountCategory, AccountType};
use crate::journal::{JournalAction, JournalStatus};
use crate::validation::JournalViolation;

pub type AccountingResult<T> = Result<T, AccountingError>;

/// Accounting rule violations. Every variant names the specific reason.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccountingError {
    #[error("invalid journal: {}", join_violations(.0))]
    Validation(Vec<JournalViolation>),

    #[error("only {required} journals can be {action} (journal is {actual})")]
    StateConflict {
        action: JournalAction,
        required: JournalStatus,
        actual: JournalStatus,
    },

    #[error("journal {0} not found")]
    JournalNotFound(JournalId),

    #[error("journal {0} already exists")]
    JournalExists(JournalId),

    #[error("account {0} not found")]
    AccountNotFound(String),

    #[error("account code {0} already exists")]
    DuplicateAccountCode(String),

    #[error("header account {0} cannot have a balance")]
    HeaderAccountBalance(String),

    #[error("account {0} must open at zero; post its opening balance as a journal")]
    OpeningBalance(String),

    #[error("header account {0} cannot be posted to")]
    HeaderAccountPosting(String),

    #[error("account {0} is inactive")]
    InactiveAccount(String),

    #[error("category {category} does not belong to account type {account_type}")]
    CategoryMismatch {
        category: AccountCategory,
        account_type: AccountType,
    },

    #[error("{0} belongs to another company")]
    CompanyMismatch(String),

    #[error("{0}")]
    Invalid(String),
}

fn join_violations(violations: &[JournalViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<AccountingError> for DomainError {
    fn from(value: AccountingError) -> Self {
        match value {
            AccountingError::JournalNotFound(id) => DomainError::not_found(format!("journal {id}")),
            AccountingError::AccountNotFound(code) => {
                DomainError::not_found(format!("account {code}"))
            }
            err @ (AccountingError::StateConflict { .. }
            | AccountingError::JournalExists(_)
            | AccountingError::DuplicateAccountCode(_)) => DomainError::conflict(err.to_string()),
            err @ (AccountingError::HeaderAccountBalance(_)
            | AccountingError::HeaderAccountPosting(_)
            | AccountingError::CompanyMismatch(_)) => DomainError::invariant(err.to_string()),
            err => DomainError::validation(err.to_string()),
        }
    }
}
