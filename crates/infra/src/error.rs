use thiserror::Error;

use tallybook_accounting::AccountingError;
use tallybook_core::DomainError;

use crate::store::StoreError;

pub type EngineResult<T> = Result<T, EngineError>;

/// Failure of a service operation: either an accounting rule refused it or the
/// store could not carry it out.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Accounting(#[from] AccountingError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
