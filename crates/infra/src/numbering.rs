use chrono::NaiveDate;

use tallybook_accounting::JournalNumber;
use tallybook_core::CompanyId;

use crate::store::{JournalStore, StoreError};

/// Hands out `<prefix>/<YYYYMM>/<NNNN>` journal numbers.
///
/// Sequences come from a per-company, per-month high-water mark kept by the store,
/// so a number freed by deleting a draft is never handed out again, not even when
/// it was the latest of its month.
#[derive(Debug, Clone)]
pub struct JournalNumberGenerator {
    prefix: String,
}

impl Default for JournalNumberGenerator {
    fn default() -> Self {
        Self::new(JournalNumber::DEFAULT_PREFIX)
    }
}

impl JournalNumberGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn next<S>(
        &self,
        store: &S,
        company_id: CompanyId,
        transaction_date: NaiveDate,
    ) -> Result<JournalNumber, StoreError>
    where
        S: JournalStore + ?Sized,
    {
        let period = JournalNumber::period_prefix(&self.prefix, transaction_date);
        let sequence = store.next_journal_sequence(company_id, &period)?;

        Ok(JournalNumber::compose(&self.prefix, transaction_date, sequence))
    }
}
