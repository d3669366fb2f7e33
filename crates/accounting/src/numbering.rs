use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Human-facing journal number: `<prefix>/<YYYYMM>/<NNNN>`, e.g. `JRN/202401/0007`.
///
/// Unique per company; the sequence restarts every month.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JournalNumber(String);

impl JournalNumber {
    pub const DEFAULT_PREFIX: &'static str = "JRN";

    /// The `<prefix>/<YYYYMM>/` part shared by every number of one month.
    pub fn period_prefix(prefix: &str, date: NaiveDate) -> String {
        format!("{prefix}/{:04}{:02}/", date.year(), date.month())
    }

    pub fn compose(prefix: &str, date: NaiveDate, sequence: u32) -> Self {
        Self(format!("{}{sequence:04}", Self::period_prefix(prefix, date)))
    }

    /// A number read back from storage, taken as is.
    pub fn restore(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    /// Sequence part of this number when it belongs to `period_prefix`.
    pub fn sequence_within(&self, period_prefix: &str) -> Option<u32> {
        self.0.strip_prefix(period_prefix)?.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for JournalNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
