//! Value objects: equality by value, not identity.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**: two date ranges with
/// the same bounds are the same range.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Inclusive calendar date range used by ledger queries and reports.
///
/// `start` is optional: an open start means "from inception".
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: Option<NaiveDate>,
    end: NaiveDate,
}

impl ValueObject for DateRange {}

impl DateRange {
    /// Closed range `[start, end]`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> DomainResult<Self> {
        if start > end {
            return Err(DomainError::validation(format!(
                "start date {start} is after end date {end}"
            )));
        }
        Ok(Self {
            start: Some(start),
            end,
        })
    }

    /// Everything from inception through `end` (inclusive).
    pub fn through(end: NaiveDate) -> Self {
        Self { start: None, end }
    }

    /// Everything strictly before `date`.
    pub fn before(date: NaiveDate) -> Self {
        Self {
            start: None,
            end: date.pred_opt().unwrap_or(NaiveDate::MIN),
        }
    }

    pub fn start(&self) -> Option<NaiveDate> {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s) && date <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn closed_range_is_inclusive_on_both_ends() {
        let r = DateRange::new(d(2024, 1, 1), d(2024, 1, 31)).unwrap();
        assert!(r.contains(d(2024, 1, 1)));
        assert!(r.contains(d(2024, 1, 31)));
        assert!(!r.contains(d(2023, 12, 31)));
        assert!(!r.contains(d(2024, 2, 1)));
    }

    #[test]
    fn before_excludes_the_boundary_date() {
        let r = DateRange::before(d(2024, 3, 1));
        assert!(r.contains(d(2024, 2, 29)));
        assert!(!r.contains(d(2024, 3, 1)));
        assert!(r.contains(d(1990, 1, 1)));
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(DateRange::new(d(2024, 2, 1), d(2024, 1, 1)).is_err());
    }
}
