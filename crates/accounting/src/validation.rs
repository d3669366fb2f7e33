//! Structural and arithmetic checks run before a journal is stored.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::journal::EntryLine;

/// One reason a journal was rejected. All applicable violations are reported
/// together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum JournalViolation {
    TooFewEntries { count: usize },
    NegativeAmount { position: u32 },
    BothSides { position: u32 },
    EmptyEntry { position: u32 },
    Unbalanced { total_debit: Decimal, total_credit: Decimal },
}

impl core::fmt::Display for JournalViolation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            JournalViolation::TooFewEntries { count } => {
                write!(f, "journal must have at least 2 entries (got {count})")
            }
            JournalViolation::NegativeAmount { position } => {
                write!(f, "entry {position} has a negative amount")
            }
            JournalViolation::BothSides { position } => {
                write!(f, "entry {position} cannot have both debit and credit")
            }
            JournalViolation::EmptyEntry { position } => {
                write!(f, "entry {position} must have either debit or credit")
            }
            JournalViolation::Unbalanced {
                total_debit,
                total_credit,
            } => write!(
                f,
                "total debit ({total_debit}) must equal total credit ({total_credit})"
            ),
        }
    }
}

/// Debit and credit totals of a journal that passed validation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct JournalTotals {
    pub debit: Decimal,
    pub credit: Decimal,
}

/// Pure journal validator.
#[derive(Debug, Default, Clone, Copy)]
pub struct JournalValidator;

impl JournalValidator {
    pub const MIN_ENTRIES: usize = 2;

    /// Validate a set of entry lines. Totals are compared with exact decimal equality.
    pub fn validate(entries: &[EntryLine]) -> Result<JournalTotals, Vec<JournalViolation>> {
        let mut violations = Vec::new();

        if entries.len() < Self::MIN_ENTRIES {
            violations.push(JournalViolation::TooFewEntries {
                count: entries.len(),
            });
        }

        let mut total_debit = Decimal::ZERO;
        let mut total_credit = Decimal::ZERO;

        for line in entries {
            total_debit += line.debit;
            total_credit += line.credit;

            if line.debit < Decimal::ZERO || line.credit < Decimal::ZERO {
                violations.push(JournalViolation::NegativeAmount {
                    position: line.position,
                });
                continue;
            }
            if line.debit > Decimal::ZERO && line.credit > Decimal::ZERO {
                violations.push(JournalViolation::BothSides {
                    position: line.position,
                });
            }
            if line.debit.is_zero() && line.credit.is_zero() {
                violations.push(JournalViolation::EmptyEntry {
                    position: line.position,
                });
            }
        }

        if total_debit != total_credit {
            violations.push(JournalViolation::Unbalanced {
                total_debit,
                total_credit,
            });
        }

        if violations.is_empty() {
            Ok(JournalTotals {
                debit: total_debit,
                credit: total_credit,
            })
        } else {
            Err(violations)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use tallybook_core::AccountId;

    fn line(position: u32, debit: Decimal, credit: Decimal) -> EntryLine {
        EntryLine {
            account_id: AccountId::new(),
            description: String::new(),
            debit,
            credit,
            position,
        }
    }

    #[test]
    fn balanced_pair_passes_with_totals() {
        let totals = JournalValidator::validate(&[
            line(1, dec!(100.00), Decimal::ZERO),
            line(2, Decimal::ZERO, dec!(100.00)),
        ])
        .unwrap();

        assert_eq!(totals.debit, dec!(100.00));
        assert_eq!(totals.credit, dec!(100.00));
    }

    #[test]
    fn unbalanced_totals_are_reported() {
        let violations = JournalValidator::validate(&[
            line(1, dec!(100), Decimal::ZERO),
            line(2, Decimal::ZERO, dec!(90)),
        ])
        .unwrap_err();

        assert_eq!(
            violations,
            vec![JournalViolation::Unbalanced {
                total_debit: dec!(100),
                total_credit: dec!(90),
            }]
        );
    }

    #[test]
    fn every_broken_rule_is_reported_independently() {
        let violations = JournalValidator::validate(&[line(1, dec!(10), dec!(10))]).unwrap_err();

        assert!(violations.contains(&JournalViolation::TooFewEntries { count: 1 }));
        assert!(violations.contains(&JournalViolation::BothSides { position: 1 }));
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn zero_and_negative_entries_are_rejected() {
        let violations = JournalValidator::validate(&[
            line(1, Decimal::ZERO, Decimal::ZERO),
            line(2, dec!(-5), Decimal::ZERO),
            line(3, Decimal::ZERO, dec!(-5)),
        ])
        .unwrap_err();

        assert!(violations.contains(&JournalViolation::EmptyEntry { position: 1 }));
        assert!(violations.contains(&JournalViolation::NegativeAmount { position: 2 }));
        assert!(violations.contains(&JournalViolation::NegativeAmount { position: 3 }));
    }

    #[test]
    fn cent_amounts_sum_exactly() {
        // 0.1 + 0.2 style sums that drift under binary floating point.
        let lines = vec![
            line(1, dec!(0.10), Decimal::ZERO),
            line(2, dec!(0.20), Decimal::ZERO),
            line(3, Decimal::ZERO, dec!(0.30)),
        ];
        assert!(JournalValidator::validate(&lines).is_ok());
    }

    proptest! {
        /// Any split of a credit total into positive debit lines validates.
        #[test]
        fn split_debits_against_one_credit_always_balance(
            cents in prop::collection::vec(1i64..10_000_000i64, 1..12)
        ) {
            let mut lines: Vec<EntryLine> = cents
                .iter()
                .enumerate()
                .map(|(i, c)| line(i as u32 + 1, Decimal::new(*c, 2), Decimal::ZERO))
                .collect();
            let total: i64 = cents.iter().sum();
            lines.push(line(lines.len() as u32 + 1, Decimal::ZERO, Decimal::new(total, 2)));

            let totals = JournalValidator::validate(&lines).unwrap();
            prop_assert_eq!(totals.debit, totals.credit);
        }

        /// Shifting one side by a single cent always breaks the balance.
        #[test]
        fn off_by_one_cent_is_never_accepted(amount in 1i64..10_000_000i64) {
            let lines = vec![
                line(1, Decimal::new(amount, 2), Decimal::ZERO),
                line(2, Decimal::ZERO, Decimal::new(amount + 1, 2)),
            ];
            let violations = JournalValidator::validate(&lines).unwrap_err();
            let is_unbalanced = matches!(violations.as_slice(), [JournalViolation::Unbalanced { .. }]);
            prop_assert!(is_unbalanced);
        }
    }
}
