//! The default chart of accounts seeded for every new company.

use crate::account::{AccountCategory, AccountType};

/// One row of a chart template. `parent` refers to another template row by code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartTemplateEntry {
    pub code: &'static str,
    pub name: &'static str,
    pub account_type: AccountType,
    pub category: AccountCategory,
    pub level: u8,
    pub is_header: bool,
    pub parent: Option<&'static str>,
}

const fn entry(
    code: &'static str,
    name: &'static str,
    category: AccountCategory,
    level: u8,
    is_header: bool,
    parent: Option<&'static str>,
) -> ChartTemplateEntry {
    let account_type = match category {
        AccountCategory::CurrentAsset | AccountCategory::FixedAsset => AccountType::Asset,
        AccountCategory::CurrentLiability | AccountCategory::LongTermLiability => {
            AccountType::Liability
        }
        AccountCategory::Equity => AccountType::Equity,
        AccountCategory::OperatingRevenue | AccountCategory::OtherRevenue => AccountType::Revenue,
        AccountCategory::OperatingExpense | AccountCategory::OtherExpense => AccountType::Expense,
    };

    ChartTemplateEntry {
        code,
        name,
        account_type,
        category,
        level,
        is_header,
        parent,
    }
}

use AccountCategory::*;

/// Parents always precede their children, so the template can be seeded in order.
pub const DEFAULT_CHART: [ChartTemplateEntry; 29] = [
    entry("1-0000", "ASSETS", CurrentAsset, 1, true, None),
    entry("1-1000", "Current Assets", CurrentAsset, 2, true, Some("1-0000")),
    entry("1-1100", "Cash", CurrentAsset, 3, false, Some("1-1000")),
    entry("1-1200", "Bank", CurrentAsset, 3, false, Some("1-1000")),
    entry("1-1300", "Accounts Receivable", CurrentAsset, 3, false, Some("1-1000")),
    entry("1-1400", "Merchandise Inventory", CurrentAsset, 3, false, Some("1-1000")),
    entry("1-2000", "Fixed Assets", FixedAsset, 2, true, Some("1-0000")),
    entry("1-2100", "Equipment", FixedAsset, 3, false, Some("1-2000")),
    entry("1-2200", "Vehicles", FixedAsset, 3, false, Some("1-2000")),
    entry("1-2300", "Buildings", FixedAsset, 3, false, Some("1-2000")),
    entry("2-0000", "LIABILITIES", CurrentLiability, 1, true, None),
    entry("2-1000", "Current Liabilities", CurrentLiability, 2, true, Some("2-0000")),
    entry("2-1100", "Accounts Payable", CurrentLiability, 3, false, Some("2-1000")),
    entry("2-1200", "Taxes Payable", CurrentLiability, 3, false, Some("2-1000")),
    entry("2-2000", "Long-Term Liabilities", LongTermLiability, 2, true, Some("2-0000")),
    entry("2-2100", "Long-Term Bank Loans", LongTermLiability, 3, false, Some("2-2000")),
    entry("3-0000", "EQUITY", Equity, 1, true, None),
    entry("3-1000", "Owner's Capital", Equity, 2, false, Some("3-0000")),
    entry("3-2000", "Retained Earnings", Equity, 2, false, Some("3-0000")),
    entry("4-0000", "REVENUE", OperatingRevenue, 1, true, None),
    entry("4-1000", "Operating Revenue", OperatingRevenue, 2, false, Some("4-0000")),
    entry("4-2000", "Other Revenue", OtherRevenue, 2, false, Some("4-0000")),
    entry("5-0000", "EXPENSES", OperatingExpense, 1, true, None),
    entry("5-1000", "Operating Expenses", OperatingExpense, 2, true, Some("5-0000")),
    entry("5-1100", "Salaries Expense", OperatingExpense, 3, false, Some("5-1000")),
    entry("5-1200", "Rent Expense", OperatingExpense, 3, false, Some("5-1000")),
    entry("5-1300", "Utilities Expense", OperatingExpense, 3, false, Some("5-1000")),
    entry("5-1400", "Telephone & Internet Expense", OperatingExpense, 3, false, Some("5-1000")),
    entry("5-2000", "Other Expenses", OtherExpense, 2, false, Some("5-0000")),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_are_unique_and_parents_come_first() {
        let mut seen = HashSet::new();
        for row in DEFAULT_CHART {
            if let Some(parent) = row.parent {
                assert!(seen.contains(parent), "{} listed before its parent {parent}", row.code);
            }
            assert!(seen.insert(row.code), "duplicate code {}", row.code);
        }
    }

    #[test]
    fn categories_agree_with_types_and_levels_nest() {
        for row in DEFAULT_CHART {
            assert_eq!(row.category.account_type(), row.account_type, "{}", row.code);
            assert_eq!(row.parent.is_none(), row.level == 1, "{}", row.code);
        }
    }

    #[test]
    fn covers_all_five_types_with_postable_accounts() {
        for t in AccountType::ALL {
            assert!(
                DEFAULT_CHART.iter().any(|r| r.account_type == t && !r.is_header),
                "no postable {t} account"
            );
        }
    }

    #[test]
    fn cash_and_bank_are_postable_current_assets() {
        for code in ["1-1100", "1-1200"] {
            let row = DEFAULT_CHART.iter().find(|r| r.code == code).unwrap();
            assert_eq!(row.category, AccountCategory::CurrentAsset);
            assert!(!row.is_header);
        }
    }
}
