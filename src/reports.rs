use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::error::{Result, TillrollError};
use crate::models::{Transaction, TransactionType};

// ---------------------------------------------------------------------------
// Date range helper
// ---------------------------------------------------------------------------

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && date <= self.to
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| TillrollError::Other(format!("invalid date '{raw}' (expected YYYY-MM-DD)")))
}

/// Build a range from `--year`/`--month` or `--from`/`--to` style options.
/// No options means all dates.
pub fn date_range(
    year: Option<i32>,
    month: Option<u32>,
    from_date: Option<&str>,
    to_date: Option<&str>,
) -> Result<Option<DateRange>> {
    match (from_date, to_date) {
        (Some(from), Some(to)) => {
            let range = DateRange {
                from: parse_date(from)?,
                to: parse_date(to)?,
            };
            if range.from > range.to {
                return Err(TillrollError::Other(format!("--from {from} is after --to {to}")));
            }
            return Ok(Some(range));
        }
        (Some(_), None) => {
            return Err(TillrollError::Other(
                "--from requires --to (both date boundaries must be specified)".to_string(),
            ));
        }
        (None, Some(_)) => {
            return Err(TillrollError::Other(
                "--to requires --from (both date boundaries must be specified)".to_string(),
            ));
        }
        (None, None) => {}
    }
    let invalid = || TillrollError::Other("invalid --year/--month".to_string());
    match (year, month) {
        (Some(y), Some(m)) => {
            let from = NaiveDate::from_ymd_opt(y, m, 1).ok_or_else(invalid)?;
            let next = if m == 12 {
                NaiveDate::from_ymd_opt(y + 1, 1, 1)
            } else {
                NaiveDate::from_ymd_opt(y, m + 1, 1)
            }
            .ok_or_else(invalid)?;
            let to = next.pred_opt().ok_or_else(invalid)?;
            Ok(Some(DateRange { from, to }))
        }
        (Some(y), None) => Ok(Some(DateRange {
            from: NaiveDate::from_ymd_opt(y, 1, 1).ok_or_else(invalid)?,
            to: NaiveDate::from_ymd_opt(y, 12, 31).ok_or_else(invalid)?,
        })),
        (None, Some(_)) => Err(TillrollError::Other("--month requires --year".to_string())),
        (None, None) => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Totals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Totals {
    pub income: f64,
    pub expenses: f64,
    pub net: f64,
    /// Transactions skipped because they duplicate a linked counterpart.
    pub excluded_duplicates: usize,
    pub counted: usize,
}

fn in_range(t: &Transaction, range: Option<&DateRange>) -> bool {
    range.map_or(true, |r| r.contains(t.date))
}

/// Income and expense totals. A transaction flagged as the duplicate half
/// of a linked pair is never summed.
pub fn compute_totals(txns: &[Transaction], range: Option<&DateRange>) -> Totals {
    let mut totals = Totals::default();
    for t in txns.iter().filter(|t| in_range(t, range)) {
        if t.is_duplicate_of_linked {
            totals.excluded_duplicates += 1;
            continue;
        }
        totals.counted += 1;
        match t.kind {
            TransactionType::Income => totals.income += t.amount,
            TransactionType::Expense => totals.expenses += t.amount,
        }
    }
    totals.net = totals.income - totals.expenses;
    totals
}

// ---------------------------------------------------------------------------
// Category breakdown
// ---------------------------------------------------------------------------

pub struct CategoryTotal {
    pub name: String,
    pub total: f64,
    pub count: usize,
}

/// Expense totals per category, largest first. Duplicates are excluded the
/// same way as in [`compute_totals`].
pub fn expenses_by_category(txns: &[Transaction], range: Option<&DateRange>) -> Vec<CategoryTotal> {
    let mut by_name: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for t in txns.iter().filter(|t| in_range(t, range)) {
        if t.is_duplicate_of_linked || t.kind != TransactionType::Expense {
            continue;
        }
        let name = t.category.clone().unwrap_or_else(|| "Uncategorized".to_string());
        let entry = by_name.entry(name).or_insert((0.0, 0));
        entry.0 += t.amount;
        entry.1 += 1;
    }
    let mut items: Vec<CategoryTotal> = by_name
        .into_iter()
        .map(|(name, (total, count))| CategoryTotal { name, total, count })
        .collect();
    items.sort_by(|a, b| b.total.total_cmp(&a.total));
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linkage::LinkageEngine;
    use crate::models::IncomeSource;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn expense(amount: f64, date: NaiveDate, category: Option<&str>) -> Transaction {
        let mut t = Transaction::new(TransactionType::Expense, date, amount);
        t.category = category.map(String::from);
        t
    }

    #[test]
    fn test_totals_exclude_linked_duplicates() {
        let check = Transaction::income(d(2024, 3, 1), 500.0, IncomeSource::Check);
        let deposit = Transaction::income(d(2024, 3, 4), 500.0, IncomeSource::Deposit);
        let (check_id, deposit_id) = (check.id.clone(), deposit.id.clone());
        let mut txns = vec![check, deposit, expense(120.0, d(2024, 3, 2), Some("Supplies"))];

        let before = compute_totals(&txns, None);
        assert_eq!(before.income, 1000.0);

        LinkageEngine::new(&mut txns).link(&check_id, &deposit_id, &deposit_id).unwrap();
        let after = compute_totals(&txns, None);
        assert_eq!(after.income, 500.0);
        assert_eq!(after.expenses, 120.0);
        assert_eq!(after.net, 380.0);
        assert_eq!(after.excluded_duplicates, 1);
        assert_eq!(after.counted, 2);
    }

    #[test]
    fn test_totals_respect_range() {
        let txns = vec![
            expense(10.0, d(2024, 1, 31), None),
            expense(20.0, d(2024, 2, 1), None),
            expense(40.0, d(2024, 2, 29), None),
            expense(80.0, d(2024, 3, 1), None),
        ];
        let feb = date_range(Some(2024), Some(2), None, None).unwrap();
        assert_eq!(compute_totals(&txns, feb.as_ref()).expenses, 60.0);
        let all = compute_totals(&txns, None);
        assert_eq!(all.expenses, 150.0);
    }

    #[test]
    fn test_date_range_options() {
        assert_eq!(date_range(None, None, None, None).unwrap(), None);
        let dec = date_range(Some(2023), Some(12), None, None).unwrap().unwrap();
        assert_eq!(dec.to, d(2023, 12, 31));
        let year = date_range(Some(2024), None, None, None).unwrap().unwrap();
        assert_eq!(year.from, d(2024, 1, 1));
        let custom = date_range(None, None, Some("2024-01-05"), Some("2024-02-01")).unwrap().unwrap();
        assert!(custom.contains(d(2024, 1, 20)));
        assert!(date_range(None, None, Some("2024-01-05"), None).is_err());
        assert!(date_range(None, None, Some("2024-03-05"), Some("2024-02-01")).is_err());
        assert!(date_range(None, Some(3), None, None).is_err());
        assert!(date_range(Some(2024), Some(13), None, None).is_err());
    }

    #[test]
    fn test_expenses_by_category() {
        let mut dup = expense(999.0, d(2024, 1, 1), Some("Travel"));
        dup.is_duplicate_of_linked = true;
        let txns = vec![
            expense(30.0, d(2024, 1, 1), Some("Meals")),
            expense(50.0, d(2024, 1, 2), Some("Supplies")),
            expense(25.0, d(2024, 1, 3), Some("Meals")),
            expense(5.0, d(2024, 1, 3), None),
            dup,
        ];
        let items = expenses_by_category(&txns, None);
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Meals", "Supplies", "Uncategorized"]);
        assert_eq!(items[0].total, 55.0);
        assert_eq!(items[0].count, 2);
    }
}
