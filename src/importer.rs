//! CSV import of bank or hand-kept transaction lists.
//!
//! The file needs a header row. Recognised columns (case-insensitive):
//! `date`, `amount`, and optionally `description`/`vendor`/`payee`,
//! `category`, `type` and `source`. Without a `type` column the sign of the
//! amount decides: negative rows are expenses, positive rows are deposits.

use std::path::Path;

use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::db::{load_transactions, save_transactions};
use crate::error::{Result, TillrollError};
use crate::models::{IncomeSource, Transaction, TransactionType};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a statement amount: `$1,234.56`, `"500.00"`, `(42.00)` for
/// negatives. Unparseable input yields `None`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let s = raw.replace([',', '"', '$'], "");
    let s = s.trim();
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        return inner.trim().parse::<f64>().ok().map(|v| -v);
    }
    s.parse().ok()
}

pub fn parse_date_mdy(raw: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = raw.trim().split('/').collect();
    if parts.len() != 3 {
        return None;
    }
    let m: u32 = parts[0].parse().ok()?;
    let d: u32 = parts[1].parse().ok()?;
    let y: i32 = parts[2].parse().ok()?;
    NaiveDate::from_ymd_opt(y, m, d)
}

/// ISO dates first, then US month/day/year.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .or_else(|| parse_date_mdy(raw))
}

struct Columns {
    date: usize,
    amount: usize,
    vendor: Option<usize>,
    category: Option<usize>,
    kind: Option<usize>,
    source: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        };
        let missing = |name: &str| TillrollError::Other(format!("CSV has no '{name}' column"));
        Ok(Self {
            date: find(&["date", "posted date", "posting date"]).ok_or_else(|| missing("date"))?,
            amount: find(&["amount"]).ok_or_else(|| missing("amount"))?,
            vendor: find(&["vendor", "payee", "description", "merchant"]),
            category: find(&["category"]),
            kind: find(&["type"]),
            source: find(&["source", "income source"]),
        })
    }
}

fn field<'r>(record: &'r csv::StringRecord, idx: Option<usize>) -> Option<&'r str> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Parse rows into transactions. Rows without a readable date or amount,
/// or with a type or income source that does not parse, are skipped and
/// counted in the second value.
pub fn parse_file(path: &Path) -> Result<(Vec<Transaction>, usize)> {
    let file = std::fs::File::open(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));
    let cols = Columns::from_headers(rdr.headers()?)?;

    let mut txns = Vec::new();
    let mut unreadable = 0usize;
    for (line, result) in rdr.records().enumerate() {
        let record = result?;
        let date = field(&record, Some(cols.date)).and_then(parse_date);
        let amount = field(&record, Some(cols.amount)).and_then(parse_amount);
        let (Some(date), Some(amount)) = (date, amount) else {
            warn!(line = line + 2, "skipping row without a readable date or amount");
            unreadable += 1;
            continue;
        };

        let kind = match field(&record, cols.kind) {
            Some(raw) => match raw.to_lowercase().parse::<TransactionType>() {
                Ok(kind) => kind,
                Err(e) => {
                    warn!(line = line + 2, error = %e, "skipping row with an unreadable type");
                    unreadable += 1;
                    continue;
                }
            },
            None if amount < 0.0 => TransactionType::Expense,
            None => TransactionType::Income,
        };
        let mut txn = Transaction::new(kind, date, amount.abs());
        if kind == TransactionType::Income {
            let source = match field(&record, cols.source) {
                Some(raw) => match raw.to_lowercase().parse::<IncomeSource>() {
                    Ok(source) => source,
                    Err(e) => {
                        warn!(line = line + 2, error = %e, "skipping row with an unreadable income source");
                        unreadable += 1;
                        continue;
                    }
                },
                None => IncomeSource::Deposit,
            };
            txn.income_source = Some(source);
        }
        txn.vendor = field(&record, cols.vendor).map(String::from);
        txn.category = field(&record, cols.category).map(String::from);
        txns.push(txn);
    }
    Ok((txns, unreadable))
}

fn same_row(a: &Transaction, b: &Transaction) -> bool {
    a.kind == b.kind && a.date == b.date && (a.amount - b.amount).abs() < 0.005 && a.vendor == b.vendor
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ImportResult {
    pub imported: Vec<Transaction>,
    /// Rows already present in the store.
    pub skipped: usize,
    pub unreadable: usize,
}

/// Import a CSV file into the store. Rows identical to a stored transaction
/// (type, date, amount, vendor) are skipped, so re-importing a file is safe.
pub fn import_file(conn: &Connection, path: &Path) -> Result<ImportResult> {
    let (parsed, unreadable) = parse_file(path)?;
    let existing = load_transactions(conn)?;

    let mut result = ImportResult {
        unreadable,
        ..Default::default()
    };
    for txn in parsed {
        let seen = existing.iter().chain(result.imported.iter()).any(|t| same_row(t, &txn));
        if seen {
            result.skipped += 1;
            continue;
        }
        result.imported.push(txn);
    }
    save_transactions(conn, &result.imported)?;
    debug!(
        imported = result.imported.len(),
        skipped = result.skipped,
        unreadable,
        "csv import finished"
    );
    Ok(result)
}
