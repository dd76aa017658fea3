use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use tillroll::categorizer::{apply_suggestions, record_correction, record_hits, RuleSuggester};
use tillroll::db::{
    get_receipt, get_transaction, load_transactions, resolve_receipt_id, resolve_transaction_id,
    save_transaction, save_transactions, transaction_for_receipt,
};
use tillroll::dedup::DuplicateDetector;
use tillroll::error::{Result, TillrollError};
use tillroll::fmt::{level_label, money, short_id};
use tillroll::importer::import_file;
use tillroll::models::{IncomeSource, Transaction, TransactionEdit, TransactionType};
use tillroll::reports::date_range;
use tillroll::settings::Settings;

use super::{open_db, parse_cli_date};

fn warn_possible_duplicates(settings: &Settings, txn: &Transaction, all: &[Transaction]) {
    let candidates = DuplicateDetector::new(settings.duplicates.clone()).find(txn, all);
    if let Some(best) = candidates.first() {
        println!(
            "{}",
            format!(
                "Warning: looks like a duplicate of {} (score {}). See `tillroll dupes {}`.",
                short_id(&best.transaction_id),
                best.score,
                short_id(&txn.id)
            )
            .yellow()
        );
    }
}

pub fn add(
    amount: f64,
    date: &str,
    txn_type: &str,
    source: Option<&str>,
    vendor: Option<&str>,
    category: Option<&str>,
) -> Result<()> {
    let (settings, conn) = open_db()?;
    if amount <= 0.0 {
        return Err(TillrollError::Other("amount must be positive".into()));
    }
    let kind: TransactionType = txn_type.parse()?;
    let date = parse_cli_date(date)?;

    let mut txn = match kind {
        TransactionType::Income => {
            let source: IncomeSource = source.unwrap_or("other").parse()?;
            Transaction::income(date, amount, source)
        }
        TransactionType::Expense => {
            if source.is_some() {
                return Err(TillrollError::Other("--source only applies to income".into()));
            }
            Transaction::new(kind, date, amount)
        }
    };
    txn.vendor = vendor.map(String::from);
    txn.category = category.map(String::from);
    let applied = apply_suggestions(&RuleSuggester::load(&conn)?, std::slice::from_mut(&mut txn));
    save_transaction(&conn, &txn)?;
    record_hits(&conn, &applied)?;

    println!(
        "Added {} {} {} on {}",
        kind.as_str(),
        short_id(&txn.id),
        money(txn.amount),
        txn.date
    );
    if txn.is_income() {
        let all = load_transactions(&conn)?;
        warn_possible_duplicates(&settings, &txn, &all);
    }
    Ok(())
}

pub fn list(year: Option<i32>, month: Option<u32>) -> Result<()> {
    let (_, conn) = open_db()?;
    let range = date_range(year, month, None, None)?;
    let txns: Vec<Transaction> = load_transactions(&conn)?
        .into_iter()
        .filter(|t| range.map_or(true, |r| r.contains(t.date)))
        .collect();
    if txns.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Type", "Vendor", "Category", "Amount", "Level", "Linked"]);
    for t in &txns {
        let amount = match t.kind {
            TransactionType::Income => money(t.amount).green().to_string(),
            TransactionType::Expense => money(t.amount).red().to_string(),
        };
        let kind = match t.income_source {
            Some(source) => format!("{} ({})", t.kind.as_str(), source.as_str()),
            None => t.kind.as_str().to_string(),
        };
        let linked = match &t.linked_transaction_id {
            Some(other) if t.is_duplicate_of_linked => format!("{} (excluded)", short_id(other)),
            Some(other) => short_id(other).to_string(),
            None => String::new(),
        };
        table.add_row(vec![
            Cell::new(short_id(&t.id)),
            Cell::new(t.date),
            Cell::new(kind),
            Cell::new(t.vendor.as_deref().unwrap_or("")),
            Cell::new(t.category.as_deref().unwrap_or("")),
            Cell::new(amount),
            Cell::new(level_label(t.verification_level)),
            Cell::new(linked),
        ]);
    }
    println!("Transactions ({})\n{table}", txns.len());
    Ok(())
}

pub fn from_receipt(id: &str) -> Result<()> {
    let (_, conn) = open_db()?;
    let id = resolve_receipt_id(&conn, id)?;
    if let Some(existing) = transaction_for_receipt(&conn, &id)? {
        return Err(TillrollError::Other(format!(
            "receipt {} already has transaction {}",
            short_id(&id),
            short_id(&existing.id)
        )));
    }
    let receipt = get_receipt(&conn, &id)?;
    let Some(mut txn) = Transaction::from_receipt(&receipt) else {
        let why = if receipt.is_duplicate {
            "is a duplicate"
        } else if receipt.is_supplemental_doc {
            "is a supporting document"
        } else {
            "has no total"
        };
        return Err(TillrollError::Other(format!(
            "receipt {} {why} and cannot become an expense",
            short_id(&id)
        )));
    };
    let applied = apply_suggestions(&RuleSuggester::load(&conn)?, std::slice::from_mut(&mut txn));
    save_transaction(&conn, &txn)?;
    record_hits(&conn, &applied)?;
    println!(
        "Added expense {} {} ({})",
        short_id(&txn.id),
        money(txn.amount),
        txn.category.as_deref().unwrap_or("uncategorized")
    );
    Ok(())
}

pub fn edit(
    id: &str,
    amount: Option<f64>,
    date: Option<&str>,
    vendor: Option<String>,
    category: Option<String>,
) -> Result<()> {
    let (_, conn) = open_db()?;
    let id = resolve_transaction_id(&conn, id)?;
    let mut txn = get_transaction(&conn, &id)?;
    let edit = TransactionEdit {
        amount,
        date: date.map(parse_cli_date).transpose()?,
        vendor,
        category,
    };
    let old_category = txn.category.clone();
    txn.apply_edit(&edit);
    save_transaction(&conn, &txn)?;
    println!("Updated {}", short_id(&txn.id));

    if txn.category != old_category {
        if let (Some(vendor), Some(category)) = (txn.vendor.as_deref(), txn.category.as_deref()) {
            record_correction(&conn, vendor, category)?;
            println!("Learned rule: '{vendor}' \u{2192} {category}");
        }
    }
    Ok(())
}

pub fn import(file: &str) -> Result<()> {
    let (settings, conn) = open_db()?;
    let mut result = import_file(&conn, Path::new(file))?;
    let applied = apply_suggestions(&RuleSuggester::load(&conn)?, &mut result.imported);
    save_transactions(&conn, &result.imported)?;
    record_hits(&conn, &applied)?;

    println!(
        "{} imported, {} skipped (duplicates)",
        result.imported.len(),
        result.skipped
    );
    if result.unreadable > 0 {
        println!("{}", format!("{} unreadable row(s) ignored", result.unreadable).yellow());
    }
    println!("{} categorized", applied.len());

    let all = load_transactions(&conn)?;
    for txn in result.imported.iter().filter(|t| t.is_income()) {
        warn_possible_duplicates(&settings, txn, &all);
    }
    Ok(())
}
