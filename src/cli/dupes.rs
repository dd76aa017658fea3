use colored::Colorize;
use comfy_table::{Cell, Table};

use tillroll::db::{load_transactions, resolve_transaction_id};
use tillroll::dedup::DuplicateDetector;
use tillroll::error::{Result, TillrollError};
use tillroll::fmt::{money, short_id};

use super::open_db;

pub fn run(id: &str) -> Result<()> {
    let (settings, conn) = open_db()?;
    let id = resolve_transaction_id(&conn, id)?;
    let txns = load_transactions(&conn)?;
    let txn = txns
        .iter()
        .find(|t| t.id == id)
        .ok_or_else(|| TillrollError::UnknownTransaction(id.clone()))?;

    if !txn.is_income() {
        println!("Duplicate detection only applies to income transactions.");
        return Ok(());
    }
    if let Some(other) = &txn.linked_transaction_id {
        println!("Transaction {} is already linked to {}.", short_id(&txn.id), short_id(other));
        return Ok(());
    }

    let detector = DuplicateDetector::new(settings.duplicates.clone());
    let candidates = detector.find(txn, &txns);
    if candidates.is_empty() {
        println!("No likely duplicates.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Source", "Amount", "Score", "Reasons"]);
    for c in &candidates {
        let Some(other) = txns.iter().find(|t| t.id == c.transaction_id) else {
            continue;
        };
        table.add_row(vec![
            Cell::new(short_id(&other.id)),
            Cell::new(other.date),
            Cell::new(other.income_source.map(|s| s.as_str()).unwrap_or("-")),
            Cell::new(money(other.amount)),
            Cell::new(c.score),
            Cell::new(c.reasons.join(", ")),
        ]);
    }
    println!(
        "{}",
        format!(
            "Warning: {} possible duplicate(s) of {} {} on {}",
            candidates.len(),
            short_id(&txn.id),
            money(txn.amount),
            txn.date
        )
        .yellow()
    );
    println!("{table}");
    println!("Nothing was changed. Link a pair with `tillroll link <a> <b> --duplicate <id>`.");
    Ok(())
}
