use tillroll::db::{load_transactions, resolve_transaction_id, save_transactions};
use tillroll::error::Result;
use tillroll::fmt::short_id;
use tillroll::linkage::LinkageEngine;

use super::open_db;

pub fn link(a: &str, b: &str, duplicate: &str) -> Result<()> {
    let (_, conn) = open_db()?;
    let a = resolve_transaction_id(&conn, a)?;
    let b = resolve_transaction_id(&conn, b)?;
    let duplicate = resolve_transaction_id(&conn, duplicate)?;

    let mut txns = load_transactions(&conn)?;
    LinkageEngine::new(&mut txns).link(&a, &b, &duplicate)?;
    let changed: Vec<_> = txns.into_iter().filter(|t| t.id == a || t.id == b).collect();
    save_transactions(&conn, &changed)?;

    println!(
        "Linked {} \u{2194} {} ({} excluded from totals)",
        short_id(&a),
        short_id(&b),
        short_id(&duplicate)
    );
    Ok(())
}

pub fn unlink(a: &str, b: &str) -> Result<()> {
    let (_, conn) = open_db()?;
    let a = resolve_transaction_id(&conn, a)?;
    let b = resolve_transaction_id(&conn, b)?;

    let mut txns = load_transactions(&conn)?;
    LinkageEngine::new(&mut txns).unlink(&a, &b)?;
    let changed: Vec<_> = txns.into_iter().filter(|t| t.id == a || t.id == b).collect();
    save_transactions(&conn, &changed)?;

    println!("Unlinked {} and {}", short_id(&a), short_id(&b));
    Ok(())
}
