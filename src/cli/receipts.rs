use comfy_table::{Cell, Table};

use tillroll::db::{get_receipt, load_receipts, resolve_receipt_id, save_receipt, save_receipts};
use tillroll::error::{Result, TillrollError};
use tillroll::fmt::{money, opt_money, receipt_status, short_id};
use tillroll::linker::DocumentLinker;
use tillroll::models::ReceiptEdit;

use super::{open_db, parse_cli_date};

pub fn list() -> Result<()> {
    let (_, conn) = open_db()?;
    let receipts = load_receipts(&conn)?;
    if receipts.is_empty() {
        println!("No receipts. Add some with `tillroll ingest <photos...>`.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Vendor", "Type", "Total", "Category", "Status"]);
    for r in &receipts {
        table.add_row(vec![
            Cell::new(short_id(&r.id)),
            Cell::new(r.date),
            Cell::new(r.vendor.as_deref().unwrap_or("")),
            Cell::new(r.document_type.as_str()),
            Cell::new(opt_money(r.amount)),
            Cell::new(r.category.as_deref().unwrap_or("")),
            Cell::new(receipt_status(r)),
        ]);
    }
    println!("Receipts ({})\n{table}", receipts.len());
    Ok(())
}

pub fn show(id: &str) -> Result<()> {
    let (_, conn) = open_db()?;
    let id = resolve_receipt_id(&conn, id)?;
    let r = get_receipt(&conn, &id)?;

    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    let mut table = Table::new();
    table.set_header(vec!["Field", "Value"]);
    let date = if r.date_is_fallback {
        format!("{} (ingest date)", r.date)
    } else {
        r.date.to_string()
    };
    let rows: Vec<(&str, String)> = vec![
        ("ID", r.id.clone()),
        ("File", format!("{} #{}", opt(&r.filename), r.region_index)),
        ("Type", r.document_type.as_str().to_string()),
        ("Status", receipt_status(&r).to_string()),
        ("Vendor", opt(&r.vendor)),
        ("Date", date),
        ("Time", r.time.map(|t| t.to_string()).unwrap_or_default()),
        ("Subtotal", opt_money(r.subtotal)),
        ("Tax", opt_money(r.tax)),
        ("Tip", opt_money(r.tip)),
        ("Total", opt_money(r.amount)),
        ("Payment", opt(&r.payment_method)),
        ("Currency", opt(&r.currency)),
        ("Category", opt(&r.category)),
        ("Identifiers", r.identifiers().join(", ")),
        ("Primary document", r.primary_document_id.as_deref().map(short_id).unwrap_or("").to_string()),
        (
            "Linked documents",
            r.linked_document_ids.iter().map(|d| short_id(d)).collect::<Vec<_>>().join(", "),
        ),
        ("Duplicate of", r.duplicate_of_id.as_deref().map(short_id).unwrap_or("").to_string()),
    ];
    for (name, value) in rows {
        table.add_row(vec![Cell::new(name), Cell::new(value)]);
    }
    println!("Receipt\n{table}");

    if !r.line_items.is_empty() {
        let mut items = Table::new();
        items.set_header(vec!["Item", "Price"]);
        for item in &r.line_items {
            items.add_row(vec![Cell::new(&item.description), Cell::new(money(item.price))]);
        }
        println!("\nLine Items\n{items}");
    }
    Ok(())
}

pub fn validate(
    id: &str,
    vendor: Option<String>,
    date: Option<&str>,
    amount: Option<f64>,
    category: Option<String>,
) -> Result<()> {
    let (_, conn) = open_db()?;
    if amount.is_some_and(|a| a <= 0.0) {
        return Err(TillrollError::Other("amount must be positive".into()));
    }
    let id = resolve_receipt_id(&conn, id)?;
    let mut receipt = get_receipt(&conn, &id)?;
    receipt.validate(&ReceiptEdit {
        vendor,
        date: date.map(parse_cli_date).transpose()?,
        amount,
        category,
    });
    save_receipt(&conn, &receipt)?;
    println!(
        "Validated {} {} {} on {}",
        short_id(&receipt.id),
        receipt.vendor.as_deref().unwrap_or("(no vendor)"),
        opt_money(receipt.amount),
        receipt.date
    );
    Ok(())
}

pub fn link(source: &str, primary: &str) -> Result<()> {
    let (_, conn) = open_db()?;
    let source = resolve_receipt_id(&conn, source)?;
    let primary = resolve_receipt_id(&conn, primary)?;

    let mut receipts = load_receipts(&conn)?;
    let link = DocumentLinker::new().link_manually(&mut receipts, &source, &primary)?;
    let changed: Vec<_> = receipts
        .into_iter()
        .filter(|r| r.id == source || r.id == primary)
        .collect();
    save_receipts(&conn, &changed)?;

    println!(
        "Attached {} \u{2192} {} (confidence {})",
        short_id(&link.source_id),
        short_id(&link.primary_id),
        link.confidence
    );
    Ok(())
}
