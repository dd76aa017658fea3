use comfy_table::{Cell, Table};

use tillroll::error::Result;
use tillroll::extractor::{classify_document, extract};
use tillroll::fmt::{money, opt_money};

pub fn run(file: &str) -> Result<()> {
    let text = std::fs::read_to_string(file)?;
    let fields = extract(&text);
    let doc_type = classify_document(&text, &fields);

    let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    let mut table = Table::new();
    table.set_header(vec!["Field", "Value"]);
    let rows: Vec<(&str, String)> = vec![
        ("Document", doc_type.as_str().to_string()),
        ("Vendor", opt(&fields.vendor)),
        ("Date", fields.date.map(|d| d.to_string()).unwrap_or_else(|| "-".into())),
        ("Time", fields.time.map(|t| t.to_string()).unwrap_or_else(|| "-".into())),
        ("Subtotal", opt_money(fields.subtotal)),
        ("Tax", opt_money(fields.tax)),
        ("Tip", opt_money(fields.tip)),
        ("Total", opt_money(fields.amount)),
        ("Payment", opt(&fields.payment_method)),
        ("Currency", opt(&fields.currency)),
        ("Store", opt(&fields.store_id)),
        ("Transaction #", opt(&fields.transaction_number)),
        ("Order #", opt(&fields.order_number)),
        ("Invoice #", opt(&fields.invoice_number)),
        ("Account #", opt(&fields.account_number)),
    ];
    for (name, value) in rows {
        table.add_row(vec![Cell::new(name), Cell::new(value)]);
    }
    println!("Extracted Fields\n{table}");

    if !fields.line_items.is_empty() {
        let mut items = Table::new();
        items.set_header(vec!["Item", "Price"]);
        for item in &fields.line_items {
            items.add_row(vec![Cell::new(&item.description), Cell::new(money(item.price))]);
        }
        println!("\nLine Items ({})\n{items}", fields.line_items.len());
    }
    Ok(())
}
