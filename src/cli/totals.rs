use colored::Colorize;
use comfy_table::{Cell, Table};

use tillroll::db::load_transactions;
use tillroll::error::Result;
use tillroll::fmt::money;
use tillroll::reports::{compute_totals, date_range, expenses_by_category};

use super::open_db;

pub fn run(year: Option<i32>, month: Option<u32>, from_date: Option<&str>, to_date: Option<&str>) -> Result<()> {
    let (_, conn) = open_db()?;
    let range = date_range(year, month, from_date, to_date)?;
    let txns = load_transactions(&conn)?;
    let totals = compute_totals(&txns, range.as_ref());

    let mut table = Table::new();
    table.set_header(vec!["", "Amount"]);
    table.add_row(vec![Cell::new("Income".green().bold()), Cell::new(money(totals.income))]);
    table.add_row(vec![Cell::new("Expenses".red().bold()), Cell::new(money(totals.expenses))]);
    let net_label = if totals.net >= 0.0 {
        "NET".green().bold()
    } else {
        "NET".red().bold()
    };
    table.add_row(vec![Cell::new(net_label), Cell::new(money(totals.net))]);

    let heading = match range {
        Some(r) => format!("Totals {} to {}", r.from, r.to),
        None => "Totals (all dates)".to_string(),
    };
    println!("{heading}\n{table}");
    println!(
        "{} transactions counted, {} linked duplicates excluded",
        totals.counted, totals.excluded_duplicates
    );

    let categories = expenses_by_category(&txns, range.as_ref());
    if !categories.is_empty() {
        let mut ctable = Table::new();
        ctable.set_header(vec!["Category", "Amount", "Count"]);
        for item in &categories {
            ctable.add_row(vec![
                Cell::new(&item.name),
                Cell::new(money(item.total)),
                Cell::new(item.count),
            ]);
        }
        println!("\nExpenses by Category\n{ctable}");
    }
    Ok(())
}
