use comfy_table::{Cell, Table};

use tillroll::categorizer::{self, MatchType};
use tillroll::error::Result;

use super::open_db;

pub fn add(pattern: &str, category: &str, match_type: &str, priority: i64) -> Result<()> {
    let (_, conn) = open_db()?;
    let match_type: MatchType = match_type.parse()?;
    categorizer::add_rule(&conn, pattern, match_type, category, priority)?;
    println!("Added rule: '{pattern}' \u{2192} {category}");
    Ok(())
}

pub fn list() -> Result<()> {
    let (_, conn) = open_db()?;
    let rules = categorizer::list_rules(&conn)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Pattern", "Type", "Category", "Priority", "Hits", "Learned"]);
    for rule in rules {
        table.add_row(vec![
            Cell::new(rule.id),
            Cell::new(&rule.pattern),
            Cell::new(rule.match_type.as_str()),
            Cell::new(&rule.category),
            Cell::new(rule.priority),
            Cell::new(rule.hit_count),
            Cell::new(if rule.from_correction { "yes" } else { "" }),
        ]);
    }
    println!("Rules\n{table}");
    Ok(())
}
