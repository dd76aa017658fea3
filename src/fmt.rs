use colored::{ColoredString, Colorize};

use crate::models::{Receipt, VerificationLevel};

/// Format a float as a dollar amount with thousands separators: $1,234.56
pub fn money(val: f64) -> String {
    let negative = val < 0.0;
    let abs = val.abs();
    let cents = format!("{:.2}", abs);
    let (int_part, dec_part) = cents.split_once('.').unwrap_or((&cents, "00"));

    let mut with_commas = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_commas.push(',');
        }
        with_commas.push(c);
    }
    let with_commas: String = with_commas.chars().rev().collect();

    if negative {
        format!("-${with_commas}.{dec_part}")
    } else {
        format!("${with_commas}.{dec_part}")
    }
}

pub fn opt_money(val: Option<f64>) -> String {
    val.map(money).unwrap_or_else(|| "-".to_string())
}

/// First eight characters of an id, enough to type back as a prefix.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

pub fn level_label(level: VerificationLevel) -> ColoredString {
    match level {
        VerificationLevel::Strong => level.as_str().green(),
        VerificationLevel::Bank => level.as_str().cyan(),
        VerificationLevel::SelfReported => level.as_str().normal(),
    }
}

/// One-word status for a receipt listing.
pub fn receipt_status(r: &Receipt) -> ColoredString {
    if r.is_duplicate {
        "duplicate".red()
    } else if r.ocr_failed && !r.user_validated {
        "needs review".yellow()
    } else if r.is_supplemental_doc {
        "supplemental".dimmed()
    } else if r.user_validated {
        "validated".green()
    } else if r.amount.is_none() {
        "no total".yellow()
    } else {
        "ok".green()
    }
}
