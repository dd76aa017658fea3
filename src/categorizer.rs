//! Categorization learning service.
//!
//! Suggestions come from vendor-pattern rules stored in SQLite. A category
//! correction made by the user becomes a new high-priority rule. Suggestions
//! are advisory only: they fill empty categories and never overwrite a value
//! the user set.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::error::{Result, TillrollError};
use crate::models::Transaction;

/// Priority given to rules learned from corrections, above hand-written
/// rules at the default priority.
pub const CORRECTION_PRIORITY: i64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub category: String,
    /// 0.0 to 1.0.
    pub confidence: f64,
    /// Stored rule behind the suggestion, when there is one.
    pub rule_id: Option<i64>,
}

pub trait CategorySuggester {
    fn suggest_category(&self, vendor: &str, amount: Option<f64>) -> Option<Suggestion>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Contains,
    StartsWith,
    Regex,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Contains => "contains",
            MatchType::StartsWith => "starts_with",
            MatchType::Regex => "regex",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchType {
    type Err = TillrollError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "contains" => Ok(MatchType::Contains),
            "starts_with" => Ok(MatchType::StartsWith),
            "regex" => Ok(MatchType::Regex),
            other => Err(TillrollError::Other(format!(
                "unknown match type '{other}' (expected contains, starts_with or regex)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRule {
    pub id: i64,
    pub pattern: String,
    pub match_type: MatchType,
    pub category: String,
    pub priority: i64,
    pub hit_count: i64,
    pub from_correction: bool,
}

impl CategoryRule {
    pub fn matches(&self, vendor: &str) -> bool {
        let vendor_upper = vendor.to_uppercase();
        let pat_upper = self.pattern.to_uppercase();
        match self.match_type {
            MatchType::Contains => vendor_upper.contains(&pat_upper),
            MatchType::StartsWith => vendor_upper.starts_with(&pat_upper),
            MatchType::Regex => Regex::new(&self.pattern)
                .map(|re| re.is_match(vendor))
                .unwrap_or(false),
        }
    }

    fn confidence(&self) -> f64 {
        let base = if self.from_correction { 0.8 } else { 0.6 };
        (base + 0.02 * self.hit_count as f64).min(0.95)
    }
}

/// Rule-based suggester. Rules are tried highest priority first; the first
/// match wins.
#[derive(Debug, Clone, Default)]
pub struct RuleSuggester {
    rules: Vec<CategoryRule>,
}

impl RuleSuggester {
    pub fn new(mut rules: Vec<CategoryRule>) -> Self {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        Self { rules }
    }

    pub fn load(conn: &Connection) -> Result<Self> {
        Ok(Self::new(list_rules(conn)?))
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    pub fn matching_rule(&self, vendor: &str) -> Option<&CategoryRule> {
        self.rules.iter().find(|r| r.matches(vendor))
    }
}

impl CategorySuggester for RuleSuggester {
    fn suggest_category(&self, vendor: &str, _amount: Option<f64>) -> Option<Suggestion> {
        let rule = self.matching_rule(vendor)?;
        Some(Suggestion {
            category: rule.category.clone(),
            confidence: rule.confidence(),
            rule_id: Some(rule.id),
        })
    }
}

/// Fill empty categories on transactions the user has not edited. Returns
/// the suggestions that were applied.
pub fn apply_suggestions(suggester: &dyn CategorySuggester, txns: &mut [Transaction]) -> Vec<Suggestion> {
    let mut applied = Vec::new();
    for txn in txns.iter_mut() {
        if txn.category.is_some() || txn.was_manually_edited {
            continue;
        }
        let Some(vendor) = txn.vendor.as_deref() else {
            continue;
        };
        if let Some(s) = suggester.suggest_category(vendor, Some(txn.amount)) {
            debug!(txn = %txn.id, category = %s.category, "category suggested");
            txn.category = Some(s.category.clone());
            applied.push(s);
        }
    }
    applied
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

pub fn add_rule(
    conn: &Connection,
    pattern: &str,
    match_type: MatchType,
    category: &str,
    priority: i64,
) -> Result<i64> {
    if match_type == MatchType::Regex {
        Regex::new(pattern).map_err(|e| TillrollError::Other(format!("invalid regex: {e}")))?;
    }
    conn.execute(
        "INSERT INTO category_rules (pattern, match_type, category, priority) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![pattern, match_type.as_str(), category, priority],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_rules(conn: &Connection) -> Result<Vec<CategoryRule>> {
    let mut stmt = conn.prepare(
        "SELECT id, pattern, match_type, category, priority, hit_count, from_correction \
         FROM category_rules WHERE is_active = 1 ORDER BY priority DESC, id",
    )?;
    let raw: Vec<(i64, String, String, String, i64, i64, bool)> = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    raw.into_iter()
        .map(|(id, pattern, match_type, category, priority, hit_count, from_correction)| {
            Ok(CategoryRule {
                id,
                pattern,
                match_type: match_type.parse()?,
                category,
                priority,
                hit_count,
                from_correction,
            })
        })
        .collect()
}

pub fn record_hit(conn: &Connection, rule_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE category_rules SET hit_count = hit_count + 1 WHERE id = ?1",
        [rule_id],
    )?;
    Ok(())
}

/// Count one hit for every applied suggestion that came from a stored rule.
pub fn record_hits(conn: &Connection, applied: &[Suggestion]) -> Result<()> {
    for rule_id in applied.iter().filter_map(|s| s.rule_id) {
        record_hit(conn, rule_id)?;
    }
    Ok(())
}

/// Learn from a category correction: the vendor now maps to `category`.
/// An earlier learned rule for the same vendor is updated in place.
pub fn record_correction(conn: &Connection, vendor: &str, category: &str) -> Result<i64> {
    let pattern = vendor.trim();
    if pattern.is_empty() {
        return Err(TillrollError::Other("cannot learn a rule for an empty vendor".into()));
    }
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM category_rules WHERE from_correction = 1 AND upper(pattern) = upper(?1)",
            [pattern],
            |r| r.get(0),
        )
        .optional()?;
    match existing {
        Some(id) => {
            conn.execute(
                "UPDATE category_rules SET category = ?1, is_active = 1 WHERE id = ?2",
                rusqlite::params![category, id],
            )?;
            debug!(rule = id, vendor = pattern, category, "learned rule updated");
            Ok(id)
        }
        None => {
            conn.execute(
                "INSERT INTO category_rules (pattern, match_type, category, priority, from_correction) \
                 VALUES (?1, 'contains', ?2, ?3, 1)",
                rusqlite::params![pattern, category, CORRECTION_PRIORITY],
            )?;
            let id = conn.last_insert_rowid();
            debug!(rule = id, vendor = pattern, category, "learned rule added");
            Ok(id)
        }
    }
}
