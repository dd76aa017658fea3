//! Duplicate income detection, e.g. a paper check recorded once when written
//! and again when deposited.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{IncomeSource, Transaction};

/// Scoring weights and cut-offs. The defaults are empirical and meant to be
/// recalibrated against real data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateConfig {
    /// Candidates whose amounts differ by more than this are never offered.
    pub amount_tolerance: f64,
    /// Candidates more than this many days apart are never offered.
    pub date_window_days: i64,
    pub exact_amount_points: f64,
    pub near_amount_max_points: f64,
    pub date_max_points: f64,
    /// Date points lost per day of separation.
    pub date_decay_per_day: f64,
    pub check_deposit_bonus: f64,
    pub deposit_deposit_bonus: f64,
    pub min_score: u32,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            amount_tolerance: 50.0,
            date_window_days: 7,
            exact_amount_points: 50.0,
            near_amount_max_points: 40.0,
            date_max_points: 30.0,
            date_decay_per_day: 1.0,
            check_deposit_bonus: 20.0,
            deposit_deposit_bonus: 10.0,
            min_score: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateCandidate {
    pub transaction_id: String,
    /// 0 to 100.
    pub score: u32,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DuplicateDetector {
    config: DuplicateConfig,
}

impl DuplicateDetector {
    pub fn new(config: DuplicateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DuplicateConfig {
        &self.config
    }

    /// Rank probable duplicates of `txn` among `all`, best first. Expenses,
    /// already-linked transactions and weak matches yield nothing.
    pub fn find(&self, txn: &Transaction, all: &[Transaction]) -> Vec<DuplicateCandidate> {
        if !txn.is_income() || txn.linked_transaction_id.is_some() {
            return Vec::new();
        }
        let mut found: Vec<DuplicateCandidate> = all
            .iter()
            .filter(|other| other.id != txn.id && other.is_income())
            .filter(|other| other.linked_transaction_id.is_none())
            .filter_map(|other| self.score(txn, other))
            .filter(|c| c.score >= self.config.min_score)
            .collect();
        found.sort_by(|a, b| b.score.cmp(&a.score));
        if !found.is_empty() {
            debug!(txn = %txn.id, candidates = found.len(), best = found[0].score, "possible duplicates found");
        }
        found
    }

    /// Score one pair. `None` when the pair falls outside the amount
    /// tolerance or the date window.
    pub fn score(&self, a: &Transaction, b: &Transaction) -> Option<DuplicateCandidate> {
        let cfg = &self.config;
        let mut reasons = Vec::new();
        let mut score = 0.0;

        let diff = (a.amount - b.amount).abs();
        if diff > cfg.amount_tolerance {
            return None;
        }
        if diff < 0.005 {
            score += cfg.exact_amount_points;
            reasons.push("exact amount match".to_string());
        } else {
            let closeness = if cfg.amount_tolerance > 0.0 {
                1.0 - diff / cfg.amount_tolerance
            } else {
                0.0
            };
            score += cfg.near_amount_max_points * closeness;
            reasons.push(format!("amounts differ by ${diff:.2}"));
        }

        let days = (a.date - b.date).num_days().abs();
        if days > cfg.date_window_days {
            return None;
        }
        score += (cfg.date_max_points - days as f64 * cfg.date_decay_per_day).max(0.0);
        reasons.push(match days {
            0 => "same day".to_string(),
            1 => "1 day apart".to_string(),
            n => format!("{n} days apart"),
        });

        match (a.income_source, b.income_source) {
            (Some(IncomeSource::Check), Some(IncomeSource::Deposit))
            | (Some(IncomeSource::Deposit), Some(IncomeSource::Check)) => {
                score += cfg.check_deposit_bonus;
                reasons.push("check and deposit pairing".to_string());
            }
            (Some(IncomeSource::Deposit), Some(IncomeSource::Deposit)) => {
                score += cfg.deposit_deposit_bonus;
                reasons.push("both recorded as deposits".to_string());
            }
            _ => {}
        }

        Some(DuplicateCandidate {
            transaction_id: b.id.clone(),
            score: score.round().clamp(0.0, 100.0) as u32,
            reasons,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::TransactionType;

    fn income(id: &str, amount: f64, day: u32, source: IncomeSource) -> Transaction {
        let mut t = Transaction::income(NaiveDate::from_ymd_opt(2024, 3, day).unwrap(), amount, source);
        t.id = id.into();
        t
    }

    #[test]
    fn test_check_and_deposit_scenario() {
        let check = income("check", 500.0, 1, IncomeSource::Check);
        let deposit = income("deposit", 500.0, 4, IncomeSource::Deposit);
        let all = vec![check.clone(), deposit];
        let found = DuplicateDetector::default().find(&check, &all);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].transaction_id, "deposit");
        assert_eq!(found[0].score, 97);
        assert!(found[0].score >= 90);
        assert_eq!(found[0].reasons.len(), 3);
    }

    #[test]
    fn test_expense_has_no_candidates() {
        let mut expense = Transaction::new(
            TransactionType::Expense,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            500.0,
        );
        expense.id = "e".into();
        let all = vec![expense.clone(), income("deposit", 500.0, 1, IncomeSource::Deposit)];
        assert!(DuplicateDetector::default().find(&expense, &all).is_empty());
    }

    #[test]
    fn test_expense_never_offered_as_candidate() {
        let check = income("check", 500.0, 1, IncomeSource::Check);
        let mut expense = income("e", 500.0, 1, IncomeSource::Deposit);
        expense.kind = TransactionType::Expense;
        let found = DuplicateDetector::default().find(&check, &[check.clone(), expense]);
        assert!(found.is_empty());
    }

    #[test]
    fn test_outside_tolerance_or_window_excluded() {
        let check = income("check", 500.0, 1, IncomeSource::Check);
        let far_amount = income("a", 560.0, 1, IncomeSource::Deposit);
        let far_date = income("b", 500.0, 9, IncomeSource::Deposit);
        let all = vec![check.clone(), far_amount, far_date];
        assert!(DuplicateDetector::default().find(&check, &all).is_empty());
    }

    #[test]
    fn test_weak_match_dropped() {
        let a = income("a", 500.0, 1, IncomeSource::Cash);
        let b = income("b", 540.0, 7, IncomeSource::Cash);
        let detector = DuplicateDetector::default();
        let scored = detector.score(&a, &b).unwrap();
        assert_eq!(scored.score, 32);
        assert!(detector.find(&a, &[a.clone(), b]).is_empty());
    }

    #[test]
    fn test_linked_pairs_skipped() {
        let mut check = income("check", 500.0, 1, IncomeSource::Check);
        let mut deposit = income("deposit", 500.0, 1, IncomeSource::Deposit);
        let other = income("other", 500.0, 2, IncomeSource::Deposit);
        check.linked_transaction_id = Some("deposit".into());
        deposit.linked_transaction_id = Some("check".into());

        let detector = DuplicateDetector::default();
        let all = vec![check.clone(), deposit.clone(), other.clone()];
        assert!(detector.find(&check, &all).is_empty());
        let found = detector.find(&other, &all);
        assert!(found.is_empty(), "linked transactions must not be re-offered");
    }

    #[test]
    fn test_ranked_descending() {
        let check = income("check", 500.0, 1, IncomeSource::Check);
        let close = income("close", 500.0, 1, IncomeSource::Deposit);
        let near = income("near", 490.0, 3, IncomeSource::Deposit);
        let same_kind = income("dep2", 500.0, 2, IncomeSource::Check);
        let all = vec![check.clone(), near, same_kind, close];
        let found = DuplicateDetector::default().find(&check, &all);
        let ids: Vec<&str> = found.iter().map(|c| c.transaction_id.as_str()).collect();
        // close: 50 + 30 + 20, near: 32 + 28 + 20, dep2: 50 + 29
        assert_eq!(ids, vec!["close", "near", "dep2"]);
        assert_eq!(found[0].score, 100);
    }

    #[test]
    fn test_deposit_pair_bonus() {
        let a = income("a", 200.0, 10, IncomeSource::Deposit);
        let b = income("b", 200.0, 10, IncomeSource::Deposit);
        let scored = DuplicateDetector::default().score(&a, &b).unwrap();
        assert_eq!(scored.score, 90);
    }

    #[test]
    fn test_custom_window() {
        let detector = DuplicateDetector::new(DuplicateConfig {
            date_window_days: 2,
            ..Default::default()
        });
        let check = income("check", 500.0, 1, IncomeSource::Check);
        let deposit = income("deposit", 500.0, 4, IncomeSource::Deposit);
        assert!(detector.find(&check, &[check.clone(), deposit]).is_empty());
    }
}
