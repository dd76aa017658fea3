//! Linkage state machine over transaction pairs.
//!
//! A transaction moves between `self_reported`, `bank` and `strong` only
//! through an explicit [`LinkageEngine::link`] or [`LinkageEngine::unlink`].
//! A linked pair always has exactly one member flagged as the duplicate, and
//! that member is excluded from totals.

use tracing::{debug, info};

use crate::error::{Result, TillrollError};
use crate::models::{Transaction, VerificationLevel};

pub struct LinkageEngine<'a> {
    txns: &'a mut [Transaction],
}

fn position(txns: &[Transaction], id: &str) -> Result<usize> {
    txns.iter()
        .position(|t| t.id == id)
        .ok_or_else(|| TillrollError::UnknownTransaction(id.to_string()))
}

fn pair_mut(txns: &mut [Transaction], i: usize, j: usize) -> (&mut Transaction, &mut Transaction) {
    if i < j {
        let (left, right) = txns.split_at_mut(j);
        (&mut left[i], &mut right[0])
    } else {
        let (left, right) = txns.split_at_mut(i);
        (&mut right[0], &mut left[j])
    }
}

fn violation(msg: String) -> TillrollError {
    TillrollError::InvariantViolation(msg)
}

impl<'a> LinkageEngine<'a> {
    pub fn new(txns: &'a mut [Transaction]) -> Self {
        Self { txns }
    }

    /// Link `a` and `b`, flagging `duplicate_id` (one of the two) as the
    /// duplicate. Both become `strong`. A transaction already linked
    /// elsewhere must be unlinked first.
    pub fn link(&mut self, a: &str, b: &str, duplicate_id: &str) -> Result<()> {
        if a == b {
            return Err(violation(format!("cannot link transaction {a} to itself")));
        }
        if duplicate_id != a && duplicate_id != b {
            return Err(violation(format!(
                "duplicate {duplicate_id} is not part of the pair {a} / {b}"
            )));
        }
        let i = position(self.txns, a)?;
        let j = position(self.txns, b)?;
        let (ta, tb) = pair_mut(self.txns, i, j);

        let linked_together = ta.linked_transaction_id.as_deref() == Some(b)
            && tb.linked_transaction_id.as_deref() == Some(a);
        if linked_together {
            let current = if ta.is_duplicate_of_linked { a } else { b };
            if current == duplicate_id {
                debug!(a, b, "pair already linked");
                return Ok(());
            }
            return Err(violation(format!(
                "{a} and {b} are already linked with {current} as the duplicate; unlink first"
            )));
        }
        for t in [&*ta, &*tb] {
            if let Some(other) = &t.linked_transaction_id {
                return Err(violation(format!(
                    "transaction {} is already linked to {other}; unlink first",
                    t.id
                )));
            }
        }

        ta.linked_transaction_id = Some(b.to_string());
        tb.linked_transaction_id = Some(a.to_string());
        ta.is_duplicate_of_linked = false;
        tb.is_duplicate_of_linked = false;
        if duplicate_id == a {
            ta.mark_duplicate_of_linked()?;
        } else {
            tb.mark_duplicate_of_linked()?;
        }
        ta.verification_level = VerificationLevel::Strong;
        tb.verification_level = VerificationLevel::Strong;
        info!(a, b, duplicate = duplicate_id, "transactions linked");
        Ok(())
    }

    /// Break the link between `a` and `b`. Each side's verification level is
    /// recomputed from its own state.
    pub fn unlink(&mut self, a: &str, b: &str) -> Result<()> {
        let i = position(self.txns, a)?;
        let j = position(self.txns, b)?;
        if i == j {
            return Err(violation(format!("cannot unlink transaction {a} from itself")));
        }
        let (ta, tb) = pair_mut(self.txns, i, j);
        if ta.linked_transaction_id.as_deref() != Some(b) || tb.linked_transaction_id.as_deref() != Some(a) {
            return Err(violation(format!("{a} and {b} are not linked to each other")));
        }
        for t in [ta, tb] {
            t.linked_transaction_id = None;
            t.is_duplicate_of_linked = false;
            t.verification_level = t.derived_verification_level();
        }
        info!(a, b, "transactions unlinked");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate(self.txns)
    }
}

/// Check every linkage invariant over a transaction set.
pub fn validate(txns: &[Transaction]) -> Result<()> {
    for t in txns {
        let Some(other_id) = &t.linked_transaction_id else {
            if t.is_duplicate_of_linked {
                return Err(violation(format!(
                    "transaction {} is flagged duplicate without a linked transaction",
                    t.id
                )));
            }
            if t.verification_level == VerificationLevel::Strong {
                return Err(violation(format!("transaction {} is strong but unlinked", t.id)));
            }
            continue;
        };
        let other = txns
            .iter()
            .find(|o| &o.id == other_id)
            .ok_or_else(|| violation(format!("transaction {} links to missing {other_id}", t.id)))?;
        if other.linked_transaction_id.as_deref() != Some(t.id.as_str()) {
            return Err(violation(format!("link {} -> {other_id} is not symmetric", t.id)));
        }
        if t.is_duplicate_of_linked == other.is_duplicate_of_linked {
            return Err(violation(format!(
                "pair {} / {other_id} must have exactly one duplicate",
                t.id
            )));
        }
        if t.verification_level != VerificationLevel::Strong {
            return Err(violation(format!("linked transaction {} is not strong", t.id)));
        }
    }
    Ok(())
}
