//! Cross-document linking.
//!
//! Flags re-scanned duplicates, marks manifests and invoices as supplemental,
//! and attaches payment confirmations to the itemized receipt they pay for.
//! Payment linking needs a shared explicit identifier; a matching vendor
//! name alone never links two documents.

use std::cmp::Reverse;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::error::{Result, TillrollError};
use crate::models::{DocumentType, Receipt};

const MIN_IDENTIFIER_LEN: usize = 3;
const MAX_NAME_LENGTH_DIFF: usize = 3;
const MIN_CONTAINED_NAME_LEN: usize = 4;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static regex must compile")
}

static EXTENSION: Lazy<Regex> = Lazy::new(|| re(r"\.[a-z0-9]{1,5}$"));
static NAME_PREFIX: Lazy<Regex> = Lazy::new(|| re(r"^(?:img|image|scan|photo|pxl|dsc)[-_ ]*"));
static COPY_SUFFIX: Lazy<Regex> = Lazy::new(|| re(r"(?:[-_ ]*copy|[-_ ]*\(\d+\))$"));
static COUNTER_SUFFIX: Lazy<Regex> = Lazy::new(|| re(r"[-_ ]\d$"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateReason {
    Filename,
    ImageHash,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateMark {
    pub receipt_id: String,
    pub original_id: String,
    pub reason: DuplicateReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentLink {
    pub source_id: String,
    pub primary_id: String,
    /// Informational only, 0 to 100.
    pub confidence: u32,
}

/// What one linking pass changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkReport {
    pub duplicates: Vec<DuplicateMark>,
    pub supplemental: Vec<String>,
    pub links: Vec<DocumentLink>,
}

impl LinkReport {
    pub fn is_empty(&self) -> bool {
        self.duplicates.is_empty() && self.supplemental.is_empty() && self.links.is_empty()
    }
}

/// Normalize a photo filename for duplicate comparison: lowercase, no
/// extension, no camera prefix, no "copy"/"(n)"/"-n" suffixes.
pub fn normalize_filename(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let stem = EXTENSION.replace(&lower, "");
    let mut s = NAME_PREFIX.replace(&stem, "").into_owned();
    loop {
        let next = COPY_SUFFIX.replace(&s, "").into_owned();
        if next == s {
            break;
        }
        s = next;
    }
    let s = COUNTER_SUFFIX.replace(&s, "");
    s.trim_matches(|c: char| c == '-' || c == '_' || c == ' ').to_string()
}

fn names_match(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    short.len() >= MIN_CONTAINED_NAME_LEN
        && long.len() - short.len() <= MAX_NAME_LENGTH_DIFF
        && long.contains(short)
}

fn normalize_identifier(id: &str) -> String {
    id.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn normalized_identifiers(r: &Receipt) -> Vec<String> {
    r.identifiers()
        .into_iter()
        .map(normalize_identifier)
        .filter(|id| id.len() >= MIN_IDENTIFIER_LEN)
        .collect()
}

/// True when the two receipts carry the same explicit identifier, in any
/// of the identifier fields.
pub fn share_identifier(a: &Receipt, b: &Receipt) -> bool {
    let theirs = normalized_identifiers(b);
    normalized_identifiers(a).iter().any(|id| theirs.contains(id))
}

fn normalize_vendor(v: &str) -> String {
    v.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Vendor similarity in 0.0..=1.0: 1.0 for equal names, the length ratio
/// when one name contains the other, else 0.0.
fn vendor_similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (normalize_vendor(a), normalize_vendor(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    if long.contains(short.as_str()) {
        short.len() as f64 / long.len() as f64
    } else {
        0.0
    }
}

fn vendors_compatible(a: &Receipt, b: &Receipt) -> bool {
    match (a.vendor.as_deref(), b.vendor.as_deref()) {
        (Some(va), Some(vb)) => vendor_similarity(va, vb) > 0.0,
        _ => true,
    }
}

fn days_apart(a: &Receipt, b: &Receipt) -> i64 {
    (a.date - b.date).num_days().abs()
}

/// Confidence that two documents belong together. Informational: it never
/// gates a link.
pub fn link_confidence(a: &Receipt, b: &Receipt) -> u32 {
    let mut score = 0.0;
    if share_identifier(a, b) {
        score += 50.0;
    }
    if let (Some(va), Some(vb)) = (a.vendor.as_deref(), b.vendor.as_deref()) {
        score += 25.0 * vendor_similarity(va, vb);
    }
    let days = days_apart(a, b) as f64;
    score += if days <= 7.0 {
        15.0
    } else {
        (15.0 * (30.0 - days) / 23.0).max(0.0)
    };
    if let (Some(x), Some(y)) = (a.amount, b.amount) {
        let larger = x.abs().max(y.abs());
        if larger > 0.0 {
            let rel = (x - y).abs() / larger;
            if rel <= 0.05 {
                score += 10.0 * (1.0 - rel / 0.05);
            }
        } else {
            score += 10.0;
        }
    }
    score.round().clamp(0.0, 100.0) as u32
}

fn add_reference(refs: &mut Vec<String>, id: &str) {
    if !refs.iter().any(|r| r == id) {
        refs.push(id.to_string());
    }
}

fn connect(receipts: &mut [Receipt], source: usize, primary: usize) -> DocumentLink {
    let confidence = link_confidence(&receipts[source], &receipts[primary]);
    let primary_id = receipts[primary].id.clone();
    let source_id = receipts[source].id.clone();

    let src = &mut receipts[source];
    src.is_supplemental_doc = true;
    src.primary_document_id = Some(primary_id.clone());
    add_reference(&mut src.linked_document_ids, &primary_id);
    add_reference(&mut receipts[primary].linked_document_ids, &source_id);

    DocumentLink {
        source_id,
        primary_id,
        confidence,
    }
}

/// Point an already attached document at a new primary. Existing
/// cross-references are kept.
fn reparent(receipts: &mut [Receipt], dependent: usize, primary: usize) -> DocumentLink {
    let confidence = link_confidence(&receipts[dependent], &receipts[primary]);
    let primary_id = receipts[primary].id.clone();
    let dependent_id = receipts[dependent].id.clone();

    let dep = &mut receipts[dependent];
    dep.primary_document_id = Some(primary_id.clone());
    add_reference(&mut dep.linked_document_ids, &primary_id);
    add_reference(&mut receipts[primary].linked_document_ids, &dependent_id);

    DocumentLink {
        source_id: dependent_id,
        primary_id,
        confidence,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentLinker;

impl DocumentLinker {
    pub fn new() -> Self {
        Self
    }

    /// Run every linking pass over `receipts`, in input order. Running it
    /// again on its own output changes nothing.
    pub fn link(&self, receipts: &mut [Receipt]) -> LinkReport {
        let mut report = LinkReport::default();
        self.mark_duplicates(receipts, &mut report);
        self.mark_supplemental(receipts, &mut report);
        self.link_payments(receipts, &mut report);
        info!(
            duplicates = report.duplicates.len(),
            supplemental = report.supplemental.len(),
            links = report.links.len(),
            "document linking finished"
        );
        report
    }

    fn mark_duplicates(&self, receipts: &mut [Receipt], report: &mut LinkReport) {
        for j in 1..receipts.len() {
            if receipts[j].is_duplicate {
                continue;
            }
            let found = (0..j).find_map(|i| {
                let (a, b) = (&receipts[i], &receipts[j]);
                if a.is_duplicate {
                    return None;
                }
                let same_photo = a.filename.is_some() && a.filename == b.filename;
                if same_photo && a.region_index != b.region_index {
                    return None;
                }
                if a.image_hash.is_some() && a.image_hash == b.image_hash {
                    return Some((i, DuplicateReason::ImageHash));
                }
                match (a.filename.as_deref(), b.filename.as_deref()) {
                    (Some(fa), Some(fb)) if names_match(&normalize_filename(fa), &normalize_filename(fb)) => {
                        Some((i, DuplicateReason::Filename))
                    }
                    _ => None,
                }
            });
            if let Some((i, reason)) = found {
                let original_id = receipts[i].id.clone();
                let dup = &mut receipts[j];
                dup.is_duplicate = true;
                dup.duplicate_of_id = Some(original_id.clone());
                debug!(receipt = %dup.id, original = %original_id, ?reason, "duplicate receipt");
                report.duplicates.push(DuplicateMark {
                    receipt_id: dup.id.clone(),
                    original_id,
                    reason,
                });
            }
        }
    }

    fn mark_supplemental(&self, receipts: &mut [Receipt], report: &mut LinkReport) {
        for r in receipts.iter_mut() {
            let non_expense = matches!(r.document_type, DocumentType::Manifest | DocumentType::Invoice);
            if non_expense && !r.is_supplemental_doc {
                r.is_supplemental_doc = true;
                debug!(receipt = %r.id, doc_type = %r.document_type, "marked supplemental");
                report.supplemental.push(r.id.clone());
            }
        }
    }

    /// An itemized source only attaches to a more itemized document.
    fn is_candidate(source: &Receipt, candidate: &Receipt) -> bool {
        candidate.id != source.id
            && !matches!(
                candidate.document_type,
                DocumentType::Manifest | DocumentType::BankDepositReceipt
            )
            && !candidate.is_supplemental_doc
            && !candidate.is_duplicate
            && (source.line_items.is_empty() || candidate.line_items.len() > source.line_items.len())
            && share_identifier(source, candidate)
            && vendors_compatible(source, candidate)
    }

    fn link_payments(&self, receipts: &mut [Receipt], report: &mut LinkReport) {
        // Less itemized documents look for a primary first, so the
        // itemized receipt ends up as the primary.
        let mut sources: Vec<usize> = (0..receipts.len())
            .filter(|&i| receipts[i].document_type == DocumentType::PaymentReceipt)
            .collect();
        sources.sort_by_key(|&i| receipts[i].line_items.len());

        for s in sources {
            let source = &receipts[s];
            if source.is_supplemental_doc || source.is_duplicate || source.primary_document_id.is_some() {
                continue;
            }
            if normalized_identifiers(source).is_empty() {
                debug!(receipt = %source.id, "no explicit identifier, not linking");
                continue;
            }
            let mut candidates: Vec<usize> = (0..receipts.len())
                .filter(|&c| Self::is_candidate(source, &receipts[c]))
                .collect();
            if candidates.iter().any(|&c| !receipts[c].line_items.is_empty()) {
                candidates.retain(|&c| !receipts[c].line_items.is_empty());
            }
            let best = candidates
                .into_iter()
                .min_by_key(|&c| (days_apart(source, &receipts[c]), Reverse(receipts[c].line_items.len()), c));

            let dependents: Vec<usize> = (0..receipts.len())
                .filter(|&i| receipts[i].primary_document_id.as_deref() == Some(source.id.as_str()))
                .collect();
            if !dependents.is_empty() {
                // An unitemized primary hands itself and its dependents
                // over to an itemized receipt; any other primary stays put.
                let itemized = best.filter(|&p| source.line_items.is_empty() && !receipts[p].line_items.is_empty());
                if let Some(p) = itemized {
                    for d in dependents {
                        let link = reparent(receipts, d, p);
                        info!(source = %link.source_id, primary = %link.primary_id, "supporting document moved to itemized receipt");
                        report.links.push(link);
                    }
                    let link = connect(receipts, s, p);
                    info!(source = %link.source_id, primary = %link.primary_id, confidence = link.confidence, "payment linked");
                    report.links.push(link);
                }
                continue;
            }

            match best {
                Some(p) => {
                    let link = connect(receipts, s, p);
                    info!(source = %link.source_id, primary = %link.primary_id, confidence = link.confidence, "payment linked");
                    report.links.push(link);
                }
                None => debug!(receipt = %receipts[s].id, "no match found"),
            }
        }
    }

    /// Attach `source_id` to `primary_id` by hand, for documents the
    /// automatic pass could not match.
    pub fn link_manually(&self, receipts: &mut [Receipt], source_id: &str, primary_id: &str) -> Result<DocumentLink> {
        if source_id == primary_id {
            return Err(TillrollError::Other("cannot link a receipt to itself".into()));
        }
        let find = |id: &str| {
            receipts
                .iter()
                .position(|r| r.id == id)
                .ok_or_else(|| TillrollError::UnknownReceipt(id.to_string()))
        };
        let s = find(source_id)?;
        let p = find(primary_id)?;
        if let Some(existing) = &receipts[s].primary_document_id {
            if existing == primary_id {
                return Ok(DocumentLink {
                    source_id: source_id.to_string(),
                    primary_id: primary_id.to_string(),
                    confidence: link_confidence(&receipts[s], &receipts[p]),
                });
            }
            return Err(TillrollError::Other(format!(
                "receipt {source_id} is already attached to {existing}"
            )));
        }
        if receipts[p].is_supplemental_doc {
            return Err(TillrollError::Other(format!(
                "receipt {primary_id} is supplemental and cannot be a primary document"
            )));
        }
        Ok(connect(receipts, s, p))
    }
}
