use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TillrollError};

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    PaymentReceipt,
    BankDepositReceipt,
    BankStatement,
    Manifest,
    Invoice,
    #[default]
    Unknown,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentReceipt => "payment_receipt",
            Self::BankDepositReceipt => "bank_deposit_receipt",
            Self::BankStatement => "bank_statement",
            Self::Manifest => "manifest",
            Self::Invoice => "invoice",
            Self::Unknown => "unknown",
        }
    }
}

impl FromStr for DocumentType {
    type Err = TillrollError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "payment_receipt" => Ok(Self::PaymentReceipt),
            "bank_deposit_receipt" => Ok(Self::BankDepositReceipt),
            "bank_statement" => Ok(Self::BankStatement),
            "manifest" => Ok(Self::Manifest),
            "invoice" => Ok(Self::Invoice),
            "unknown" => Ok(Self::Unknown),
            other => Err(TillrollError::Other(format!("Unknown document type: {other}"))),
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }
}

impl FromStr for TransactionType {
    type Err = TillrollError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            other => Err(TillrollError::Other(format!("Unknown transaction type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeSource {
    Check,
    Deposit,
    Cash,
    Transfer,
    Card,
    Other,
}

impl IncomeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::Deposit => "deposit",
            Self::Cash => "cash",
            Self::Transfer => "transfer",
            Self::Card => "card",
            Self::Other => "other",
        }
    }
}

impl FromStr for IncomeSource {
    type Err = TillrollError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "check" => Ok(Self::Check),
            "deposit" => Ok(Self::Deposit),
            "cash" => Ok(Self::Cash),
            "transfer" => Ok(Self::Transfer),
            "card" => Ok(Self::Card),
            "other" => Ok(Self::Other),
            other => Err(TillrollError::Other(format!("Unknown income source: {other}"))),
        }
    }
}

/// Trust tier of a ledger entry. Ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationLevel {
    #[default]
    SelfReported,
    Bank,
    Strong,
}

impl VerificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelfReported => "self_reported",
            Self::Bank => "bank",
            Self::Strong => "strong",
        }
    }
}

impl FromStr for VerificationLevel {
    type Err = TillrollError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "self_reported" => Ok(Self::SelfReported),
            "bank" => Ok(Self::Bank),
            "strong" => Ok(Self::Strong),
            other => Err(TillrollError::Other(format!("Unknown verification level: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Receipt
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
}

/// Best-effort output of the field extractor for one receipt region.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub vendor: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub subtotal: Option<f64>,
    pub tax: Option<f64>,
    pub tip: Option<f64>,
    pub amount: Option<f64>,
    pub line_items: Vec<LineItem>,
    pub payment_method: Option<String>,
    pub currency: Option<String>,
    pub store_id: Option<String>,
    pub ocr_transaction_id: Option<String>,
    pub transaction_number: Option<String>,
    pub order_number: Option<String>,
    pub invoice_number: Option<String>,
    pub account_number: Option<String>,
}

/// One scanned document. Never deleted by the core: duplicates and
/// supplemental documents are marked, not removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: String,
    pub filename: Option<String>,
    #[serde(default)]
    pub region_index: usize,
    pub image_hash: Option<String>,
    pub document_type: DocumentType,

    pub vendor: Option<String>,
    pub date: NaiveDate,
    /// True when no date could be read and `date` is the ingestion date.
    #[serde(default)]
    pub date_is_fallback: bool,
    pub time: Option<NaiveTime>,
    pub subtotal: Option<f64>,
    pub tax: Option<f64>,
    pub tip: Option<f64>,
    pub amount: Option<f64>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    pub payment_method: Option<String>,
    pub currency: Option<String>,
    pub category: Option<String>,

    pub store_id: Option<String>,
    pub ocr_transaction_id: Option<String>,
    pub transaction_number: Option<String>,
    pub order_number: Option<String>,
    pub invoice_number: Option<String>,
    pub account_number: Option<String>,

    #[serde(default)]
    pub linked_document_ids: Vec<String>,
    pub primary_document_id: Option<String>,
    #[serde(default)]
    pub is_supplemental_doc: bool,

    #[serde(default)]
    pub is_duplicate: bool,
    pub duplicate_of_id: Option<String>,

    #[serde(default)]
    pub user_validated: bool,
    #[serde(default)]
    pub ocr_failed: bool,
    #[serde(default)]
    pub raw_text: String,
}

impl Receipt {
    /// Build a receipt from extracted fields. A missing date falls back to
    /// `ingested_on` and is flagged as such.
    pub fn from_fields(
        fields: ExtractedFields,
        document_type: DocumentType,
        raw_text: &str,
        ingested_on: NaiveDate,
    ) -> Self {
        Self {
            id: new_id(),
            filename: None,
            region_index: 0,
            image_hash: None,
            document_type,
            vendor: fields.vendor,
            date: fields.date.unwrap_or(ingested_on),
            date_is_fallback: fields.date.is_none(),
            time: fields.time,
            subtotal: fields.subtotal,
            tax: fields.tax,
            tip: fields.tip,
            amount: fields.amount,
            line_items: fields.line_items,
            payment_method: fields.payment_method,
            currency: fields.currency,
            category: None,
            store_id: fields.store_id,
            ocr_transaction_id: fields.ocr_transaction_id,
            transaction_number: fields.transaction_number,
            order_number: fields.order_number,
            invoice_number: fields.invoice_number,
            account_number: fields.account_number,
            linked_document_ids: Vec::new(),
            primary_document_id: None,
            is_supplemental_doc: false,
            is_duplicate: false,
            duplicate_of_id: None,
            user_validated: false,
            ocr_failed: false,
            raw_text: raw_text.to_string(),
        }
    }

    /// Explicit identifiers usable for document linking, in a fixed order.
    pub fn identifiers(&self) -> Vec<&str> {
        [
            &self.transaction_number,
            &self.order_number,
            &self.invoice_number,
            &self.ocr_transaction_id,
        ]
        .into_iter()
        .filter_map(|v| v.as_deref())
        .filter(|v| !v.trim().is_empty())
        .collect()
    }

    /// Whether this receipt may be counted as a standalone expense.
    pub fn counts_as_expense(&self) -> bool {
        !self.is_supplemental_doc && !self.is_duplicate
    }

    pub fn needs_manual_review(&self) -> bool {
        !self.user_validated && (self.ocr_failed || self.amount.is_none())
    }

    /// Apply the user's field corrections and mark the receipt as checked
    /// by hand. A corrected date is no longer a fallback.
    pub fn validate(&mut self, edit: &ReceiptEdit) {
        if let Some(vendor) = &edit.vendor {
            self.vendor = Some(vendor.clone());
        }
        if let Some(date) = edit.date {
            self.date = date;
            self.date_is_fallback = false;
        }
        if let Some(amount) = edit.amount {
            self.amount = Some(amount);
        }
        if let Some(category) = &edit.category {
            self.category = Some(category.clone());
        }
        self.user_validated = true;
    }
}

/// Field corrections made while validating a receipt. `None` fields are
/// left untouched.
#[derive(Debug, Clone, Default)]
pub struct ReceiptEdit {
    pub vendor: Option<String>,
    pub date: Option<NaiveDate>,
    pub amount: Option<f64>,
    pub category: Option<String>,
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub date: NaiveDate,
    pub amount: f64,
    pub category: Option<String>,
    pub vendor: Option<String>,
    pub description: Option<String>,
    pub income_source: Option<IncomeSource>,
    pub receipt_id: Option<String>,

    pub linked_transaction_id: Option<String>,
    #[serde(default)]
    pub verification_level: VerificationLevel,
    #[serde(default)]
    pub is_duplicate_of_linked: bool,

    pub original_amount: Option<f64>,
    pub original_date: Option<NaiveDate>,
    pub original_vendor: Option<String>,
    pub original_category: Option<String>,
    #[serde(default)]
    pub was_manually_edited: bool,
}

/// A user correction. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct TransactionEdit {
    pub amount: Option<f64>,
    pub date: Option<NaiveDate>,
    pub vendor: Option<String>,
    pub category: Option<String>,
}

impl Transaction {
    pub fn new(kind: TransactionType, date: NaiveDate, amount: f64) -> Self {
        Self {
            id: new_id(),
            kind,
            date,
            amount,
            category: None,
            vendor: None,
            description: None,
            income_source: None,
            receipt_id: None,
            linked_transaction_id: None,
            verification_level: VerificationLevel::SelfReported,
            is_duplicate_of_linked: false,
            original_amount: None,
            original_date: None,
            original_vendor: None,
            original_category: None,
            was_manually_edited: false,
        }
    }

    pub fn income(date: NaiveDate, amount: f64, source: IncomeSource) -> Self {
        let mut txn = Self::new(TransactionType::Income, date, amount);
        txn.income_source = Some(source);
        txn
    }

    /// Convert a receipt into an expense. Supplemental and duplicate
    /// receipts, and receipts without an amount, do not convert.
    pub fn from_receipt(receipt: &Receipt) -> Option<Self> {
        if !receipt.counts_as_expense() {
            return None;
        }
        let amount = receipt.amount?;
        let mut txn = Self::new(TransactionType::Expense, receipt.date, amount);
        txn.vendor = receipt.vendor.clone();
        txn.category = receipt.category.clone();
        txn.receipt_id = Some(receipt.id.clone());
        txn.verification_level = VerificationLevel::Bank;
        Some(txn)
    }

    pub fn is_income(&self) -> bool {
        self.kind == TransactionType::Income
    }

    /// Level this transaction is entitled to from its own state.
    pub fn derived_verification_level(&self) -> VerificationLevel {
        if self.linked_transaction_id.is_some() {
            VerificationLevel::Strong
        } else if self.receipt_id.is_some() {
            VerificationLevel::Bank
        } else {
            VerificationLevel::SelfReported
        }
    }

    /// Flag as the duplicate half of a linked pair.
    pub fn mark_duplicate_of_linked(&mut self) -> Result<()> {
        if self.linked_transaction_id.is_none() {
            return Err(TillrollError::InvariantViolation(format!(
                "transaction {} cannot be marked duplicate without a linked transaction",
                self.id
            )));
        }
        self.is_duplicate_of_linked = true;
        Ok(())
    }

    /// Apply a user correction, remembering the pre-edit values the first
    /// time each field changes.
    pub fn apply_edit(&mut self, edit: &TransactionEdit) {
        let mut changed = false;
        if let Some(amount) = edit.amount {
            if (amount - self.amount).abs() >= 0.005 {
                self.original_amount.get_or_insert(self.amount);
                self.amount = amount;
                changed = true;
            }
        }
        if let Some(date) = edit.date {
            if date != self.date {
                self.original_date.get_or_insert(self.date);
                self.date = date;
                changed = true;
            }
        }
        if let Some(vendor) = &edit.vendor {
            if self.vendor.as_deref() != Some(vendor.as_str()) {
                if self.original_vendor.is_none() {
                    self.original_vendor = self.vendor.clone();
                }
                self.vendor = Some(vendor.clone());
                changed = true;
            }
        }
        if let Some(category) = &edit.category {
            if self.category.as_deref() != Some(category.as_str()) {
                if self.original_category.is_none() {
                    self.original_category = self.category.clone();
                }
                self.category = Some(category.clone());
                changed = true;
            }
        }
        if changed {
            self.was_manually_edited = true;
        }
    }
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_mark_duplicate_requires_link() {
        let mut txn = Transaction::income(date("2024-03-01"), 500.0, IncomeSource::Check);
        assert!(matches!(
            txn.mark_duplicate_of_linked(),
            Err(TillrollError::InvariantViolation(_))
        ));
        assert!(!txn.is_duplicate_of_linked);

        txn.linked_transaction_id = Some("other".into());
        txn.mark_duplicate_of_linked().unwrap();
        assert!(txn.is_duplicate_of_linked);
    }

    #[test]
    fn test_apply_edit_keeps_first_original() {
        let mut txn = Transaction::new(TransactionType::Expense, date("2024-03-01"), 20.0);
        txn.vendor = Some("WALMRT".into());
        txn.apply_edit(&TransactionEdit {
            amount: Some(21.0),
            vendor: Some("Walmart".into()),
            ..Default::default()
        });
        txn.apply_edit(&TransactionEdit {
            amount: Some(22.0),
            ..Default::default()
        });
        assert!(txn.was_manually_edited);
        assert_eq!(txn.amount, 22.0);
        assert_eq!(txn.original_amount, Some(20.0));
        assert_eq!(txn.original_vendor.as_deref(), Some("WALMRT"));
        assert_eq!(txn.original_date, None);
    }

    #[test]
    fn test_apply_edit_noop_is_not_an_edit() {
        let mut txn = Transaction::new(TransactionType::Expense, date("2024-03-01"), 20.0);
        txn.apply_edit(&TransactionEdit {
            amount: Some(20.0),
            date: Some(date("2024-03-01")),
            ..Default::default()
        });
        assert!(!txn.was_manually_edited);
        assert_eq!(txn.original_amount, None);
    }

    #[test]
    fn test_from_receipt_skips_supplemental() {
        let fields = ExtractedFields {
            amount: Some(12.5),
            vendor: Some("Target".into()),
            ..Default::default()
        };
        let mut receipt =
            Receipt::from_fields(fields, DocumentType::PaymentReceipt, "", date("2024-05-05"));
        assert!(receipt.date_is_fallback);

        let txn = Transaction::from_receipt(&receipt).unwrap();
        assert_eq!(txn.kind, TransactionType::Expense);
        assert_eq!(txn.verification_level, VerificationLevel::Bank);
        assert_eq!(txn.receipt_id.as_deref(), Some(receipt.id.as_str()));

        receipt.is_supplemental_doc = true;
        assert!(Transaction::from_receipt(&receipt).is_none());
    }

    #[test]
    fn test_validate_clears_review() {
        let mut receipt =
            Receipt::from_fields(ExtractedFields::default(), DocumentType::Unknown, "", date("2024-05-05"));
        receipt.ocr_failed = true;
        assert!(receipt.needs_manual_review());

        receipt.validate(&ReceiptEdit {
            vendor: Some("Corner Deli".into()),
            date: Some(date("2024-05-02")),
            amount: Some(8.75),
            ..Default::default()
        });
        assert!(receipt.user_validated);
        assert!(!receipt.needs_manual_review());
        assert!(!receipt.date_is_fallback);
        assert_eq!(receipt.date, date("2024-05-02"));
        assert_eq!(receipt.amount, Some(8.75));
        assert!(receipt.category.is_none());
    }

    #[test]
    fn test_enum_string_roundtrip() {
        for kind in [
            DocumentType::PaymentReceipt,
            DocumentType::BankDepositReceipt,
            DocumentType::BankStatement,
            DocumentType::Manifest,
            DocumentType::Invoice,
            DocumentType::Unknown,
        ] {
            assert_eq!(kind.as_str().parse::<DocumentType>().unwrap(), kind);
        }
        assert!("receipt".parse::<DocumentType>().is_err());
        assert_eq!(
            serde_json::to_string(&VerificationLevel::SelfReported).unwrap(),
            "\"self_reported\""
        );
    }
}
