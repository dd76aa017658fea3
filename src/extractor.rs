//! Heuristic field extraction from the recognized text of one receipt.
//!
//! Everything here is a pure function of the input text. Fields that cannot
//! be read are left as `None`; nothing is invented.

use chrono::{NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{DocumentType, ExtractedFields, LineItem};

/// Upper bound (exclusive) for a labeled total to be believed.
const MAX_PLAUSIBLE_TOTAL: f64 = 100_000.0;

// (needle, display name), matched case-insensitively as substrings.
const KNOWN_VENDORS: &[(&str, &str)] = &[
    ("walmart", "Walmart"),
    ("wal-mart", "Walmart"),
    ("costco", "Costco"),
    ("home depot", "Home Depot"),
    ("lowe's", "Lowe's"),
    ("lowes", "Lowe's"),
    ("whole foods", "Whole Foods"),
    ("trader joe", "Trader Joe's"),
    ("kroger", "Kroger"),
    ("safeway", "Safeway"),
    ("publix", "Publix"),
    ("walgreens", "Walgreens"),
    ("cvs", "CVS"),
    ("starbucks", "Starbucks"),
    ("mcdonald", "McDonald's"),
    ("best buy", "Best Buy"),
    ("staples", "Staples"),
    ("office depot", "Office Depot"),
    ("amazon", "Amazon"),
    ("target", "Target"),
    ("7-eleven", "7-Eleven"),
    ("shell", "Shell"),
    ("chevron", "Chevron"),
    ("exxon", "Exxon"),
    ("aldi", "Aldi"),
    ("ikea", "IKEA"),
];

// Ordered: first keyword present in the text wins.
const PAYMENT_METHODS: &[(&str, &str)] = &[
    ("visa", "Visa"),
    ("mastercard", "Mastercard"),
    ("master card", "Mastercard"),
    ("amex", "Amex"),
    ("american express", "Amex"),
    ("discover", "Discover"),
    ("debit", "Debit"),
    ("credit", "Credit"),
    ("cash", "Cash"),
    ("apple pay", "Apple Pay"),
    ("google pay", "Google Pay"),
];

const MONTHS: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static regex must compile")
}

const AMOUNT: &str = r"(\d[\d,]*\.\d{2})";

// Labeled totals, tried in order. Within one pattern the last match wins,
// since a later total line supersedes earlier ones on a printed receipt.
static TOTAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        re(&format!(
            r"(?im)\b(?:grand\s+)?total\b(?:\s+(?:due|amount|paid|sale))?\s*[:\-]?\s*(?:USD\s*)?[$€£]?\s*{AMOUNT}"
        )),
        re(&format!(
            r"(?im)\b(?:amount(?:\s+(?:due|paid|charged))?|balance\s+due)\s*[:\-]?\s*(?:USD\s*)?[$€£]?\s*{AMOUNT}"
        )),
    ]
});
static ANY_AMOUNT: Lazy<Regex> = Lazy::new(|| re(&format!(r"[$€£]?\s*{AMOUNT}")));
static SUBTOTAL: Lazy<Regex> =
    Lazy::new(|| re(&format!(r"(?im)\bsub\s*-?\s*total\s*[:\-]?\s*[$€£]?\s*{AMOUNT}")));
static TAX: Lazy<Regex> = Lazy::new(|| {
    re(&format!(
        r"(?im)^\s*(?:sales\s+)?tax\b\s*(?:\d+(?:\.\d+)?\s*%\s*)?[:\-]?\s*[$€£]?\s*{AMOUNT}"
    ))
});
static TIP: Lazy<Regex> =
    Lazy::new(|| re(&format!(r"(?im)^\s*(?:tip|gratuity)\s*[:\-]?\s*[$€£]?\s*{AMOUNT}")));

static SKU_ITEM: Lazy<Regex> =
    Lazy::new(|| re(&format!(r"^\s*(\d{{10,}})\s+(.+?)\s+[$€£]?{AMOUNT}\s*[A-Z]?\s*$")));
static PLAIN_ITEM: Lazy<Regex> =
    Lazy::new(|| re(&format!(r"^\s*([A-Za-z][^$€£]*?)\s+[$€£]?{AMOUNT}\s*[A-Z]?\s*$")));
static SUMMARY_LINE: Lazy<Regex> = Lazy::new(|| {
    re(r"(?i)\b(?:sub\s*-?\s*total|total|tax|change|cash|credit|debit|tip|gratuity|balance|tender)\b")
});

static STORE_ID: Lazy<Regex> = Lazy::new(|| re(r"(?i)\b(?:store|str)\s*#\s*:?\s*([A-Z0-9-]+)"));
static OCR_TRANSACTION_ID: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)\b(?:trans(?:action)?|receipt)\s*#\s*:?\s*([A-Z0-9-]+)"));
static TRANSACTION_NUMBER: Lazy<Regex> = Lazy::new(|| {
    re(r"(?i)\b(?:transaction|txn|confirmation)\s*(?:id|no\.?|number)\s*[:#]?\s*([A-Z0-9-]{4,})")
});
static ORDER_NUMBER: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)\border\s*(?:#|no\.?|number|id)\s*[:#]?\s*([A-Z0-9-]{3,})"));
static INVOICE_NUMBER: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)\binvoice\s*(?:#|no\.?|number|id)\s*[:#]?\s*([A-Z0-9-]{3,})"));
static ACCOUNT_NUMBER: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)\b(?:account|acct)\s*(?:#|no\.?|number)?\s*:?\s*([*xX\d][*xX\d-]{3,})"));

static DATE_MDY: Lazy<Regex> = Lazy::new(|| re(r"\b(\d{1,2})[/\-.](\d{1,2})[/\-.](\d{2,4})\b"));
static DATE_YMD: Lazy<Regex> = Lazy::new(|| re(r"\b(\d{4})[/\-.](\d{1,2})[/\-.](\d{1,2})\b"));
static DATE_MONTH_NAME: Lazy<Regex> = Lazy::new(|| {
    re(r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b")
});
static CURRENCY_CODE: Lazy<Regex> = Lazy::new(|| re(r"(?i)\b(USD|EUR|GBP|CAD)\b"));
static TIME: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)\b(\d{1,2}):(\d{2})(?::(\d{2}))?\s*([AP]\.?M\.?)?"));

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Extract structured fields from the recognized text of one region.
///
/// Never fails. Empty text yields an all-absent record.
pub fn extract(text: &str) -> ExtractedFields {
    let amount = extract_total(text);
    ExtractedFields {
        vendor: extract_vendor(text),
        date: extract_date(text),
        time: extract_time(text),
        subtotal: first_amount(&SUBTOTAL, text),
        tax: first_amount(&TAX, text),
        tip: first_amount(&TIP, text),
        amount,
        line_items: extract_line_items(text, amount),
        payment_method: extract_payment_method(text),
        currency: detect_currency(text),
        store_id: first_capture(&STORE_ID, text),
        ocr_transaction_id: first_capture(&OCR_TRANSACTION_ID, text),
        transaction_number: first_capture(&TRANSACTION_NUMBER, text),
        order_number: first_capture(&ORDER_NUMBER, text),
        invoice_number: first_capture(&INVOICE_NUMBER, text),
        account_number: first_capture(&ACCOUNT_NUMBER, text),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "").trim().parse::<f64>().ok()
}

fn first_amount(pattern: &Regex, text: &str) -> Option<f64> {
    pattern
        .captures_iter(text)
        .filter_map(|c| parse_amount(&c[1]))
        .find(|v| *v >= 0.0)
}

fn first_capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .map(|c| c[1].trim_end_matches('-').to_string())
        .filter(|s| !s.is_empty())
}

pub fn extract_vendor(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    if let Some((_, name)) = KNOWN_VENDORS.iter().find(|(needle, _)| lower.contains(needle)) {
        return Some(name.to_string());
    }
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(5)
        .find(|l| {
            let len = l.chars().count();
            (3..50).contains(&len) && l.chars().any(char::is_alphabetic)
        })
        .map(str::to_string)
}

pub fn extract_total(text: &str) -> Option<f64> {
    for pattern in TOTAL_PATTERNS.iter() {
        let found = pattern
            .captures_iter(text)
            .filter_map(|c| parse_amount(&c[1]))
            .filter(|v| *v > 0.0 && *v < MAX_PLAUSIBLE_TOTAL)
            .last();
        if found.is_some() {
            return found;
        }
    }
    ANY_AMOUNT
        .captures_iter(text)
        .filter_map(|c| parse_amount(&c[1]))
        .filter(|v| *v > 0.0)
        .fold(None, |max: Option<f64>, v| Some(max.map_or(v, |m| m.max(v))))
}

pub fn extract_line_items(text: &str, total: Option<f64>) -> Vec<LineItem> {
    let mut items = Vec::new();
    for line in text.lines() {
        if SUMMARY_LINE.is_match(line) {
            continue;
        }
        let item = if let Some(c) = SKU_ITEM.captures(line) {
            parse_amount(&c[3]).map(|price| LineItem {
                description: c[2].trim().to_string(),
                price,
                sku: Some(c[1].to_string()),
            })
        } else if let Some(c) = PLAIN_ITEM.captures(line) {
            parse_amount(&c[2]).map(|price| LineItem {
                description: c[1].trim().to_string(),
                price,
                sku: None,
            })
        } else {
            None
        };
        let Some(item) = item else { continue };
        if total.is_some_and(|t| item.price >= t) {
            continue;
        }
        items.push(item);
    }
    items
}

pub fn extract_payment_method(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    PAYMENT_METHODS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, name)| name.to_string())
}

pub fn detect_currency(text: &str) -> Option<String> {
    if let Some(c) = CURRENCY_CODE.captures(text) {
        return Some(c[1].to_uppercase());
    }
    if text.contains('€') {
        Some("EUR".into())
    } else if text.contains('£') {
        Some("GBP".into())
    } else if text.contains('$') {
        Some("USD".into())
    } else {
        None
    }
}

fn expand_year(y: i32) -> i32 {
    if y < 100 {
        2000 + y
    } else {
        y
    }
}

pub fn extract_date(text: &str) -> Option<NaiveDate> {
    let mdy = DATE_MDY.captures_iter(text).find_map(|c| {
        let m: u32 = c[1].parse().ok()?;
        let d: u32 = c[2].parse().ok()?;
        let y: i32 = c[3].parse().ok()?;
        if c[3].len() == 3 {
            return None;
        }
        NaiveDate::from_ymd_opt(expand_year(y), m, d)
    });
    if mdy.is_some() {
        return mdy;
    }
    let ymd = DATE_YMD.captures_iter(text).find_map(|c| {
        let y: i32 = c[1].parse().ok()?;
        let m: u32 = c[2].parse().ok()?;
        let d: u32 = c[3].parse().ok()?;
        NaiveDate::from_ymd_opt(y, m, d)
    });
    if ymd.is_some() {
        return ymd;
    }
    DATE_MONTH_NAME.captures_iter(text).find_map(|c| {
        let name = c[1].to_lowercase();
        let m = MONTHS.iter().position(|mon| *mon == name)? as u32 + 1;
        let d: u32 = c[2].parse().ok()?;
        let y: i32 = c[3].parse().ok()?;
        NaiveDate::from_ymd_opt(y, m, d)
    })
}

pub fn extract_time(text: &str) -> Option<NaiveTime> {
    TIME.captures_iter(text).find_map(|c| {
        let mut h: u32 = c[1].parse().ok()?;
        let m: u32 = c[2].parse().ok()?;
        let s: u32 = c.get(3).map_or(Some(0), |v| v.as_str().parse().ok())?;
        if let Some(meridiem) = c.get(4) {
            if !(1..=12).contains(&h) {
                return None;
            }
            let pm = meridiem.as_str().to_uppercase().starts_with('P');
            h = match (pm, h) {
                (false, 12) => 0,
                (true, 12) => 12,
                (true, h) => h + 12,
                (false, h) => h,
            };
        }
        NaiveTime::from_hms_opt(h, m, s)
    })
}

/// Guess the kind of document from its wording.
pub fn classify_document(text: &str, fields: &ExtractedFields) -> DocumentType {
    let lower = text.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["deposit receipt", "deposit slip", "mobile deposit", "deposit total", "teller deposit"]) {
        DocumentType::BankDepositReceipt
    } else if has(&["statement period", "beginning balance", "ending balance", "opening balance"]) {
        DocumentType::BankStatement
    } else if has(&["packing slip", "packing list", "manifest", "bill of lading", "delivery note"]) {
        DocumentType::Manifest
    } else if lower.contains("invoice")
        && has(&["bill to", "due date", "payment terms", "remit to"])
        && !has(&["paid in full", "payment received", "amount paid"])
    {
        DocumentType::Invoice
    } else if fields.amount.is_some() {
        DocumentType::PaymentReceipt
    } else {
        DocumentType::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WALMART: &str = "WALMART\nSTORE# 1234\n\
        012345678901 PAPER TOWELS 9.97 N\n\
        BANANAS 1.24\n\
        MILK 2% GAL $7.29\n\
        Subtotal: $18.50\nTax: $1.62\nTotal: $20.12\nVISA";

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_walmart_scenario() {
        let f = extract("WALMART\n...\nSubtotal: $18.50\nTax: $1.62\nTotal: $20.12\nVISA");
        assert_eq!(f.vendor.as_deref(), Some("Walmart"));
        assert_eq!(f.subtotal, Some(18.50));
        assert_eq!(f.tax, Some(1.62));
        assert_eq!(f.amount, Some(20.12));
        assert_eq!(f.payment_method.as_deref(), Some("Visa"));
    }

    #[test]
    fn test_appended_total_wins() {
        let inputs = [
            "",
            "random words",
            "CORNER DELI\nSoup $99.99\nBread $3.50",
            "Big ticket $12,345.67 and $0.99",
            WALMART,
        ];
        for input in inputs {
            let text = format!("{input}\nTotal: $42.00");
            assert_eq!(extract(&text).amount, Some(42.00), "input: {input:?}");
        }
    }

    #[test]
    fn test_fallback_total_is_max_amount() {
        assert_eq!(extract_total("coffee 3.50\nmuffin $2.25\n"), Some(3.50));
        assert_eq!(extract_total("no money here"), None);
    }

    #[test]
    fn test_implausible_total_falls_through() {
        let text = "Total: $250000.00\nAmount Due: $25.00";
        assert_eq!(extract_total(text), Some(25.00));
    }

    #[test]
    fn test_vendor_fallback_first_text_line() {
        let text = "1234567\n\nBlue Bottle Cafe\n123 Main St\nTotal 5.00";
        assert_eq!(extract_vendor(text).as_deref(), Some("Blue Bottle Cafe"));
        assert_eq!(extract_vendor("12\n34.00\n"), None);
    }

    #[test]
    fn test_line_items() {
        let items = extract_line_items(WALMART, Some(20.12));
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].sku.as_deref(), Some("012345678901"));
        assert_eq!(items[0].description, "PAPER TOWELS");
        assert_eq!(items[0].price, 9.97);
        assert_eq!(items[1].description, "BANANAS");
        assert_eq!(items[2].price, 7.29);
    }

    #[test]
    fn test_line_items_reject_summary_and_oversized() {
        let text = "WIDGET 5.00\nCASH 50.00\nCHANGE 45.00\nTV 999.00\nTotal 5.00";
        let items = extract_line_items(text, Some(100.0));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "WIDGET");
    }

    #[test]
    fn test_identifiers() {
        let text = "STR# 0042\nTRANS# 88231\nOrder #: A-1001\nInvoice No. INV-77\nAcct ****4321";
        let f = extract(text);
        assert_eq!(f.store_id.as_deref(), Some("0042"));
        assert_eq!(f.ocr_transaction_id.as_deref(), Some("88231"));
        assert_eq!(f.order_number.as_deref(), Some("A-1001"));
        assert_eq!(f.invoice_number.as_deref(), Some("INV-77"));
        assert_eq!(f.account_number.as_deref(), Some("****4321"));
    }

    #[test]
    fn test_dates_in_order() {
        assert_eq!(extract_date("03/14/2024 12:01"), Some(date("2024-03-14")));
        assert_eq!(extract_date("03/14/24"), Some(date("2024-03-14")));
        assert_eq!(extract_date("2024-03-14"), Some(date("2024-03-14")));
        assert_eq!(extract_date("March 14, 2024"), Some(date("2024-03-14")));
        assert_eq!(extract_date("Sept. 3 2023"), Some(date("2023-09-03")));
        // first MM/DD candidate is not a real date, the next one is
        assert_eq!(extract_date("13/45/2024 then 01/02/2024"), Some(date("2024-01-02")));
        assert_eq!(extract_date("nothing"), None);
    }

    #[test]
    fn test_time() {
        assert_eq!(extract_time("at 14:05"), NaiveTime::from_hms_opt(14, 5, 0));
        assert_eq!(extract_time("02:30:15 PM"), NaiveTime::from_hms_opt(14, 30, 15));
        assert_eq!(extract_time("12:10 am"), NaiveTime::from_hms_opt(0, 10, 0));
        assert_eq!(extract_time("no time"), None);
    }

    #[test]
    fn test_payment_method_order() {
        assert_eq!(extract_payment_method("VISA DEBIT").as_deref(), Some("Visa"));
        assert_eq!(extract_payment_method("paid with apple pay").as_deref(), Some("Apple Pay"));
        assert_eq!(extract_payment_method("nothing"), None);
    }

    #[test]
    fn test_empty_text_is_all_absent() {
        let f = extract("");
        assert_eq!(f, ExtractedFields::default());
    }

    #[test]
    fn test_tax_with_rate() {
        assert_eq!(first_amount(&TAX, "SALES TAX 8.25% 1.62"), Some(1.62));
        assert_eq!(first_amount(&TIP, "Tip: 3.00"), Some(3.00));
    }

    #[test]
    fn test_currency() {
        assert_eq!(detect_currency("Total: $5.00").as_deref(), Some("USD"));
        assert_eq!(detect_currency("Summe 5,00 €").as_deref(), Some("EUR"));
        assert_eq!(detect_currency("TOTAL CAD 12.00 $").as_deref(), Some("CAD"));
        assert_eq!(detect_currency("ARCADE TOKENS 4.00"), None);
    }

    #[test]
    fn test_classify_document() {
        let deposit = "CHASE BANK\nDEPOSIT RECEIPT\nDeposit total $500.00";
        assert_eq!(
            classify_document(deposit, &extract(deposit)),
            DocumentType::BankDepositReceipt
        );
        let slip = "PACKING SLIP\nOrder # 55123\n2 x Widget";
        assert_eq!(classify_document(slip, &extract(slip)), DocumentType::Manifest);
        let inv = "INVOICE\nBill To: Acme\nDue Date: 04/01/2024\nTotal: $300.00";
        assert_eq!(classify_document(inv, &extract(inv)), DocumentType::Invoice);
        assert_eq!(classify_document(WALMART, &extract(WALMART)), DocumentType::PaymentReceipt);
        assert_eq!(classify_document("blurry", &extract("blurry")), DocumentType::Unknown);
    }
}
