use std::path::Path;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::{Result, TillrollError};
use crate::models::{LineItem, Receipt, Transaction};

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS receipts (
    id TEXT PRIMARY KEY,
    filename TEXT,
    region_index INTEGER NOT NULL DEFAULT 0,
    image_hash TEXT,
    document_type TEXT NOT NULL DEFAULT 'unknown',
    vendor TEXT,
    date TEXT NOT NULL,
    date_is_fallback INTEGER NOT NULL DEFAULT 0,
    time TEXT,
    subtotal REAL,
    tax REAL,
    tip REAL,
    amount REAL,
    line_items TEXT NOT NULL DEFAULT '[]',
    payment_method TEXT,
    currency TEXT,
    category TEXT,
    store_id TEXT,
    ocr_transaction_id TEXT,
    transaction_number TEXT,
    order_number TEXT,
    invoice_number TEXT,
    account_number TEXT,
    linked_document_ids TEXT NOT NULL DEFAULT '[]',
    primary_document_id TEXT,
    is_supplemental_doc INTEGER NOT NULL DEFAULT 0,
    is_duplicate INTEGER NOT NULL DEFAULT 0,
    duplicate_of_id TEXT,
    user_validated INTEGER NOT NULL DEFAULT 0,
    ocr_failed INTEGER NOT NULL DEFAULT 0,
    raw_text TEXT NOT NULL DEFAULT '',
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    date TEXT NOT NULL,
    amount REAL NOT NULL,
    category TEXT,
    vendor TEXT,
    description TEXT,
    income_source TEXT,
    receipt_id TEXT,
    linked_transaction_id TEXT,
    verification_level TEXT NOT NULL DEFAULT 'self_reported',
    is_duplicate_of_linked INTEGER NOT NULL DEFAULT 0,
    original_amount REAL,
    original_date TEXT,
    original_vendor TEXT,
    original_category TEXT,
    was_manually_edited INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (receipt_id) REFERENCES receipts(id)
);

CREATE TABLE IF NOT EXISTS category_rules (
    id INTEGER PRIMARY KEY,
    pattern TEXT NOT NULL,
    match_type TEXT DEFAULT 'contains',
    category TEXT NOT NULL,
    priority INTEGER DEFAULT 0,
    hit_count INTEGER DEFAULT 0,
    from_correction INTEGER DEFAULT 0,
    is_active INTEGER DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);
CREATE INDEX IF NOT EXISTS idx_receipts_image_hash ON receipts(image_hash);
";

const RECEIPT_COLUMNS: &[&str] = &[
    "id",
    "filename",
    "region_index",
    "image_hash",
    "document_type",
    "vendor",
    "date",
    "date_is_fallback",
    "time",
    "subtotal",
    "tax",
    "tip",
    "amount",
    "line_items",
    "payment_method",
    "currency",
    "category",
    "store_id",
    "ocr_transaction_id",
    "transaction_number",
    "order_number",
    "invoice_number",
    "account_number",
    "linked_document_ids",
    "primary_document_id",
    "is_supplemental_doc",
    "is_duplicate",
    "duplicate_of_id",
    "user_validated",
    "ocr_failed",
    "raw_text",
];

const TRANSACTION_COLUMNS: &[&str] = &[
    "id",
    "type",
    "date",
    "amount",
    "category",
    "vendor",
    "description",
    "income_source",
    "receipt_id",
    "linked_transaction_id",
    "verification_level",
    "is_duplicate_of_linked",
    "original_amount",
    "original_date",
    "original_vendor",
    "original_category",
    "was_manually_edited",
];

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M:%S";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

fn upsert_sql(table: &str, columns: &[&str]) -> String {
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let updates: Vec<String> = columns[1..]
        .iter()
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    format!(
        "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {}",
        columns.join(", "),
        placeholders.join(", "),
        updates.join(", ")
    )
}

fn select_sql(table: &str, columns: &[&str]) -> String {
    format!("SELECT {} FROM {table}", columns.join(", "))
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn parse_optional<T>(row: &Row, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| s.parse().map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn date_column(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FMT).map_err(|e| conversion_error(idx, e))
}

fn optional_date_column(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| NaiveDate::parse_from_str(&s, DATE_FMT).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

fn row_to_receipt(row: &Row) -> rusqlite::Result<Receipt> {
    let region_index: i64 = row.get(2)?;
    let time: Option<String> = row.get(8)?;
    let time = time
        .map(|s| NaiveTime::parse_from_str(&s, TIME_FMT).map_err(|e| conversion_error(8, e)))
        .transpose()?;
    let line_items: Vec<LineItem> = json_column(row, 13)?;
    let linked_document_ids: Vec<String> = json_column(row, 23)?;
    Ok(Receipt {
        id: row.get(0)?,
        filename: row.get(1)?,
        region_index: region_index.max(0) as usize,
        image_hash: row.get(3)?,
        document_type: parse_column(row, 4)?,
        vendor: row.get(5)?,
        date: date_column(row, 6)?,
        date_is_fallback: row.get(7)?,
        time,
        subtotal: row.get(9)?,
        tax: row.get(10)?,
        tip: row.get(11)?,
        amount: row.get(12)?,
        line_items,
        payment_method: row.get(14)?,
        currency: row.get(15)?,
        category: row.get(16)?,
        store_id: row.get(17)?,
        ocr_transaction_id: row.get(18)?,
        transaction_number: row.get(19)?,
        order_number: row.get(20)?,
        invoice_number: row.get(21)?,
        account_number: row.get(22)?,
        linked_document_ids,
        primary_document_id: row.get(24)?,
        is_supplemental_doc: row.get(25)?,
        is_duplicate: row.get(26)?,
        duplicate_of_id: row.get(27)?,
        user_validated: row.get(28)?,
        ocr_failed: row.get(29)?,
        raw_text: row.get(30)?,
    })
}

pub fn save_receipt(conn: &Connection, r: &Receipt) -> Result<()> {
    let line_items = serde_json::to_string(&r.line_items)?;
    let linked = serde_json::to_string(&r.linked_document_ids)?;
    conn.execute(
        &upsert_sql("receipts", RECEIPT_COLUMNS),
        rusqlite::params![
            r.id,
            r.filename,
            r.region_index as i64,
            r.image_hash,
            r.document_type.as_str(),
            r.vendor,
            r.date.format(DATE_FMT).to_string(),
            r.date_is_fallback,
            r.time.map(|t| t.format(TIME_FMT).to_string()),
            r.subtotal,
            r.tax,
            r.tip,
            r.amount,
            line_items,
            r.payment_method,
            r.currency,
            r.category,
            r.store_id,
            r.ocr_transaction_id,
            r.transaction_number,
            r.order_number,
            r.invoice_number,
            r.account_number,
            linked,
            r.primary_document_id,
            r.is_supplemental_doc,
            r.is_duplicate,
            r.duplicate_of_id,
            r.user_validated,
            r.ocr_failed,
            r.raw_text,
        ],
    )?;
    Ok(())
}

pub fn save_receipts(conn: &Connection, receipts: &[Receipt]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for r in receipts {
        save_receipt(&tx, r)?;
    }
    tx.commit()?;
    Ok(())
}

/// All receipts in ingestion order.
pub fn load_receipts(conn: &Connection) -> Result<Vec<Receipt>> {
    let sql = format!("{} ORDER BY rowid", select_sql("receipts", RECEIPT_COLUMNS));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], row_to_receipt)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_receipt(conn: &Connection, id: &str) -> Result<Receipt> {
    let sql = format!("{} WHERE id = ?1", select_sql("receipts", RECEIPT_COLUMNS));
    conn.query_row(&sql, [id], row_to_receipt)
        .optional()?
        .ok_or_else(|| TillrollError::UnknownReceipt(id.to_string()))
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

fn row_to_transaction(row: &Row) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        kind: parse_column(row, 1)?,
        date: date_column(row, 2)?,
        amount: row.get(3)?,
        category: row.get(4)?,
        vendor: row.get(5)?,
        description: row.get(6)?,
        income_source: parse_optional(row, 7)?,
        receipt_id: row.get(8)?,
        linked_transaction_id: row.get(9)?,
        verification_level: parse_column(row, 10)?,
        is_duplicate_of_linked: row.get(11)?,
        original_amount: row.get(12)?,
        original_date: optional_date_column(row, 13)?,
        original_vendor: row.get(14)?,
        original_category: row.get(15)?,
        was_manually_edited: row.get(16)?,
    })
}

pub fn save_transaction(conn: &Connection, t: &Transaction) -> Result<()> {
    conn.execute(
        &upsert_sql("transactions", TRANSACTION_COLUMNS),
        rusqlite::params![
            t.id,
            t.kind.as_str(),
            t.date.format(DATE_FMT).to_string(),
            t.amount,
            t.category,
            t.vendor,
            t.description,
            t.income_source.map(|s| s.as_str()),
            t.receipt_id,
            t.linked_transaction_id,
            t.verification_level.as_str(),
            t.is_duplicate_of_linked,
            t.original_amount,
            t.original_date.map(|d| d.format(DATE_FMT).to_string()),
            t.original_vendor,
            t.original_category,
            t.was_manually_edited,
        ],
    )?;
    Ok(())
}

pub fn save_transactions(conn: &Connection, txns: &[Transaction]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for t in txns {
        save_transaction(&tx, t)?;
    }
    tx.commit()?;
    Ok(())
}

pub fn load_transactions(conn: &Connection) -> Result<Vec<Transaction>> {
    let sql = format!("{} ORDER BY date, rowid", select_sql("transactions", TRANSACTION_COLUMNS));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], row_to_transaction)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_transaction(conn: &Connection, id: &str) -> Result<Transaction> {
    let sql = format!("{} WHERE id = ?1", select_sql("transactions", TRANSACTION_COLUMNS));
    conn.query_row(&sql, [id], row_to_transaction)
        .optional()?
        .ok_or_else(|| TillrollError::UnknownTransaction(id.to_string()))
}

/// The transaction converted from a receipt, if any.
pub fn transaction_for_receipt(conn: &Connection, receipt_id: &str) -> Result<Option<Transaction>> {
    let sql = format!("{} WHERE receipt_id = ?1", select_sql("transactions", TRANSACTION_COLUMNS));
    Ok(conn.query_row(&sql, [receipt_id], row_to_transaction).optional()?)
}

// ---------------------------------------------------------------------------
// Id lookup
// ---------------------------------------------------------------------------

fn resolve_prefix(conn: &Connection, table: &str, prefix: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id FROM {table} WHERE id LIKE ?1 || '%' ORDER BY id LIMIT 2"
    ))?;
    let ids: Vec<String> = stmt
        .query_map([prefix], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    match ids.as_slice() {
        [only] => Ok(Some(only.clone())),
        [] => Ok(None),
        _ => Err(TillrollError::Other(format!("id prefix '{prefix}' is ambiguous"))),
    }
}

/// Resolve a full id or unique id prefix to a receipt id.
pub fn resolve_receipt_id(conn: &Connection, prefix: &str) -> Result<String> {
    resolve_prefix(conn, "receipts", prefix)?
        .ok_or_else(|| TillrollError::UnknownReceipt(prefix.to_string()))
}

/// Resolve a full id or unique id prefix to a transaction id.
pub fn resolve_transaction_id(conn: &Connection, prefix: &str) -> Result<String> {
    resolve_prefix(conn, "transactions", prefix)?
        .ok_or_else(|| TillrollError::UnknownTransaction(prefix.to_string()))
}
