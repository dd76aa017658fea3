use tillroll::db::get_connection;
use tillroll::error::Result;
use tillroll::settings::{load_settings, settings_file_exists};

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = settings.db_path();

    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());
    println!("Strategy:   {}", settings.strategy.as_str());
    if !settings_file_exists() {
        println!("Settings:   (defaults)");
    }

    if !db_path.exists() {
        println!();
        println!("Database not found. Run `tillroll init` to set up.");
        return Ok(());
    }

    let conn = get_connection(&db_path)?;
    let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };

    println!();
    println!("Receipts:      {}", count("SELECT count(*) FROM receipts")?);
    println!("  review:      {}", count("SELECT count(*) FROM receipts WHERE ocr_failed = 1 OR amount IS NULL")?);
    println!("  duplicates:  {}", count("SELECT count(*) FROM receipts WHERE is_duplicate = 1")?);
    println!("  supporting:  {}", count("SELECT count(*) FROM receipts WHERE is_supplemental_doc = 1")?);
    println!("Transactions:  {}", count("SELECT count(*) FROM transactions")?);
    println!("  linked:      {}", count("SELECT count(*) FROM transactions WHERE linked_transaction_id IS NOT NULL")?);
    println!("Rules:         {}", count("SELECT count(*) FROM category_rules WHERE is_active = 1")?);
    Ok(())
}
