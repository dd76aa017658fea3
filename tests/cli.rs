use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

const WALMART: &str = "WALMART\nSTORE# 1234\n03/14/2024\nSubtotal: $18.50\nTax: $1.62\nTotal: $20.12\nVISA\n";

fn tillroll(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tillroll").unwrap();
    cmd.env("HOME", home)
        .env("NO_COLOR", "1")
        .env_remove("TILLROLL_LOG");
    cmd
}

fn init(home: &Path) {
    tillroll(home)
        .args(["init", "--data-dir"])
        .arg(home.join("books"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized tillroll"));
}

/// Short id from an "Added <type> <id> ..." line.
fn added_id(stdout: &[u8]) -> String {
    let out = String::from_utf8_lossy(stdout);
    let line = out.lines().find(|l| l.starts_with("Added")).unwrap();
    line.split_whitespace().nth(2).unwrap().to_string()
}

/// Cells of the first table row containing `needle`.
fn table_row(stdout: &[u8], needle: &str) -> Vec<String> {
    let out = String::from_utf8_lossy(stdout);
    let row = out
        .lines()
        .find(|l| l.contains(needle) && !l.contains("region(s)"))
        .unwrap();
    row.split(|c: char| c == '|' || c == '\u{2502}' || c == '\u{2506}')
        .map(|cell| cell.trim().to_string())
        .filter(|cell| !cell.is_empty())
        .collect()
}

/// Short receipt id from the "Ingested Receipts" row for `filename`.
fn ingested_id(stdout: &[u8], filename: &str) -> String {
    table_row(stdout, filename)[0].clone()
}

fn add_txn(home: &Path, args: &[&str]) -> String {
    let out = tillroll(home).args(["txn", "add"]).args(args).output().unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    added_id(&out.stdout)
}

#[test]
fn test_status_without_init() {
    let home = tempfile::tempdir().unwrap();
    tillroll(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Database not found"));
}

#[test]
fn test_commands_require_init() {
    let home = tempfile::tempdir().unwrap();
    tillroll(home.path())
        .args(["txn", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: ").and(predicate::str::contains("tillroll init")));
}

#[test]
fn test_init_then_status() {
    let home = tempfile::tempdir().unwrap();
    init(home.path());
    assert!(home.path().join("books/tillroll.db").exists());
    assert!(home.path().join(".config/tillroll/settings.json").exists());
    tillroll(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Receipts:      0").and(predicate::str::contains("Transactions:  0")));
}

#[test]
fn test_extract_prints_fields() {
    let home = tempfile::tempdir().unwrap();
    let file = home.path().join("walmart.txt");
    std::fs::write(&file, WALMART).unwrap();
    tillroll(home.path())
        .arg("extract")
        .arg(&file)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Walmart")
                .and(predicate::str::contains("$20.12"))
                .and(predicate::str::contains("2024-03-14"))
                .and(predicate::str::contains("payment_receipt")),
        );
}

#[test]
fn test_check_and_deposit_count_once_when_linked() {
    let home = tempfile::tempdir().unwrap();
    init(home.path());
    let check = add_txn(home.path(), &["500", "--date", "2024-03-01", "--type", "income", "--source", "check"]);

    let out = tillroll(home.path())
        .args(["txn", "add", "500", "--date", "2024-03-04", "--type", "income", "--source", "deposit"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("looks like a duplicate"), "{stdout}");
    let deposit = added_id(&out.stdout);

    tillroll(home.path())
        .args(["dupes", &deposit])
        .assert()
        .success()
        .stdout(predicate::str::contains("97").and(predicate::str::contains("exact amount match")));

    tillroll(home.path())
        .args(["totals"])
        .assert()
        .success()
        .stdout(predicate::str::contains("$1,000.00"));

    tillroll(home.path())
        .args(["link", &check, &deposit, "--duplicate", &deposit])
        .assert()
        .success()
        .stdout(predicate::str::contains("Linked"));

    tillroll(home.path())
        .args(["totals", "--year", "2024"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("$500.00")
                .and(predicate::str::contains("1 linked duplicates excluded"))
                .and(predicate::str::contains("$1,000.00").not()),
        );

    tillroll(home.path())
        .args(["txn", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("strong").and(predicate::str::contains("(excluded)")));

    tillroll(home.path()).args(["unlink", &deposit, &check]).assert().success();
    tillroll(home.path())
        .args(["totals"])
        .assert()
        .success()
        .stdout(predicate::str::contains("$1,000.00"));
}

#[test]
fn test_link_rejects_duplicate_outside_pair() {
    let home = tempfile::tempdir().unwrap();
    init(home.path());
    let a = add_txn(home.path(), &["100", "--date", "2024-05-01", "--type", "income", "--source", "check"]);
    let b = add_txn(home.path(), &["100", "--date", "2024-05-02", "--type", "income", "--source", "deposit"]);
    let c = add_txn(home.path(), &["40", "--date", "2024-05-02", "--type", "income", "--source", "cash"]);

    tillroll(home.path())
        .args(["link", &a, &b, "--duplicate", &c])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: Invariant violation"));

    tillroll(home.path()).args(["link", &a, &b, "--duplicate", &b]).assert().success();
    // a is taken; linking it elsewhere must not silently move the link
    tillroll(home.path())
        .args(["link", &a, &c, "--duplicate", &c])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unlink first"));
}

#[test]
fn test_rules_and_category_corrections() {
    let home = tempfile::tempdir().unwrap();
    init(home.path());
    tillroll(home.path())
        .args(["rules", "add", "staples", "--category", "Supplies"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added rule: 'staples' \u{2192} Supplies"));

    let id = add_txn(home.path(), &["19.99", "--date", "2024-01-02", "--vendor", "STAPLES #12"]);
    tillroll(home.path())
        .args(["txn", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Supplies"));

    tillroll(home.path())
        .args(["txn", "edit", &id, "--category", "Office"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Learned rule: 'STAPLES #12' \u{2192} Office"));

    tillroll(home.path())
        .args(["rules", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Office").and(predicate::str::contains("yes")));
}

#[test]
fn test_rules_reject_bad_regex() {
    let home = tempfile::tempdir().unwrap();
    init(home.path());
    tillroll(home.path())
        .args(["rules", "add", "(", "--category", "X", "--match-type", "regex"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid regex"));
}

#[test]
fn test_ingest_photo_with_sidecar() {
    let home = tempfile::tempdir().unwrap();
    init(home.path());
    let photo = home.path().join("IMG_0001.png");
    image::RgbImage::from_pixel(40, 60, image::Rgb([250, 250, 250]))
        .save(&photo)
        .unwrap();
    std::fs::write(home.path().join("IMG_0001.png.txt"), WALMART).unwrap();

    tillroll(home.path())
        .arg("ingest")
        .arg(&photo)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 photo(s), 1 receipt(s)").and(predicate::str::contains("Walmart")));

    tillroll(home.path())
        .args(["receipts", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("$20.12").and(predicate::str::contains("ok")));

    // the same photo again is recognized as a duplicate
    tillroll(home.path())
        .arg("ingest")
        .arg(&photo)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 duplicate(s)"));
}

#[test]
fn test_ingest_without_sidecar_flags_review() {
    let home = tempfile::tempdir().unwrap();
    init(home.path());
    let photo = home.path().join("blurry.png");
    image::RgbImage::new(30, 30).save(&photo).unwrap();

    tillroll(home.path())
        .arg("ingest")
        .arg(&photo)
        .assert()
        .success()
        .stderr(predicate::str::contains("manual review"))
        .stdout(predicate::str::contains("needs review"));
}

#[test]
fn test_receipt_to_expense() {
    let home = tempfile::tempdir().unwrap();
    init(home.path());
    let photo = home.path().join("lunch.png");
    image::RgbImage::new(20, 20).save(&photo).unwrap();
    std::fs::write(home.path().join("lunch.png.txt"), "Blue Bottle Cafe\n05/02/2024\nTotal 12.50\n").unwrap();
    let out = tillroll(home.path()).arg("ingest").arg(&photo).output().unwrap();
    assert!(out.status.success());

    let receipt_id = ingested_id(&out.stdout, "lunch.png");

    tillroll(home.path())
        .args(["txn", "from-receipt", &receipt_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("$12.50"));
    tillroll(home.path())
        .args(["txn", "from-receipt", &receipt_id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already has transaction"));
    tillroll(home.path())
        .args(["txn", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("bank"));
}

#[test]
fn test_txn_import_is_repeatable() {
    let home = tempfile::tempdir().unwrap();
    init(home.path());
    let csv = home.path().join("bank.csv");
    std::fs::write(
        &csv,
        "Date,Description,Amount\n01/15/2025,OFFICE DEPOT,-42.10\n01/16/2025,MOBILE DEPOSIT,1500.00\n",
    )
    .unwrap();

    tillroll(home.path())
        .args(["txn", "import"])
        .arg(&csv)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 imported, 0 skipped"));
    tillroll(home.path())
        .args(["txn", "import"])
        .arg(&csv)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 imported, 2 skipped"));
}

#[test]
fn test_imported_deposit_warns_about_recorded_check() {
    let home = tempfile::tempdir().unwrap();
    init(home.path());
    add_txn(home.path(), &["500", "--date", "2024-03-01", "--type", "income", "--source", "check"]);
    let csv = home.path().join("bank.csv");
    std::fs::write(
        &csv,
        "Date,Description,Amount\n03/04/2024,MOBILE DEPOSIT,500.00\n03/05/2024,OFFICE DEPOT,-500.00\n",
    )
    .unwrap();

    let out = tillroll(home.path()).args(["txn", "import"]).arg(&csv).output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("2 imported"), "{stdout}");
    assert_eq!(stdout.matches("looks like a duplicate").count(), 1, "{stdout}");
}

#[test]
fn test_applied_rules_count_hits() {
    let home = tempfile::tempdir().unwrap();
    init(home.path());
    tillroll(home.path())
        .args(["rules", "add", "staples", "--category", "Supplies"])
        .assert()
        .success();
    add_txn(home.path(), &["19.99", "--date", "2024-01-02", "--vendor", "STAPLES #12"]);
    let csv = home.path().join("bank.csv");
    std::fs::write(&csv, "Date,Description,Amount\n01/09/2024,STAPLES ONLINE,-7.50\n").unwrap();
    tillroll(home.path())
        .args(["txn", "import"])
        .arg(&csv)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 categorized"));

    let out = tillroll(home.path()).args(["rules", "list"]).output().unwrap();
    assert!(out.status.success());
    let row = table_row(&out.stdout, "staples");
    // ID, Pattern, Type, Category, Priority, Hits
    assert_eq!(row[5], "2", "{row:?}");
}

#[test]
fn test_validate_receipt_after_failed_recognition() {
    let home = tempfile::tempdir().unwrap();
    init(home.path());
    let photo = home.path().join("deli.png");
    image::RgbImage::new(30, 30).save(&photo).unwrap();
    let out = tillroll(home.path()).arg("ingest").arg(&photo).output().unwrap();
    assert!(out.status.success());
    let receipt_id = ingested_id(&out.stdout, "deli.png");

    tillroll(home.path())
        .args(["txn", "from-receipt", &receipt_id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no total"));

    tillroll(home.path())
        .args([
            "receipts", "validate", &receipt_id, "--vendor", "Corner Deli", "--amount", "8.75", "--date",
            "2024-05-02",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Validated").and(predicate::str::contains("$8.75")));

    tillroll(home.path())
        .args(["receipts", "list"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("validated")
                .and(predicate::str::contains("Corner Deli"))
                .and(predicate::str::contains("needs review").not()),
        );
    tillroll(home.path())
        .args(["txn", "from-receipt", &receipt_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("$8.75"));
}

#[test]
fn test_totals_option_errors() {
    let home = tempfile::tempdir().unwrap();
    init(home.path());
    tillroll(home.path())
        .args(["totals", "--from", "2024-01-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--from requires --to"));
}
