use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use tillroll::categorizer::{record_hits, CategorySuggester, RuleSuggester, Suggestion};
use tillroll::db::{load_receipts, save_receipts};
use tillroll::error::Result;
use tillroll::fmt::{opt_money, receipt_status, short_id};
use tillroll::ingest::{IngestOptions, IngestQueue, Photo, ProgressEvent};
use tillroll::linker::DocumentLinker;
use tillroll::models::Receipt;
use tillroll::ocr::{OcrOutput, SidecarRecognizer};
use tillroll::segmenter::{BoundaryMode, SegmentationStrategy};

use super::open_db;

pub fn run(photos: &[String], strategy: Option<&str>, mode: Option<&str>, no_link: bool) -> Result<()> {
    let (settings, conn) = open_db()?;
    let strategy: SegmentationStrategy = match strategy {
        Some(s) => s.parse()?,
        None => settings.strategy,
    };
    let mode: BoundaryMode = match mode {
        Some(m) => m.parse()?,
        None => settings.boundary_mode,
    };
    if strategy == SegmentationStrategy::Model {
        eprintln!(
            "{}",
            "Warning: no segmentation model is installed; photos will be split by text.".yellow()
        );
    }

    let options = IngestOptions {
        strategy,
        mode,
        ..Default::default()
    };
    let suggester = RuleSuggester::load(&conn)?;
    let mut queue =
        IngestQueue::new(settings.segmentation.clone(), options).with_suggester(Box::new(suggester.clone()));

    for raw in photos {
        let path = Path::new(raw);
        let photo = match Photo::open(path) {
            Ok(photo) => photo,
            Err(e) => {
                eprintln!("{}", format!("Skipping {raw}: {e}").yellow());
                continue;
            }
        };
        let recognizer = match SidecarRecognizer::for_photo(path) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("{}", format!("Warning: {e}; receipts will need manual review").yellow());
                SidecarRecognizer::new(OcrOutput::default())
            }
        };
        queue.push(photo, Box::new(recognizer));
    }
    if queue.is_empty() {
        println!("No photos to ingest.");
        return Ok(());
    }

    let mut ingested: Vec<Receipt> = Vec::new();
    for event in queue.run() {
        match event {
            ProgressEvent::PhotoStarted { filename, regions, .. } => {
                println!("{filename}: {regions} region(s)");
            }
            ProgressEvent::ReceiptReady { receipt, .. } => ingested.push(*receipt),
            ProgressEvent::PhotoFinished { .. } => {}
            ProgressEvent::Cancelled { remaining } => {
                println!("Cancelled with {remaining} photo(s) left.");
            }
            ProgressEvent::Finished { photos, receipts } => {
                println!("{photos} photo(s), {receipts} receipt(s)");
            }
        }
    }
    save_receipts(&conn, &ingested)?;
    let applied: Vec<Suggestion> = ingested
        .iter()
        .filter(|r| r.category.is_some())
        .filter_map(|r| suggester.suggest_category(r.vendor.as_deref()?, r.amount))
        .collect();
    record_hits(&conn, &applied)?;

    if !no_link {
        let mut all = load_receipts(&conn)?;
        let report = DocumentLinker::new().link(&mut all);
        if !report.is_empty() {
            save_receipts(&conn, &all)?;
            println!(
                "{} duplicate(s), {} supporting document(s), {} payment link(s)",
                report.duplicates.len(),
                report.supplemental.len(),
                report.links.len()
            );
        }
        // show the linked state of what was just ingested
        for r in ingested.iter_mut() {
            if let Some(updated) = all.iter().find(|a| a.id == r.id) {
                *r = updated.clone();
            }
        }
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "File", "Region", "Vendor", "Date", "Total", "Status"]);
    for r in &ingested {
        table.add_row(vec![
            Cell::new(short_id(&r.id)),
            Cell::new(r.filename.as_deref().unwrap_or("")),
            Cell::new(r.region_index),
            Cell::new(r.vendor.as_deref().unwrap_or("")),
            Cell::new(r.date),
            Cell::new(opt_money(r.amount)),
            Cell::new(receipt_status(r)),
        ]);
    }
    println!("Ingested Receipts\n{table}");
    Ok(())
}
