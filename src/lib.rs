//! Receipt ingestion, extraction and verification for cash-basis
//! bookkeeping.

pub mod categorizer;
pub mod db;
pub mod dedup;
pub mod error;
pub mod extractor;
pub mod fmt;
pub mod geometry;
pub mod importer;
pub mod ingest;
pub mod linkage;
pub mod linker;
pub mod models;
pub mod ocr;
pub mod reports;
pub mod segmenter;
pub mod settings;
