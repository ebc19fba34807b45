//! Record ingestion utility for the medrecommend training store.
//!
//! Reads spreadsheet rows exported as a JSON array of objects, cleans them
//! and appends them to the record store.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin ingest_records -- <rows.json> [--store <path>]
//! ```
//!
//! The store defaults to `MEDRECOMMEND_DATA_PATH`, then `output.json`.

use std::env;
use std::fs;
use std::path::PathBuf;

use serde_json::Value;

use medrecommend::adapters::ingest::clean_rows;
use medrecommend::adapters::json_store::JsonRecordStore;
use medrecommend::ports::RecordStore;

const DEFAULT_DATA_PATH: &str = "output.json";

fn usage() -> String {
    "Usage: ingest_records <rows.json> [--store <path>]".to_string()
}

fn parse_args() -> Result<(PathBuf, PathBuf), String> {
    let mut args = env::args().skip(1);
    let mut input: Option<PathBuf> = None;
    let mut store: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--store" => {
                let v = args.next().ok_or_else(usage)?;
                store = Some(PathBuf::from(v));
            }
            "-h" | "--help" => return Err(usage()),
            _ => {
                if input.is_none() {
                    input = Some(PathBuf::from(arg));
                } else {
                    return Err(usage());
                }
            }
        }
    }

    let input = input.ok_or_else(usage)?;
    let store = store.unwrap_or_else(|| {
        env::var("MEDRECOMMEND_DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_PATH))
    });
    Ok((input, store))
}

fn main() -> Result<(), String> {
    let (input, store_path) = parse_args()?;

    let bytes = fs::read(&input).map_err(|e| format!("Failed to read {input:?}: {e}"))?;
    let document: Value =
        serde_json::from_slice(&bytes).map_err(|e| format!("Invalid JSON in {input:?}: {e}"))?;
    let rows = match document {
        Value::Array(rows) => rows,
        _ => return Err(format!("{input:?} must contain a JSON array of row objects")),
    };

    let cleaned = clean_rows(&rows);
    if cleaned.dropped_empty > 0 || cleaned.dropped_invalid > 0 {
        eprintln!(
            "Skipped {} empty and {} malformed rows",
            cleaned.dropped_empty, cleaned.dropped_invalid
        );
    }

    let store = JsonRecordStore::new(&store_path);
    let appended = store
        .append_records(&cleaned.rows)
        .map_err(|e| format!("Failed to update {store_path:?}: {e}"))?;

    println!("Appended {appended} records to {}", store_path.display());
    Ok(())
}
