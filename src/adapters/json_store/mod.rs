//! JSON file adapter: Implementation of RecordStore.
//!
//! The store is a single JSON document holding either a bare list of
//! records or an object with a `records` list. Appends keep whichever layout
//! the file already has and rewrite the document with 4-space indentation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::RawRecord;
use crate::ports::RecordStore;

/// Key holding the record list in the object layout.
const RECORDS_KEY: &str = "records";

/// Error type for record store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record store not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported store layout: {0}")]
    InvalidLayout(String),
}

/// Document layout found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    List,
    Object,
}

/// JSON file record store.
#[derive(Debug, Clone)]
pub struct JsonRecordStore {
    path: PathBuf,
}

impl JsonRecordStore {
    /// Create a store backed by the file at `path` (it need not exist yet).
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Value, StoreError> {
        let content = fs::read(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(self.path.clone()),
            _ => StoreError::Io(e),
        })?;
        Ok(serde_json::from_slice(&content)?)
    }

    fn split_document(
        document: Value,
    ) -> Result<(Layout, Map<String, Value>, Vec<RawRecord>), StoreError> {
        match document {
            Value::Array(records) => Ok((Layout::List, Map::new(), records)),
            Value::Object(mut map) => match map.remove(RECORDS_KEY) {
                None | Some(Value::Null) => Ok((Layout::Object, map, Vec::new())),
                Some(Value::Array(records)) => Ok((Layout::Object, map, records)),
                Some(other) => Err(StoreError::InvalidLayout(format!(
                    "\"{RECORDS_KEY}\" must be a list, found {}",
                    json_kind(&other)
                ))),
            },
            other => Err(StoreError::InvalidLayout(format!(
                "expected a list or an object, found {}",
                json_kind(&other)
            ))),
        }
    }

    fn write_document(&self, document: &Value) -> Result<(), StoreError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        document.serialize(&mut serializer)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        // Write next to the target, then rename over it.
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &buf)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

impl RecordStore for JsonRecordStore {
    type Error = StoreError;

    fn load_records(&self) -> Result<Vec<RawRecord>, Self::Error> {
        let (_, _, records) = Self::split_document(self.read_document()?)?;
        tracing::debug!("Loaded {} records from {:?}", records.len(), self.path);
        Ok(records)
    }

    fn append_records(&self, records: &[RawRecord]) -> Result<usize, Self::Error> {
        // A missing or corrupt store starts over as an empty list; read
        // failures must not clobber the file.
        let (layout, mut map, mut existing) = match self.read_document() {
            Ok(document) => Self::split_document(document)?,
            Err(StoreError::NotFound(_)) => (Layout::List, Map::new(), Vec::new()),
            Err(StoreError::Json(e)) => {
                tracing::warn!(
                    "Record store {:?} is not valid JSON ({}), starting a new list",
                    self.path,
                    e
                );
                (Layout::List, Map::new(), Vec::new())
            }
            Err(e) => return Err(e),
        };

        existing.extend(records.iter().cloned());
        let total = existing.len();

        let document = match layout {
            Layout::List => Value::Array(existing),
            Layout::Object => {
                map.insert(RECORDS_KEY.to_string(), Value::Array(existing));
                Value::Object(map)
            }
        };
        self.write_document(&document)?;

        tracing::info!(
            "Appended {} records to {:?} ({} total)",
            records.len(),
            self.path,
            total
        );
        Ok(records.len())
    }
}
