//! Record store port: Trait for the persisted training records.
//!
//! The store is append-only. Training always reads it wholesale.

use crate::domain::RawRecord;

/// Trait for the append-only patient record store.
pub trait RecordStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load every stored record.
    ///
    /// # Errors
    /// Returns error if the store is missing, unreadable or malformed.
    fn load_records(&self) -> Result<Vec<RawRecord>, Self::Error>;

    /// Append records to the store.
    ///
    /// # Returns
    /// The number of records appended.
    ///
    /// # Errors
    /// Returns error if the store cannot be written.
    fn append_records(&self, records: &[RawRecord]) -> Result<usize, Self::Error>;

    /// Count stored records.
    ///
    /// # Errors
    /// Returns error if the store cannot be read.
    fn count_records(&self) -> Result<usize, Self::Error> {
        self.load_records().map(|records| records.len())
    }
}
