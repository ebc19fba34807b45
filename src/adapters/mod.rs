//! Adapters layer: Concrete implementations of ports.
//!
//! These modules contain the actual learning and storage code:
//! - `tree`: CART regression trees shared by both ensembles
//! - `boosting`: gradient-boosted trees for the disease model
//! - `forest`: random forest for the medicine model
//! - `json_store`: JSON file record store
//! - `ingest`: cleaning of exported spreadsheet rows

pub mod boosting;
pub mod forest;
pub mod ingest;
pub mod json_store;
pub mod tree;

// Re-export store error for lib.rs
pub use json_store::StoreError;
