//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the application and the model implementations and record store.

mod classifier;
mod record_store;

pub use classifier::{
    argmax, check_shape, ModelError, MultiLabelClassifier, MultiLabelTrainer,
    SingleLabelClassifier, SingleLabelTrainer,
};
pub use record_store::RecordStore;
