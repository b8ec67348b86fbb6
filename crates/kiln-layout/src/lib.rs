//! C-compatible layouts of the records shared between generated code and the kiln runtime.
//!
//! Layouts come from `repc`, so they follow the target's C ABI rules rather than
//! hand-maintained offsets.

use thiserror::Error;

mod catalog;
mod record;

pub use catalog::{field, type_index, AbiTypeCatalog};
pub use record::{AbiType, FieldLayout, RecordLayout};

/// Errors that can occur during layout computation.
#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("Layout computation failed: {0}")]
    RepcError(#[from] repc::Error),

    #[error("The host target is not supported by the layout engine")]
    UnsupportedHost,

    #[error("No C layout rules are known for target {0}")]
    UnsupportedTarget(String),

    #[error("Layout of {0} is not a record")]
    NotARecord(String),

    #[error("Missing layout for field {1} of {0}")]
    MissingFieldLayout(String, usize),

    #[error("Invalid field index {1} for {0}")]
    InvalidFieldIndex(String, usize),

    #[error("Values of type {0} cannot be stored in a closure record")]
    UnsupportedSlotType(String),
}
