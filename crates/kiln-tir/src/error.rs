use thiserror::Error;

/// Errors raised while building or decoding IR.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TirError {
    #[error("Invalid data type: {0}")]
    InvalidDataType(String),

    #[error("Unknown struct field tag: {0}")]
    UnknownStructField(i64),
}
