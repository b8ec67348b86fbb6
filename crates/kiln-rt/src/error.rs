use kiln_codegen::CodegenError;
use thiserror::Error;

/// Errors specific to the kiln runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Compilation failed: {0}")]
    Compile(#[from] CodegenError),

    #[error("Entry point {0} not found in compiled module.")]
    EntryPointNotFound(String),

    #[error("No runtime symbol for context slot {0}.")]
    MissingRuntimeSymbol(String),

    #[error("{kind}: {message}")]
    Raised { kind: String, message: String },
}

/// An error raised by generated code or a packed function through the error side channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaisedError {
    pub kind: String,
    pub message: String,
}

impl From<RaisedError> for RuntimeError {
    fn from(err: RaisedError) -> Self {
        RuntimeError::Raised { kind: err.kind, message: err.message }
    }
}
