use std::path::PathBuf;

use kiln_codegen::CodegenError;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// CLI-specific error type that provides rich diagnostics
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("Failed to {operation} {path}")]
    #[diagnostic(code(kiln::cli::io_error))]
    IoError {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid {what}: {message}")]
    #[diagnostic(code(kiln::cli::parse_error))]
    ParseError {
        what: &'static str,
        #[source_code]
        src: NamedSource<String>,
        #[label("{message}")]
        span: Option<SourceSpan>,
        message: String,
    },

    #[error("Manifest {path} defines no functions")]
    #[diagnostic(code(kiln::cli::empty_manifest), help("add at least one [[function]] table"))]
    EmptyManifest { path: PathBuf },

    #[error(transparent)]
    #[diagnostic(code(kiln::cli::codegen_error))]
    Codegen(#[from] CodegenError),
}

/// Converts a TOML error into a diagnostic pointing into `source`.
pub fn convert_toml_error(error: toml::de::Error, what: &'static str, path: &std::path::Path, source: &str) -> CliError {
    CliError::ParseError {
        what,
        src: NamedSource::new(path.display().to_string(), source.to_string()),
        span: error.span().map(SourceSpan::from),
        message: error.message().to_string(),
    }
}
