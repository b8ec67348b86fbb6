use std::path::Path;

use crate::error::CliError;

pub fn read_file(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::IoError {
        path: path.to_path_buf(),
        operation: "read",
        source,
    })
}

pub fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CliError> {
    std::fs::write(path, bytes).map_err(|source| CliError::IoError {
        path: path.to_path_buf(),
        operation: "write",
        source,
    })
}
