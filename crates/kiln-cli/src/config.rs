//! `kiln.toml` project configuration.

use std::path::{Path, PathBuf};

use kiln_codegen::CodegenOptions;
use kiln_tir::IrModule;
use serde::Deserialize;

use crate::error::{convert_toml_error, CliError};
use crate::io::read_file;

pub const CONFIG_FILE: &str = "kiln.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KilnConfig {
    #[serde(default)]
    pub codegen: CodegenOptions,
}

/// Loads `explicit`, or `kiln.toml` next to the manifest when present, or the defaults.
pub fn load_config(explicit: Option<&Path>, manifest: &Path) -> Result<KilnConfig, CliError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let beside = manifest.parent().map_or_else(|| PathBuf::from(CONFIG_FILE), |dir| dir.join(CONFIG_FILE));
            if !beside.is_file() {
                log::debug!("No {CONFIG_FILE} found, using default options");
                return Ok(KilnConfig::default());
            }
            beside
        }
    };
    let source = read_file(&path)?;
    let config = toml::from_str(&source).map_err(|e| convert_toml_error(e, "configuration", &path, &source))?;
    log::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Reads a kernel manifest.
pub fn load_manifest(path: &Path) -> Result<IrModule, CliError> {
    let source = read_file(path)?;
    let module: IrModule =
        toml::from_str(&source).map_err(|e| convert_toml_error(e, "kernel manifest", path, &source))?;
    if module.functions.is_empty() {
        return Err(CliError::EmptyManifest { path: path.to_path_buf() });
    }
    Ok(module)
}

/// Options of a session, named after the manifest unless the configuration names the module.
pub fn session_options(config: KilnConfig, manifest: &Path) -> CodegenOptions {
    let mut options = config.codegen;
    if options.module_name == CodegenOptions::default().module_name {
        if let Some(stem) = manifest.file_stem().and_then(|stem| stem.to_str()) {
            options.module_name = stem.to_string();
        }
    }
    options
}
