use serde::{Deserialize, Serialize};

/// Name of the module context global, before the system library prefix.
pub const MODULE_CTX_SYMBOL: &str = "__kiln_ffi__library_ctx";

/// Cranelift optimization level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    None,
    #[default]
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    pub fn as_setting(&self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

/// How generated code reaches the runtime entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeBinding {
    /// Entry points are imported by name and bound by the linker.
    DirectImport,
    /// Entry points are called through pointer-sized globals the module loader fills.
    ContextSlots,
}

/// Options of one code generation session.
///
/// Loaded from the `[codegen]` table of `kiln.toml`; every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodegenOptions {
    pub module_name: String,
    /// `"host"` or a target triple.
    pub target: String,
    pub opt_level: OptLevel,
    /// Build a system library: symbols are registered with the runtime at startup.
    pub system_lib_prefix: Option<String>,
    /// Import runtime entry points directly instead of through context slots.
    pub dynamic_lookup: bool,
    /// The module is linked against the C runtime, which does its own registration.
    pub target_c_runtime: bool,
    pub debug_info: bool,
    /// Name of the function recorded in `__kiln_module_main`.
    pub emit_main: Option<String>,
    /// Run the Cranelift verifier on every function.
    pub verify: bool,
    /// Keep the CLIF text of every defined function.
    pub clif_dump: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions {
            module_name: "default".to_string(),
            target: "host".to_string(),
            opt_level: OptLevel::default(),
            system_lib_prefix: None,
            dynamic_lookup: false,
            target_c_runtime: false,
            debug_info: false,
            emit_main: None,
            verify: cfg!(debug_assertions),
            clif_dump: false,
        }
    }
}

impl CodegenOptions {
    pub fn runtime_binding(&self) -> RuntimeBinding {
        if self.dynamic_lookup || self.system_lib_prefix.is_some() {
            RuntimeBinding::DirectImport
        } else {
            RuntimeBinding::ContextSlots
        }
    }

    /// Whether the module registers its exported symbols with the runtime on startup.
    pub fn registers_system_symbols(&self) -> bool {
        self.system_lib_prefix.is_some() && !self.target_c_runtime
    }

    pub fn module_ctx_symbol(&self) -> String {
        format!("{}{}", self.system_lib_prefix.as_deref().unwrap_or(""), MODULE_CTX_SYMBOL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_follows_lookup_flags() {
        let mut options = CodegenOptions::default();
        assert_eq!(options.runtime_binding(), RuntimeBinding::ContextSlots);
        assert!(!options.registers_system_symbols());

        options.system_lib_prefix = Some("demo_".to_string());
        assert_eq!(options.runtime_binding(), RuntimeBinding::DirectImport);
        assert!(options.registers_system_symbols());
        assert_eq!(options.module_ctx_symbol(), "demo___kiln_ffi__library_ctx");

        options.target_c_runtime = true;
        assert!(!options.registers_system_symbols());
    }

    #[test]
    fn parses_codegen_table() {
        let options: CodegenOptions = toml::from_str(
            r#"
            module_name = "kernels"
            opt_level = "none"
            system_lib_prefix = "k_"
            debug_info = true
            "#,
        )
        .unwrap();
        assert_eq!(options.module_name, "kernels");
        assert_eq!(options.opt_level, OptLevel::None);
        assert_eq!(options.system_lib_prefix.as_deref(), Some("k_"));
        assert!(options.debug_info);
        assert_eq!(options.target, "host");
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(toml::from_str::<CodegenOptions>("threads = 4").is_err());
    }
}
