use crate::{DataType, Stmt, Var};
use serde::{Deserialize, Serialize};

fn default_ret_type() -> DataType {
    DataType::int32()
}

/// Function-level attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FuncAttrs {
    /// Exported symbol name; functions without one are module-local.
    #[serde(default)]
    pub global_symbol: Option<String>,
    /// Handle variables that may alias another buffer of the function.
    #[serde(default)]
    pub alias_vars: Vec<Var>,
}

/// A lowered tensor function, ready for code generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimFunc {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Var>,
    pub body: Stmt,
    #[serde(default = "default_ret_type")]
    pub ret_type: DataType,
    #[serde(default)]
    pub attrs: FuncAttrs,
}

impl PrimFunc {
    pub fn new(name: impl Into<String>, params: Vec<Var>, body: Stmt) -> Self {
        PrimFunc {
            name: name.into(),
            params,
            body,
            ret_type: default_ret_type(),
            attrs: FuncAttrs::default(),
        }
    }

    /// Marks the function as exported under its own name.
    pub fn exported(mut self) -> Self {
        self.attrs.global_symbol = Some(self.name.clone());
        self
    }

    /// Name the function is emitted under.
    pub fn symbol(&self) -> &str {
        self.attrs.global_symbol.as_deref().unwrap_or(&self.name)
    }
}

/// A set of functions compiled into one native module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IrModule {
    #[serde(default, rename = "function")]
    pub functions: Vec<PrimFunc>,
}
