use crate::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A named IR variable.
///
/// Variables are identified by name: a `PrimFunc` must not bind two different variables under
/// the same name. The data type travels with every reference so lowering never needs a
/// separate symbol table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Var {
    pub name: String,
    pub dtype: DataType,
}

impl Var {
    pub fn new(name: impl Into<String>, dtype: DataType) -> Self {
        Var { name: name.into(), dtype }
    }

    pub fn handle(name: impl Into<String>) -> Self {
        Self::new(name, DataType::handle())
    }

    pub fn int32(name: impl Into<String>) -> Self {
        Self::new(name, DataType::int32())
    }
}

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Var {}

impl Hash for Var {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
