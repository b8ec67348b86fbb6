//! Loop-level tensor IR consumed by the kiln CPU backend.
//!
//! Only the node types the backend lowers live here; construction and optimization passes sit
//! upstream and hand over finished `PrimFunc`s.

pub mod analysis;
pub mod attr;
mod builtin;
mod dtype;
mod error;
mod expr;
mod func;
mod printer;
mod stmt;
mod var;

pub use analysis::{contains_parallel_loop, undefined_vars, undefined_vars_expr};
pub use builtin::{Builtin, StructField};
pub use dtype::{DataType, TypeCode};
pub use error::TirError;
pub use expr::{BinaryOp, CmpOp, Expr};
pub use func::{FuncAttrs, IrModule, PrimFunc};
pub use stmt::{ForKind, Stmt};
pub use var::Var;
