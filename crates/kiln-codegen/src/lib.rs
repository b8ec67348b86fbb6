//! CPU code generation for kiln tensor IR.
//!
//! Lowers `kiln_tir::PrimFunc`s to Cranelift, either into executable memory (`compile_jit`) or a
//! relocatable object (`compile_object`). Calls across the packed-function ABI, parallel
//! launches, struct field access and one-time initialization are expressed as calls into the
//! runtime entry points listed in [`abi::RuntimeFn`].

pub mod abi;
pub mod backend;
pub mod debug;
pub mod emit;
pub mod error;
pub mod options;
pub mod session;
mod translator;

// --- Exports ---
pub use abi::RuntimeFn;
pub use backend::{
    build_isa, compile_jit, compile_object, lower_module, CompiledFunction, JitArtifact,
    ObjectArtifact,
};
pub use error::{CodegenError, Result};
pub use options::{CodegenOptions, OptLevel, RuntimeBinding};
pub use session::{CodeGenCpu, ExportedSymbol, FunctionAttrs, SessionOutput};
