//! CPU runtime for modules produced by `kiln-codegen`.
//!
//! Provides the entry points generated code calls (packed calls, parallel launch, barriers,
//! run-once, workspace, system symbol registration) and a loader binding JIT modules to them.

pub mod abi;
pub mod error;
pub mod last_error;
pub mod loader;
pub mod parallel;
pub mod registry;
pub mod run_once;
pub mod system_lib;
pub mod workspace;

pub use abi::{ArrayDescriptor, Device, FfiAny, ParallelGroupEnv, PackedCFunc};
pub use error::{RaisedError, RuntimeError};
pub use loader::{compile_and_load, load_jit, runtime_symbols, LoadedModule};
pub use parallel::set_max_tasks;
pub use registry::{lookup_count, register_packed, FunctionHandle};
pub use system_lib::system_lib_symbol;
