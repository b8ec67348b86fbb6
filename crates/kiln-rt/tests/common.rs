// Shared helpers for runtime integration tests

#![allow(dead_code)]

use kiln_codegen::CodegenOptions;
use kiln_rt::{compile_and_load, LoadedModule};
use kiln_tir::{attr, DataType, Expr, ForKind, PrimFunc, Stmt, Var};

pub type Kernel = extern "C" fn(*mut i32, i32) -> i32;
pub type StackKernel = extern "C" fn(*mut kiln_rt::FfiAny) -> i32;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn options(module_name: &str) -> CodegenOptions {
    CodegenOptions { module_name: module_name.to_string(), verify: true, ..CodegenOptions::default() }
}

pub fn load(functions: &[PrimFunc], symbols: &[(&str, *const u8)]) -> LoadedModule {
    load_with(functions, options("e2e"), symbols)
}

pub fn load_with(functions: &[PrimFunc], options: CodegenOptions, symbols: &[(&str, *const u8)]) -> LoadedModule {
    init_logging();
    let symbols: Vec<(String, *const u8)> =
        symbols.iter().map(|(name, ptr)| (name.to_string(), *ptr)).collect();
    compile_and_load(functions, options, &symbols).unwrap()
}

pub fn out() -> Var {
    Var::handle("out")
}

pub fn n() -> Var {
    Var::int32("n")
}

pub fn i() -> Var {
    Var::int32("i")
}

pub fn stack() -> Var {
    Var::handle("stack")
}

/// `out[i] = value` for every `i` in `[0, n)`, as a loop of `kind`.
pub fn fill_loop(kind: ForKind, value: Expr) -> Stmt {
    Stmt::for_loop(&i(), Expr::var(&n()), kind, Stmt::store(&out(), Expr::var(&i()), value))
}

/// Wraps `body` in a thread-pool launch.
pub fn launch(body: Stmt) -> Stmt {
    Stmt::attr(attr::PRAGMA_PARALLEL_LAUNCH_POINT, Expr::int32(0), body)
}

/// An exported function over `out` and `n`.
pub fn kernel(name: &str, body: Stmt) -> PrimFunc {
    PrimFunc::new(name, vec![out(), n()], body).exported()
}

/// An exported function over a stack of tagged values.
pub fn stack_kernel(name: &str, body: Stmt) -> PrimFunc {
    PrimFunc::new(name, vec![stack()], body).exported()
}

/// `call_extern(int32, name, args)` as a statement.
pub fn extern_call(name: &str, args: Vec<Expr>) -> Stmt {
    Stmt::evaluate(Expr::call_extern(DataType::int32(), name, args))
}
