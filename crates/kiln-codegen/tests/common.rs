// Common kernel builders for code generation integration tests

#![allow(dead_code)]

use kiln_codegen::CodegenOptions;
use kiln_tir::{attr, DataType, Expr, ForKind, PrimFunc, Stmt, StructField, Var};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// Host options that keep the CLIF text of every function
pub fn test_options() -> CodegenOptions {
    CodegenOptions {
        module_name: "test_module".to_string(),
        verify: true,
        clif_dump: true,
        ..CodegenOptions::default()
    }
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

/// `out[i] = value` for every `i` in `[0, n)`, as a loop of `kind`.
pub fn fill_loop(kind: ForKind, value: Expr) -> Stmt {
    Stmt::for_loop(&i(), Expr::var(&n()), kind, Stmt::store(&out(), Expr::var(&i()), value))
}

/// `fill(out, n)`: parallel fill of `out[i] = i` inside a launch.
pub fn parallel_fill() -> PrimFunc {
    let body = Stmt::attr(
        attr::PRAGMA_PARALLEL_LAUNCH_POINT,
        Expr::int32(0),
        fill_loop(ForKind::Parallel, Expr::var(&i())),
    );
    PrimFunc::new("fill", vec![out(), n()], body).exported()
}

/// `stride_fill(out, n)`: like `parallel_fill`, with stride partitioning.
pub fn stride_fill() -> PrimFunc {
    let body = Stmt::attr(
        attr::PRAGMA_PARALLEL_LAUNCH_POINT,
        Expr::int32(0),
        Stmt::attr(
            attr::PRAGMA_PARALLEL_STRIDE_PATTERN,
            Expr::int32(1),
            fill_loop(ForKind::Parallel, Expr::var(&i())),
        ),
    );
    PrimFunc::new("stride_fill", vec![out(), n()], body).exported()
}

/// `call_twice(stack)`: two packed calls of `callee` over `stack[0..1]`.
pub fn packed_call_twice(callee: &str) -> PrimFunc {
    let stack = Var::handle("stack");
    let call = Stmt::evaluate(Expr::call_packed(DataType::int64(), callee, &stack, 0, 1));
    PrimFunc::new("call_twice", vec![stack], Stmt::seq(vec![call.clone(), call])).exported()
}

/// `scale(out, n)`: doubles the index into `out` inside an outlined compute scope.
pub fn compute_scope_scale() -> PrimFunc {
    let value = Expr::mul(Expr::var(&i()), Expr::int32(2));
    let body = Stmt::attr(
        attr::COMPUTE_SCOPE,
        Expr::str("scale_compute_"),
        fill_loop(ForKind::Serial, value),
    );
    PrimFunc::new("scale", vec![out(), n()], body).exported()
}

/// `init_once(out)`: writes 42 to `out[0]` the first time any caller runs it.
pub fn static_init_once() -> PrimFunc {
    let body = Stmt::attr(
        attr::COPROC_UOP_SCOPE,
        Expr::str(""),
        Stmt::store(&out(), Expr::int32(0), Expr::int32(42)),
    );
    PrimFunc::new("init_once", vec![out()], body).exported()
}

/// `set_flag(stack)`: stores `true` in the payload of `stack[0]`.
pub fn set_bool_payload() -> PrimFunc {
    let stack = Var::handle("stack");
    let body = Stmt::evaluate(Expr::struct_set(
        Expr::var(&stack),
        0,
        StructField::AnyUnionValue,
        Expr::bool(true),
    ));
    PrimFunc::new("set_flag", vec![stack], body).exported()
}

/// Wraps `body` in a function over `out` and `n`.
pub fn kernel(name: &str, body: Stmt) -> PrimFunc {
    PrimFunc::new(name, vec![out(), n()], body).exported()
}

/// The CLIF text recorded for `name`.
pub fn clif_of<'a>(clif: &'a [(String, String)], name: &str) -> &'a str {
    clif.iter()
        .find(|(func, _)| func == name)
        .map(|(_, text)| text.as_str())
        .unwrap_or_else(|| panic!("no CLIF recorded for {name}"))
}
