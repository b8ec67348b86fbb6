use kiln_codegen::{compile_jit, CodegenOptions};
use kiln_rt::{load_jit, runtime_symbols, system_lib_symbol, RuntimeError};
use kiln_tir::{attr, DataType, Expr, ForKind, Stmt, Var};

mod common;
use common::*;

#[test]
fn test_static_init_runs_once_per_module() {
    let body = Stmt::attr(
        attr::COPROC_UOP_SCOPE,
        Expr::str(""),
        Stmt::store(&out(), Expr::int32(0), Expr::int32(42)),
    );
    let module = load(&[kernel("init_once", body)], &[]);
    let init_once: Kernel = unsafe { module.get("init_once").unwrap() };

    let mut first = [0i32; 1];
    let mut second = [0i32; 1];
    assert_eq!(init_once(first.as_mut_ptr(), 1), 0);
    assert_eq!(init_once(second.as_mut_ptr(), 1), 0);
    assert_eq!(first[0], 42);
    assert_eq!(second[0], 0);
}

#[test]
fn test_compute_scope_is_called_with_its_variables() {
    let value = Expr::mul(Expr::var(&i()), Expr::int32(2));
    let body = Stmt::attr(attr::COMPUTE_SCOPE, Expr::str("scale_compute_"), fill_loop(ForKind::Serial, value));
    let module = load(&[kernel("scale", body)], &[]);
    let scale: Kernel = unsafe { module.get("scale").unwrap() };

    let mut data = [0i32; 5];
    assert_eq!(scale(data.as_mut_ptr(), 5), 0);
    assert_eq!(data, [0, 2, 4, 6, 8]);
    assert!(module.artifact().func_attrs()["scale_compute_"].noinline);
}

#[test]
fn test_system_lib_registers_its_exports() {
    let options = CodegenOptions { system_lib_prefix: Some("sys_".to_string()), ..options("sys") };
    let body = fill_loop(ForKind::Serial, Expr::int32(3));
    let module = load_with(&[kernel("sys_fill", body)], options, &[]);
    let fill = module.artifact().get_function_ptr("sys_fill").unwrap();

    assert_eq!(system_lib_symbol("sys_fill"), Some(fill.cast()));
    assert!(system_lib_symbol("__kiln_ffi__library_ctx").is_some());

    let sys_fill: Kernel = unsafe { module.get("sys_fill").unwrap() };
    let mut data = [0i32; 2];
    assert_eq!(sys_fill(data.as_mut_ptr(), 2), 0);
    assert_eq!(data, [3, 3]);
}

#[test]
fn test_workspace_through_context_slots() {
    let ws = Var::handle("ws");
    let alloc = Expr::call_extern(
        DataType::handle(),
        "kiln_backend_alloc_workspace",
        vec![Expr::int32(1), Expr::int32(0), Expr::int64(64), Expr::int32(2), Expr::int32(32)],
    );
    let body = Stmt::let_stmt(
        &ws,
        alloc,
        Stmt::seq(vec![
            Stmt::store(&ws, Expr::int32(3), Expr::int32(5)),
            Stmt::store(
                &out(),
                Expr::int32(0),
                Expr::add(Expr::load(DataType::int32(), &ws, Expr::int32(3)), Expr::int32(1)),
            ),
            extern_call("kiln_backend_free_workspace", vec![Expr::int32(1), Expr::int32(0), Expr::var(&ws)]),
        ]),
    );
    let module = load(&[kernel("scratch", body)], &[]);
    let scratch: Kernel = unsafe { module.get("scratch").unwrap() };

    let mut data = [0i32; 1];
    assert_eq!(scratch(data.as_mut_ptr(), 1), 0);
    assert_eq!(data[0], 6);
}

#[test]
fn test_stack_allocation() {
    let buf = Var::handle("buf");
    let body = Stmt::allocate(
        &buf,
        DataType::int32(),
        4,
        Stmt::seq(vec![
            Stmt::for_loop(
                &i(),
                Expr::int32(4),
                ForKind::Serial,
                Stmt::store(&buf, Expr::var(&i()), Expr::mul(Expr::var(&i()), Expr::int32(3))),
            ),
            Stmt::store(&out(), Expr::int32(0), Expr::load(DataType::int32(), &buf, Expr::int32(3))),
        ]),
    );
    let module = load(&[kernel("local", body)], &[]);
    let local: Kernel = unsafe { module.get("local").unwrap() };

    let mut data = [0i32; 1];
    assert_eq!(local(data.as_mut_ptr(), 1), 0);
    assert_eq!(data[0], 9);
}

#[test]
fn test_main_entry() {
    let options = CodegenOptions { emit_main: Some("entry".to_string()), ..options("main") };
    let body = fill_loop(ForKind::Serial, Expr::int32(1));
    let module = load_with(&[kernel("entry", body)], options, &[]);
    let main: Kernel = unsafe { module.main().unwrap() };

    let mut data = [0i32; 3];
    assert_eq!(main(data.as_mut_ptr(), 3), 0);
    assert_eq!(data, [1, 1, 1]);

    let err = unsafe { module.get::<Kernel>("missing") }.unwrap_err();
    assert!(matches!(err, RuntimeError::EntryPointNotFound(name) if name == "missing"));
}

#[test]
fn test_unbound_context_slot_is_reported() {
    init_logging();
    let body = common::launch(fill_loop(ForKind::Parallel, Expr::var(&i())));
    let artifact = compile_jit(&[kernel("fill", body)], options("slots"), &runtime_symbols()).unwrap();

    let err = load_jit(artifact, "slots", &[]).unwrap_err();
    assert!(matches!(err, RuntimeError::MissingRuntimeSymbol(slot) if slot == "__kiln_backend_parallel_launch"));
}
