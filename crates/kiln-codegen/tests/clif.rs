use kiln_codegen::{compile_object, CodegenOptions, FunctionAttrs};
use kiln_tir::{attr, DataType, Expr, ForKind, PrimFunc, Stmt, Var};

mod common;
use common::*;

fn names(clif: &[(String, String)]) -> Vec<&str> {
    clif.iter().map(|(name, _)| name.as_str()).collect()
}

#[test]
fn test_packed_calls_share_one_handle_resolver() {
    init_logging();
    let artifact = compile_object(&[packed_call_twice("add_one")], test_options()).unwrap();
    let names = names(&artifact.clif);
    let resolvers: Vec<_> = names.iter().filter(|name| name.starts_with(".kiln_resolve.")).collect();
    assert_eq!(resolvers, vec![&".kiln_resolve.add_one"]);

    let caller = clif_of(&artifact.clif, "call_twice");
    assert_eq!(caller.matches("call_indirect").count(), 2, "{caller}");
}

#[test]
fn test_resolver_looks_up_through_module_context() {
    let artifact = compile_object(&[packed_call_twice("add_one")], test_options()).unwrap();
    let resolver = clif_of(&artifact.clif, ".kiln_resolve.add_one");
    // Lookup status is checked before the handle is cached.
    assert!(resolver.contains("icmp_imm eq"), "{resolver}");
    assert!(resolver.contains("store"), "{resolver}");
}

#[test]
fn test_direct_imports_when_lookup_is_dynamic() {
    let options = CodegenOptions { dynamic_lookup: true, ..test_options() };
    let artifact = compile_object(&[packed_call_twice("add_one")], options).unwrap();
    let caller = clif_of(&artifact.clif, "call_twice");
    assert!(!caller.contains("call_indirect"), "{caller}");
}

#[test]
fn test_parallel_launch_outlines_a_lambda() {
    let artifact = compile_object(&[parallel_fill()], test_options()).unwrap();
    let names = names(&artifact.clif);
    assert!(names.contains(&"fill_parallel_lambda0"), "{names:?}");

    let lambda = clif_of(&artifact.clif, "fill_parallel_lambda0");
    // Block partition: ceil(n / num_task) per task, clamped to n.
    assert!(lambda.contains("sdiv"), "{lambda}");
    assert_eq!(lambda.matches("smin").count(), 2, "{lambda}");

    let stride = compile_object(&[stride_fill()], test_options()).unwrap();
    let lambda = clif_of(&stride.clif, "stride_fill_parallel_lambda0");
    assert!(!lambda.contains("sdiv"), "{lambda}");
}

#[test]
fn test_parallel_loop_outside_launch_launches_itself() {
    let func = kernel("self_launch", fill_loop(ForKind::Parallel, Expr::var(&i())));
    let artifact = compile_object(&[func], test_options()).unwrap();
    assert!(names(&artifact.clif).contains(&"self_launch_parallel_lambda0"));
}

#[test]
fn test_compute_scope_is_outlined_with_attributes() {
    let artifact = compile_object(&[compute_scope_scale()], test_options()).unwrap();
    assert!(names(&artifact.clif).contains(&"scale_compute_"));
    // Free variables in first-use order: n, out.
    let attrs = &artifact.func_attrs["scale_compute_"];
    assert_eq!(
        attrs,
        &FunctionAttrs { noinline: true, noalias_params: vec![1], param_align: vec![] }
    );
}

#[test]
fn test_compute_scope_respects_alias_info_and_allocations() {
    let buf = Var::handle("buf");
    let scope = Stmt::attr(
        attr::COMPUTE_SCOPE,
        Expr::str("copy_compute_"),
        Stmt::store(&buf, Expr::int32(0), Expr::load(DataType::float(32), &out(), Expr::int32(0))),
    );
    let body = Stmt::Allocate {
        buffer_var: buf.clone(),
        dtype: DataType::float(32),
        extent: 16,
        alignment: Some(64),
        body: Box::new(scope),
    };
    let mut func = kernel("copy", body);
    func.attrs.alias_vars.push(out());

    let artifact = compile_object(&[func], test_options()).unwrap();
    let attrs = &artifact.func_attrs["copy_compute_"];
    // Parameters are (buf, out); out may alias.
    assert_eq!(attrs.noalias_params, vec![0]);
    assert_eq!(attrs.param_align, vec![(0, 16)]);
}

#[test]
fn test_static_init_emits_callback() {
    let artifact = compile_object(&[static_init_once()], test_options()).unwrap();
    assert!(names(&artifact.clif).contains(&"init_once_static_init0"));
    let caller = clif_of(&artifact.clif, "init_once");
    assert!(caller.contains("call fn"), "{caller}");
}

#[test]
fn test_bool_payload_clears_the_slot_first() {
    let artifact = compile_object(&[set_bool_payload()], test_options()).unwrap();
    let text = clif_of(&artifact.clif, "set_flag");
    let zero = text.find("iconst.i64 0").expect("payload slot should be cleared");
    assert!(text[zero..].matches("store").count() >= 2, "{text}");
}

#[test]
fn test_assert_raises_runtime_error() {
    let check = Stmt::assert(
        Expr::cmp(kiln_tir::CmpOp::Gt, Expr::var(&n()), Expr::int32(0)),
        "n must be positive",
        Stmt::nop(),
    );
    let artifact = compile_object(&[kernel("checked", check)], test_options()).unwrap();
    let text = clif_of(&artifact.clif, "checked");
    assert!(text.contains("cold"), "{text}");
}

#[test]
fn test_unknown_pragma_lowers_body() {
    let body = Stmt::attr("pragma_unroll_hint", Expr::int32(4), fill_loop(ForKind::Serial, Expr::int32(1)));
    let artifact = compile_object(&[kernel("hinted", body)], test_options()).unwrap();
    assert!(clif_of(&artifact.clif, "hinted").contains("store"));
}

#[test]
fn test_import_object_is_recorded() {
    let body = Stmt::attr(attr::PRAGMA_IMPORT_OBJECT, Expr::str("vendor/blas.o"), Stmt::nop());
    let artifact = compile_object(&[kernel("linked", body)], test_options()).unwrap();
    assert_eq!(artifact.link_inputs, vec!["vendor/blas.o".to_string()]);
}

#[test]
fn test_no_clif_without_dump() {
    let options = CodegenOptions { clif_dump: false, ..test_options() };
    let funcs: Vec<PrimFunc> = vec![parallel_fill()];
    let artifact = compile_object(&funcs, options).unwrap();
    assert!(artifact.clif.is_empty());
}
