use kiln_tir::{DataType, Expr, ForKind, IrModule, Stmt, Var};

const MANIFEST: &str = r#"
[[function]]
name = "iota"
params = [{ name = "out", dtype = "handle" }, { name = "n", dtype = "int32" }]
attrs = { global_symbol = "iota" }

[function.body.for]
loop_var = { name = "i", dtype = "int32" }
min = { int_imm = { dtype = "int32", value = 0 } }
extent = { var = { name = "n", dtype = "int32" } }
kind = "parallel"

[function.body.for.body.store]
buffer = { name = "out", dtype = "handle" }
index = { var = { name = "i", dtype = "int32" } }
value = { cast = { dtype = "float64", value = { var = { name = "i", dtype = "int32" } } } }
"#;

#[test]
fn test_manifest_deserializes_into_prim_funcs() {
    let module: IrModule = toml::from_str(MANIFEST).expect("manifest should parse");
    assert_eq!(module.functions.len(), 1);

    let func = &module.functions[0];
    assert_eq!(func.symbol(), "iota");
    assert_eq!(func.ret_type, DataType::int32());
    assert_eq!(func.params, vec![Var::handle("out"), Var::int32("n")]);

    let i = Var::int32("i");
    let out = Var::handle("out");
    let expected = Stmt::For {
        loop_var: i.clone(),
        min: Expr::int32(0),
        extent: Expr::var(&Var::int32("n")),
        kind: ForKind::Parallel,
        body: Box::new(Stmt::store(
            &out,
            Expr::var(&i),
            Expr::cast(DataType::float64(), Expr::var(&i)),
        )),
    };
    assert_eq!(func.body, expected);
}

#[test]
fn test_unknown_dtype_is_rejected() {
    let bad = r#"
[[function]]
name = "f"
params = [{ name = "x", dtype = "int3" }]
body = { seq = [] }
"#;
    assert!(toml::from_str::<IrModule>(bad).is_err());
}
