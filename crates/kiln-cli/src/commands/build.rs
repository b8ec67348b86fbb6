use crate::config::{load_config, load_manifest, session_options};
use crate::error::CliError;
use crate::io::write_file;
use kiln_codegen::compile_object;
use std::path::{Path, PathBuf};

pub fn handle_build(manifest: &Path, config: Option<&Path>, output: Option<PathBuf>) -> Result<(), CliError> {
    let module = load_manifest(manifest)?;
    let options = session_options(load_config(config, manifest)?, manifest);
    let output = output.unwrap_or_else(|| manifest.with_extension("o"));
    println!("Building {} ({} functions, target {})", manifest.display(), module.functions.len(), options.target);

    let artifact = compile_object(&module.functions, options)?;
    write_file(&output, &artifact.bytes)?;
    println!("✅ Wrote {} ({} bytes)", output.display(), artifact.bytes.len());
    for input in &artifact.link_inputs {
        println!("   link with: {input}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
[[function]]
name = "iota"
params = [{ name = "out", dtype = "handle" }, { name = "n", dtype = "int32" }]
attrs = { global_symbol = "iota" }

[function.body.for]
loop_var = { name = "i", dtype = "int32" }
min = { int_imm = { dtype = "int32", value = 0 } }
extent = { var = { name = "n", dtype = "int32" } }
kind = "serial"

[function.body.for.body.store]
buffer = { name = "out", dtype = "handle" }
index = { var = { name = "i", dtype = "int32" } }
value = { var = { name = "i", dtype = "int32" } }
"#;

    #[test]
    fn build_writes_an_object_next_to_the_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("iota.toml");
        std::fs::write(&manifest, MANIFEST).unwrap();

        handle_build(&manifest, None, None).unwrap();
        let bytes = std::fs::read(dir.path().join("iota.o")).unwrap();
        assert!(bytes.windows(4).any(|window| window == b"iota"));
    }
}
