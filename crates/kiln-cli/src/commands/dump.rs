use crate::config::{load_config, load_manifest, session_options};
use crate::error::CliError;
use kiln_codegen::compile_object;
use std::path::Path;

pub fn handle_dump(manifest: &Path, config: Option<&Path>, function: Option<&str>) -> Result<(), CliError> {
    let module = load_manifest(manifest)?;
    let mut options = session_options(load_config(config, manifest)?, manifest);
    options.clif_dump = true;

    let artifact = compile_object(&module.functions, options)?;
    for (name, text) in &artifact.clif {
        if function.is_some_and(|wanted| wanted != name) {
            continue;
        }
        println!("; {name}");
        println!("{text}");
    }
    Ok(())
}
