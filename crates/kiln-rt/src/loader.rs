//! Loading of JIT-compiled modules: runtime binding, module context and startup.

use crate::error::RuntimeError;
use crate::{last_error, parallel, registry, run_once, system_lib, workspace};
use kiln_codegen::abi::RUN_ONCE_SYMBOL;
use kiln_codegen::{compile_jit, CodegenOptions, JitArtifact, RuntimeFn};
use kiln_tir::PrimFunc;
use std::ffi::c_void;

/// Address of the runtime's implementation of `rt`.
pub fn runtime_symbol(rt: RuntimeFn) -> *const u8 {
    match rt {
        RuntimeFn::FfiFunctionCall => registry::kiln_ffi_function_call as *const u8,
        RuntimeFn::ErrorSetRaised => last_error::kiln_ffi_error_set_raised as *const u8,
        RuntimeFn::GetFuncFromEnv => registry::kiln_backend_get_func_from_env as *const u8,
        RuntimeFn::ParallelLaunch => parallel::kiln_backend_parallel_launch as *const u8,
        RuntimeFn::ParallelBarrier => parallel::kiln_backend_parallel_barrier as *const u8,
        RuntimeFn::RegisterSystemSymbol => {
            system_lib::kiln_backend_register_system_lib_symbol as *const u8
        }
        RuntimeFn::AllocWorkspace => workspace::kiln_backend_alloc_workspace as *const u8,
        RuntimeFn::FreeWorkspace => workspace::kiln_backend_free_workspace as *const u8,
    }
}

/// Every runtime entry point by symbol name, for modules that import them directly.
pub fn runtime_symbols() -> Vec<(String, *const u8)> {
    RuntimeFn::ALL
        .into_iter()
        .map(|rt| (rt.symbol().to_string(), runtime_symbol(rt)))
        .chain(std::iter::once((
            RUN_ONCE_SYMBOL.to_string(),
            run_once::kiln_backend_run_once as *const u8,
        )))
        .collect()
}

/// State a loaded module hands to the runtime as its module context.
#[derive(Debug)]
pub struct ModuleContext {
    pub name: String,
}

/// A JIT module whose runtime slots are bound and whose startup has run.
#[derive(Debug)]
pub struct LoadedModule {
    artifact: JitArtifact,
    // Referenced by the module context global for as long as the code can run.
    #[allow(dead_code)]
    context: Box<ModuleContext>,
}

impl LoadedModule {
    /// Typed pointer to the compiled function `name`.
    ///
    /// # Safety
    ///
    /// `F` must be an `extern "C"` function pointer type matching the compiled signature.
    pub unsafe fn get<F: Copy>(&self, name: &str) -> Result<F, RuntimeError> {
        self.artifact
            .get_function::<F>(name)
            .ok_or_else(|| RuntimeError::EntryPointNotFound(name.to_string()))
    }

    /// Typed pointer to the function recorded as the module's main entry.
    ///
    /// # Safety
    ///
    /// Same as [`LoadedModule::get`].
    pub unsafe fn main<F: Copy>(&self) -> Result<F, RuntimeError> {
        let entry = self
            .artifact
            .entry()
            .ok_or_else(|| RuntimeError::EntryPointNotFound("<main>".to_string()))?;
        self.get(entry)
    }

    pub fn artifact(&self) -> &JitArtifact {
        &self.artifact
    }
}

/// Binds a compiled module to this runtime and runs its startup routine.
///
/// Context slots are filled from `symbols` by entry point name.
pub fn load_jit(
    artifact: JitArtifact,
    name: &str,
    symbols: &[(String, *const u8)],
) -> Result<LoadedModule, RuntimeError> {
    for (rt, slot) in artifact.context_slots() {
        let ptr = symbols
            .iter()
            .find(|(symbol, _)| symbol == rt.symbol())
            .map(|(_, ptr)| *ptr)
            .ok_or_else(|| RuntimeError::MissingRuntimeSymbol(rt.slot_name()))?;
        // SAFETY: slots are pointer-sized writable globals of the finalized module.
        unsafe { slot.write(ptr) };
    }

    let mut context = Box::new(ModuleContext { name: name.to_string() });
    // SAFETY: the module context global is a pointer-sized writable slot.
    unsafe { artifact.module_ctx().write(&mut *context as *mut ModuleContext as *mut c_void) };

    if let Some(startup) = artifact.startup() {
        // SAFETY: the startup routine takes no arguments and returns nothing.
        let startup: extern "C" fn() = unsafe { std::mem::transmute(startup) };
        startup();
        if let Some(err) = last_error::take() {
            return Err(err.into());
        }
    }
    log::info!(
        "Loaded module {name} with {} context slots and {} exports",
        artifact.context_slots().len(),
        artifact.exports().len()
    );
    Ok(LoadedModule { artifact, context })
}

/// Compiles `functions` in-process and loads the result.
///
/// `extra_symbols` resolve extern calls and packed functions imported by name.
pub fn compile_and_load(
    functions: &[PrimFunc],
    options: CodegenOptions,
    extra_symbols: &[(String, *const u8)],
) -> Result<LoadedModule, RuntimeError> {
    let name = options.module_name.clone();
    let mut symbols = runtime_symbols();
    symbols.extend(extra_symbols.iter().cloned());
    let artifact = compile_jit(functions, options, &symbols)?;
    load_jit(artifact, &name, &symbols)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_runtime_entry_is_exported() {
        let symbols = runtime_symbols();
        assert_eq!(symbols.len(), RuntimeFn::ALL.len() + 1);
        for rt in RuntimeFn::ALL {
            assert!(symbols.iter().any(|(name, ptr)| name == rt.symbol() && !ptr.is_null()));
        }
        assert!(symbols.iter().any(|(name, _)| name == RUN_ONCE_SYMBOL));
    }
}
