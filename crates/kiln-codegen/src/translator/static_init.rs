// One-time initialization regions and static handle cells.

use cranelift_codegen::ir::{types, Value};
use cranelift_module::Module;
use kiln_tir::{analysis, Expr, Stmt};

use super::{build_function, FunctionTranslator, Scope};
use crate::abi::{self, RUN_ONCE_SYMBOL};
use crate::{CodegenError, Result};

impl<M: Module> FunctionTranslator<'_, '_, '_, M> {
    /// Runs `body` once per module through the run-once entry named by `entry`.
    pub(crate) fn lower_static_init(&mut self, entry: &Expr, body: &Stmt) -> Result<()> {
        if self.parallel_env.is_some() || self.session.in_parallel_env() {
            return Err(CodegenError::StaticInitInParallelEnv { func: self.func_name.clone() });
        }
        let entry = entry.as_str().ok_or_else(|| CodegenError::ExpectedString {
            func: self.func_name.clone(),
            construct: "coproc_uop_scope",
        })?;
        let entry = if entry.is_empty() { RUN_ONCE_SYMBOL } else { entry };

        let vars = analysis::undefined_vars(body, &[]);
        let callback_name = self.session.fresh_name("static_init");
        let closure = self.pack_closure(&format!("closure_{callback_name}"), &vars)?;

        let ptr = self.emitter.pointer_type();
        let sig = abi::static_init_callback_signature(ptr, self.session.call_conv);
        let callback = self.session.declare_local_function(&callback_name, &sig)?;
        let layout = closure.layout.clone();
        let scope = Scope { parallel: false, ..self.scope.clone() };
        build_function(&mut *self.session, callback, &callback_name, sig, scope, |t, params| {
            t.unpack_closure(layout.as_ref(), params[0], &vars)?;
            t.lower_stmt(body)
        })?;
        log::debug!("Emitted static init {callback_name} through {entry}");

        let cell = self.static_handle()?;
        let callback = self.function_addr(callback);
        let nbytes = self.emitter.iconst(types::I32, i64::from(closure.nbytes));
        let init_sig = abi::static_init_signature(ptr, self.session.call_conv);
        let status = match self.call_import(entry, &init_sig, &[cell, callback, closure.data, nbytes])? {
            Some(status) => status,
            None => self.emitter.iconst(types::I32, 0),
        };
        self.check_call_success(status);
        Ok(())
    }

    /// Address of a fresh module-private pointer cell, null until first written.
    pub(crate) fn static_handle(&mut self) -> Result<Value> {
        let cell = self.session.new_static_cell()?;
        Ok(self.data_addr(cell))
    }
}
