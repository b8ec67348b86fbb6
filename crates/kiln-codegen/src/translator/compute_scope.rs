// Outlining of `compute_scope` bodies into their own functions.

use cranelift_codegen::ir::{types, Type};
use cranelift_module::Module;
use kiln_tir::{analysis, Expr, Stmt};

use super::{build_function, FunctionTranslator, Scope};
use crate::abi;
use crate::session::FunctionAttrs;
use crate::{CodegenError, Result};

impl<M: Module> FunctionTranslator<'_, '_, '_, M> {
    /// Moves `body` into a local function named by `name` and calls it in place.
    pub(crate) fn lower_compute_scope(&mut self, name: &Expr, body: &Stmt) -> Result<()> {
        let name = name
            .as_str()
            .ok_or_else(|| CodegenError::ExpectedString {
                func: self.func_name.clone(),
                construct: "compute_scope",
            })?
            .to_string();

        let vars = analysis::undefined_vars(body, &[]);
        let args = vars.iter().map(|var| self.lookup(var)).collect::<Result<Vec<_>>>()?;
        let param_types: Vec<Type> = args.iter().map(|v| self.emitter.value_type(*v)).collect();
        let sig = abi::status_signature(&param_types, self.session.call_conv);
        let id = self.session.declare_local_function(&name, &sig)?;

        let mut attrs = FunctionAttrs { noinline: true, ..FunctionAttrs::default() };
        for (index, var) in vars.iter().enumerate() {
            if var.dtype.is_handle() && !self.scope.alias_vars.contains(var) {
                attrs.noalias_params.push(index);
            }
            if let Some(align) = self.scope.storage_align.get(var).filter(|align| **align > 1) {
                attrs.param_align.push((index, *align));
            }
        }
        self.session.func_attrs.insert(name.clone(), attrs);
        self.session.debug.add_function(&name, &vars, true);

        let scope = Scope { parallel: false, ..self.scope.clone() };
        build_function(&mut *self.session, id, &name, sig, scope, |t, params| {
            for (var, value) in vars.iter().zip(params) {
                t.bind(var, *value);
            }
            t.lower_stmt(body)
        })?;
        log::debug!("Outlined compute scope {name} with {} parameters", vars.len());

        let status = match self.call_function(id, &args) {
            Some(status) => status,
            None => self.emitter.iconst(types::I32, 0),
        };
        self.check_call_success(status);
        Ok(())
    }
}
