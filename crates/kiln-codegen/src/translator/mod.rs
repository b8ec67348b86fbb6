//! Lowering of IR function bodies into Cranelift functions.
//!
//! Every function the backend emits, whether an IR function or a helper outlined from one
//! (parallel lambdas, compute scopes, static-init callbacks, handle resolvers), is built by
//! `build_function` through its own `FunctionTranslator`. Creating a translator pushes a frame
//! on the session; dropping it pops the frame, so the enclosing context is back in place on
//! every exit path.

mod call;
mod closure;
mod compute_scope;
mod expr;
mod fields;
mod handles;
mod helpers;
mod intrinsics;
mod parallel;
mod static_init;
mod stmt;

use cranelift_codegen::ir::{types, FuncRef, Function, GlobalValue, Signature, Type, UserFuncName, Value};
use cranelift_frontend::FunctionBuilderContext;
use cranelift_module::{DataId, FuncId, Module};
use kiln_tir::{DataType, PrimFunc, Var};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::abi;
use crate::emit::FuncEmitter;
use crate::session::{CodeGenCpu, Frame};
use crate::{CodegenError, Result};

pub(crate) use parallel::ParallelEnv;

/// Analysis facts a nested function inherits from the function it was outlined from.
#[derive(Debug, Clone, Default)]
pub(crate) struct Scope {
    /// Body runs inside a parallel launch.
    pub parallel: bool,
    pub alias_vars: FxHashSet<Var>,
    /// Known alignment of buffers, from allocations.
    pub storage_align: FxHashMap<Var, u32>,
}

pub(crate) struct FunctionTranslator<'s, 'e, 'b, M: Module> {
    pub(crate) session: &'s mut CodeGenCpu<M>,
    pub(crate) emitter: &'e mut FuncEmitter<'b>,
    pub(crate) func_name: String,
    pub(crate) parallel_env: Option<ParallelEnv>,
    pub(crate) scope: Scope,
    vars: FxHashMap<Var, Value>,
    func_refs: FxHashMap<FuncId, FuncRef>,
    data_refs: FxHashMap<DataId, GlobalValue>,
}

impl<'s, 'e, 'b, M: Module> FunctionTranslator<'s, 'e, 'b, M> {
    fn new(
        session: &'s mut CodeGenCpu<M>,
        emitter: &'e mut FuncEmitter<'b>,
        name: &str,
        scope: Scope,
    ) -> Self {
        session.push_frame(Frame { name: name.to_string(), parallel: scope.parallel });
        log::debug!("Lowering {name}");
        FunctionTranslator {
            session,
            emitter,
            func_name: name.to_string(),
            parallel_env: None,
            scope,
            vars: FxHashMap::default(),
            func_refs: FxHashMap::default(),
            data_refs: FxHashMap::default(),
        }
    }

    pub(crate) fn bind(&mut self, var: &Var, value: Value) -> Option<Value> {
        self.vars.insert(var.clone(), value)
    }

    /// Undoes a `bind`, restoring whatever the variable was bound to before.
    pub(crate) fn restore(&mut self, var: &Var, previous: Option<Value>) {
        match previous {
            Some(value) => {
                self.vars.insert(var.clone(), value);
            }
            None => {
                self.vars.remove(var);
            }
        }
    }

    /// Runs `f` with `var` bound to `value`.
    pub(crate) fn with_binding<R>(
        &mut self,
        var: &Var,
        value: Value,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        let previous = self.bind(var, value);
        let result = f(self);
        self.restore(var, previous);
        result
    }

    pub(crate) fn lookup(&self, var: &Var) -> Result<Value> {
        self.vars.get(var).copied().ok_or_else(|| CodegenError::UnboundVariable {
            func: self.func_name.clone(),
            var: var.name.clone(),
        })
    }

    /// Cranelift type of a scalar value; vectors and `float16` are rejected.
    pub(crate) fn clif_type(&self, dtype: DataType) -> Result<Type> {
        abi::clif_type(dtype, self.session.pointer_type).ok_or_else(|| CodegenError::UnsupportedType {
            func: self.func_name.clone(),
            dtype,
        })
    }

    pub(crate) fn func_ref(&mut self, id: FuncId) -> FuncRef {
        if let Some(func_ref) = self.func_refs.get(&id) {
            return *func_ref;
        }
        let func_ref = self.session.module.declare_func_in_func(id, self.emitter.func());
        self.func_refs.insert(id, func_ref);
        func_ref
    }

    pub(crate) fn data_ref(&mut self, id: DataId) -> GlobalValue {
        if let Some(gv) = self.data_refs.get(&id) {
            return *gv;
        }
        let gv = self.session.module.declare_data_in_func(id, self.emitter.func());
        self.data_refs.insert(id, gv);
        gv
    }
}

impl<M: Module> Drop for FunctionTranslator<'_, '_, '_, M> {
    fn drop(&mut self) {
        self.session.pop_frame();
    }
}

/// Builds and defines one function.
///
/// `lower` receives the entry block parameters; if it falls off the end, the function
/// returns 0.
pub(crate) fn build_function<M, F>(
    session: &mut CodeGenCpu<M>,
    id: FuncId,
    name: &str,
    signature: Signature,
    scope: Scope,
    lower: F,
) -> Result<()>
where
    M: Module,
    F: FnOnce(&mut FunctionTranslator<'_, '_, '_, M>, &[Value]) -> Result<()>,
{
    let mut func = Function::with_name_signature(UserFuncName::user(0, id.as_u32()), signature);
    let mut fctx = FunctionBuilderContext::new();
    let mut emitter = FuncEmitter::new(&mut func, &mut fctx, session.pointer_type);
    {
        let mut translator = FunctionTranslator::new(session, &mut emitter, name, scope);
        let params = translator.emitter.params();
        lower(&mut translator, &params)?;
        let zero = translator.emitter.iconst(types::I32, 0);
        translator.emitter.ret(&[zero]);
    }
    emitter.finish();
    session.define_function(id, name, func)
}

/// Lowers an IR function declared with `CodeGenCpu::declare_function`.
pub(crate) fn lower_function<M: Module>(
    session: &mut CodeGenCpu<M>,
    func: &PrimFunc,
    id: FuncId,
) -> Result<()> {
    let signature = session.signature_of(func)?;
    let scope = Scope {
        alias_vars: func.attrs.alias_vars.iter().cloned().collect(),
        ..Scope::default()
    };
    build_function(session, id, func.symbol(), signature, scope, |t, params| {
        for (var, value) in func.params.iter().zip(params) {
            t.bind(var, *value);
        }
        t.lower_stmt(&func.body)
    })
}
