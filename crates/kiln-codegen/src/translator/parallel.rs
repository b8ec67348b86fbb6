// Parallel launches, per-task loop partitioning and barriers.

use cranelift_codegen::ir::{types, InstBuilder, Value};
use cranelift_module::Module;
use kiln_layout::field;
use kiln_tir::{analysis, DataType, Expr, Stmt, Var};

use super::{build_function, FunctionTranslator, Scope};
use crate::abi::{self, RuntimeFn};
use crate::{CodegenError, Result};

/// State of the parallel launch whose lambda is being lowered.
#[derive(Debug, Clone)]
pub(crate) struct ParallelEnv {
    pub task_id: Value,
    pub num_task: Value,
    /// Pointer to the runtime's `ParallelGroupEnv`.
    pub penv: Value,
    pub stride_pattern: bool,
    pub in_parallel_loop: bool,
    pub parallel_loop_count: usize,
}

impl<M: Module> FunctionTranslator<'_, '_, '_, M> {
    /// Outlines `body` into a lambda run by every task of a thread-pool launch.
    pub(crate) fn lower_parallel_launch(&mut self, body: &Stmt) -> Result<()> {
        if self.parallel_env.is_some() || self.session.in_parallel_env() {
            return Err(CodegenError::NestedParallelLoop { func: self.func_name.clone() });
        }
        let vars = analysis::undefined_vars(body, &[]);
        let lambda_name = self.session.fresh_name("parallel_lambda");
        let closure = self.pack_closure(&format!("closure_{lambda_name}"), &vars)?;

        let ptr = self.emitter.pointer_type();
        let sig = abi::parallel_lambda_signature(ptr, self.session.call_conv);
        let lambda = self.session.declare_local_function(&lambda_name, &sig)?;
        let num_task_offset = self.session.catalog.parallel_env.field(field::PENV_NUM_TASK)?.offset;
        let scope = Scope { parallel: true, ..self.scope.clone() };
        let layout = closure.layout.clone();

        build_function(&mut *self.session, lambda, &lambda_name, sig, scope, |t, params| {
            let (task_id, penv, cdata) = (params[0], params[1], params[2]);
            t.unpack_closure(layout.as_ref(), cdata, &vars)?;
            let num_task = t.emitter.load(types::I32, penv, num_task_offset as i32);
            t.parallel_env = Some(ParallelEnv {
                task_id,
                num_task,
                penv,
                stride_pattern: false,
                in_parallel_loop: false,
                parallel_loop_count: 0,
            });
            t.lower_stmt(body)?;
            let loops = t.parallel_env.as_ref().map_or(0, |env| env.parallel_loop_count);
            if loops == 0 {
                return Err(CodegenError::NoParallelLoopInLaunch { func: t.func_name.clone() });
            }
            Ok(())
        })?;
        log::debug!("Outlined parallel launch {lambda_name} capturing {} variables", vars.len());

        let entry = self.function_addr(lambda);
        let num_task = self.emitter.iconst(types::I32, 0);
        let status = self.call_runtime_status(RuntimeFn::ParallelLaunch, &[entry, closure.data, num_task])?;
        self.check_call_success(status);
        Ok(())
    }

    /// Lowers a parallel `For`: this task's share of the iterations inside a launch, or a
    /// launch of the whole loop outside one.
    pub(crate) fn lower_parallel_for(
        &mut self,
        stmt: &Stmt,
        loop_var: &Var,
        min: &Expr,
        extent: &Expr,
        body: &Stmt,
    ) -> Result<()> {
        if min.as_const_int() != Some(0) {
            return Err(CodegenError::NonZeroParallelMin { func: self.func_name.clone() });
        }
        let Some(env) = self.parallel_env.clone() else {
            return self.lower_parallel_launch(stmt);
        };
        if env.in_parallel_loop {
            return Err(CodegenError::NestedParallelLoop { func: self.func_name.clone() });
        }

        let dtype = loop_var.dtype;
        let ty = self.clif_type(dtype)?;
        let extent = self.lower_expr_as(extent, dtype)?;
        let task_id = self.convert(env.task_id, DataType::int32(), dtype)?;
        let num_task = self.convert(env.num_task, DataType::int32(), dtype)?;

        self.set_in_parallel_loop(true);
        let lowered = if env.stride_pattern {
            self.emit_serial_loop(loop_var, task_id, extent, num_task, body)
        } else {
            let one = self.emitter.iconst(ty, 1);
            let padded = self.emitter.ins().iadd(extent, num_task);
            let padded = self.emitter.ins().isub(padded, one);
            let step = self.emitter.ins().sdiv(padded, num_task);
            let begin = self.emitter.ins().imul(task_id, step);
            let begin = self.emitter.ins().smin(begin, extent);
            let next_task = self.emitter.ins().iadd(task_id, one);
            let end = self.emitter.ins().imul(next_task, step);
            let end = self.emitter.ins().smin(end, extent);
            self.emit_serial_loop(loop_var, begin, end, one, body)
        };
        self.set_in_parallel_loop(false);
        lowered?;

        if let Some(env) = self.parallel_env.as_mut() {
            env.parallel_loop_count += 1;
        }
        Ok(())
    }

    fn set_in_parallel_loop(&mut self, value: bool) {
        if let Some(env) = self.parallel_env.as_mut() {
            env.in_parallel_loop = value;
        }
    }

    /// Lowers `body`, then waits for every task of the launch.
    pub(crate) fn lower_parallel_barrier(&mut self, body: &Stmt) -> Result<()> {
        let Some(env) = self.parallel_env.clone() else {
            return Err(CodegenError::BarrierOutsideParallelEnv { func: self.func_name.clone() });
        };
        if env.in_parallel_loop {
            return Err(CodegenError::BarrierInParallelLoop { func: self.func_name.clone() });
        }
        self.lower_stmt(body)?;
        let status = self.call_runtime_status(RuntimeFn::ParallelBarrier, &[env.task_id, env.penv])?;
        self.check_call_success(status);
        Ok(())
    }

    /// Switches the following parallel loops of the launch to stride partitioning.
    pub(crate) fn lower_stride_pattern(&mut self, body: &Stmt) -> Result<()> {
        match self.parallel_env.as_mut() {
            Some(env) => env.stride_pattern = true,
            None => {
                return Err(CodegenError::StridePatternOutsideParallelEnv {
                    func: self.func_name.clone(),
                })
            }
        }
        self.lower_stmt(body)
    }
}
