// Statement lowering and dispatch of statement attributes.

use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::{types, InstBuilder, Value};
use cranelift_module::Module;
use kiln_tir::{attr, DataType, Expr, ForKind, Stmt, Var};

use super::FunctionTranslator;
use crate::abi::RuntimeFn;
use crate::{CodegenError, Result};

/// Stack buffers are never aligned beyond this.
const MAX_STACK_ALIGN: u32 = 16;

impl<M: Module> FunctionTranslator<'_, '_, '_, M> {
    pub(crate) fn lower_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::LetStmt { var, value, body } => {
                let value = self.lower_expr_as(value, var.dtype)?;
                self.with_binding(var, value, |t| t.lower_stmt(body))
            }
            Stmt::AttrStmt { key, value, body } => self.lower_attr(key, value, body),
            Stmt::AssertStmt { condition, message, body } => {
                self.lower_assert(condition, message)?;
                self.lower_stmt(body)
            }
            Stmt::For { loop_var, min, extent, kind, body } => match kind {
                ForKind::Parallel => self.lower_parallel_for(stmt, loop_var, min, extent, body),
                ForKind::Serial | ForKind::Unrolled => {
                    let begin = self.lower_expr_as(min, loop_var.dtype)?;
                    let extent = self.lower_expr_as(extent, loop_var.dtype)?;
                    let end = self.emitter.ins().iadd(begin, extent);
                    let ty = self.emitter.value_type(begin);
                    let one = self.emitter.iconst(ty, 1);
                    self.emit_serial_loop(loop_var, begin, end, one, body)
                }
            },
            Stmt::IfThenElse { condition, then_case, else_case } => {
                let cond = self.lower_expr_as(condition, DataType::bool())?;
                let then_block = self.emitter.create_block();
                let merge = self.emitter.create_block();
                let else_block = match else_case {
                    Some(_) => self.emitter.create_block(),
                    None => merge,
                };
                self.emitter.branch_if(cond, then_block, &[], else_block, &[]);

                self.emitter.switch_to(then_block);
                self.lower_stmt(then_case)?;
                self.emitter.jump(merge, &[]);

                if let Some(else_case) = else_case {
                    self.emitter.switch_to(else_block);
                    self.lower_stmt(else_case)?;
                    self.emitter.jump(merge, &[]);
                }
                self.emitter.switch_to(merge);
                Ok(())
            }
            Stmt::Store { buffer, index, value } => {
                let dtype = value.dtype();
                let base = self.lookup(buffer)?;
                self.clif_type(dtype)?;
                let value = self.lower_expr(value)?;
                let index = self.lower_expr(index)?;
                let addr = self.emitter.element_addr(base, index, dtype.bytes(), 0);
                self.emitter.store(value, addr, 0);
                Ok(())
            }
            Stmt::Evaluate(expr) => self.lower_expr(expr).map(|_| ()),
            Stmt::Seq(stmts) => stmts.iter().try_for_each(|stmt| self.lower_stmt(stmt)),
            Stmt::Allocate { buffer_var, dtype, extent, alignment, body } => {
                self.lower_allocate(buffer_var, *dtype, *extent, *alignment, body)
            }
        }
    }

    /// Counted loop over `[begin, end)` by `stride`, with the induction variable as a block
    /// parameter of the header.
    pub(crate) fn emit_serial_loop(
        &mut self,
        loop_var: &Var,
        begin: Value,
        end: Value,
        stride: Value,
        body: &Stmt,
    ) -> Result<()> {
        let ty = self.emitter.value_type(begin);
        let (header, index) = self.emitter.create_block_with_param(ty);
        let body_block = self.emitter.create_block();
        let exit = self.emitter.create_block();
        self.emitter.jump(header, &[begin]);

        self.emitter.switch_to(header);
        let in_range = self.emitter.ins().icmp(IntCC::SignedLessThan, index, end);
        self.emitter.branch_if(in_range, body_block, &[], exit, &[]);

        self.emitter.switch_to(body_block);
        self.with_binding(loop_var, index, |t| t.lower_stmt(body))?;
        let next = self.emitter.ins().iadd(index, stride);
        self.emitter.jump(header, &[next]);

        self.emitter.switch_to(exit);
        Ok(())
    }

    fn lower_attr(&mut self, key: &str, value: &Expr, body: &Stmt) -> Result<()> {
        match key {
            attr::COMPUTE_SCOPE => self.lower_compute_scope(value, body),
            attr::COPROC_UOP_SCOPE => self.lower_static_init(value, body),
            attr::PRAGMA_PARALLEL_STRIDE_PATTERN => self.lower_stride_pattern(body),
            attr::PRAGMA_PARALLEL_LAUNCH_POINT => self.lower_parallel_launch(body),
            attr::PRAGMA_PARALLEL_BARRIER_WHEN_FINISH => self.lower_parallel_barrier(body),
            attr::PRAGMA_IMPORT_OBJECT => {
                let path = self.str_arg(value, attr::PRAGMA_IMPORT_OBJECT)?;
                log::debug!("Recording link input {path}");
                self.session.link_inputs.push(path.to_string());
                self.lower_stmt(body)
            }
            key if attr::is_pragma_key(key) => {
                log::warn!("Unknown pragma {key} in {}", self.func_name);
                self.lower_stmt(body)
            }
            _ => self.lower_stmt(body),
        }
    }

    /// Raises `RuntimeError` and returns -1 when `condition` is false.
    fn lower_assert(&mut self, condition: &Expr, message: &str) -> Result<()> {
        let cond = self.lower_expr_as(condition, DataType::bool())?;
        let fail = self.emitter.create_cold_block();
        let cont = self.emitter.create_block();
        self.emitter.branch_if(cond, cont, &[], fail, &[]);

        self.emitter.switch_to(fail);
        let text = if message.is_empty() {
            format!("Assert fail: {condition}")
        } else {
            format!("Assert fail: {condition}, {message}")
        };
        let kind = self.string_ptr("RuntimeError")?;
        let text = self.string_ptr(&text)?;
        self.call_runtime(RuntimeFn::ErrorSetRaised, &[kind, text])?;
        let failed = self.emitter.iconst(types::I32, -1);
        self.emitter.ret(&[failed]);

        self.emitter.switch_to(cont);
        Ok(())
    }

    fn lower_allocate(
        &mut self,
        buffer_var: &Var,
        dtype: DataType,
        extent: i64,
        alignment: Option<u32>,
        body: &Stmt,
    ) -> Result<()> {
        let invalid = || CodegenError::InvalidAllocation {
            func: self.func_name.clone(),
            buffer: buffer_var.name.clone(),
            extent,
        };
        if extent <= 0 {
            return Err(invalid());
        }
        self.clif_type(dtype)?;
        let size = u32::try_from(extent)
            .ok()
            .and_then(|extent| extent.checked_mul(dtype.bytes()))
            .ok_or_else(invalid)?;
        let align = alignment.unwrap_or(dtype.bytes()).clamp(1, MAX_STACK_ALIGN);

        let buffer = self.emitter.stack_alloc(size, align);
        let previous_align = self.scope.storage_align.insert(buffer_var.clone(), align);
        let lowered = self.with_binding(buffer_var, buffer, |t| t.lower_stmt(body));
        match previous_align {
            Some(previous) => self.scope.storage_align.insert(buffer_var.clone(), previous),
            None => self.scope.storage_align.remove(buffer_var),
        };
        lowered
    }
}
