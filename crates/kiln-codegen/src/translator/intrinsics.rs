// Dispatch of `Builtin` calls.

use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::{types, InstBuilder, MemFlags, Type, Value};
use cranelift_module::Module;
use kiln_tir::{Builtin, DataType, Expr, StructField};

use super::call::PackedCallMode;
use super::FunctionTranslator;
use crate::abi::{self, RuntimeFn};
use crate::options::RuntimeBinding;
use crate::{CodegenError, Result};

impl<M: Module> FunctionTranslator<'_, '_, '_, M> {
    pub(crate) fn lower_builtin(&mut self, dtype: DataType, op: Builtin, args: &[Expr]) -> Result<Value> {
        match op {
            Builtin::CallPackedLowered | Builtin::CallCPackedLowered => {
                self.expect_arity(op, args, 4)?;
                let mode = if op == Builtin::CallPackedLowered {
                    PackedCallMode::Lookup
                } else {
                    PackedCallMode::Direct
                };
                let name = self.str_arg(&args[0], op.name())?;
                let stack = self.lower_expr(&args[1])?;
                let begin = self.const_arg(&args[2], op.name())?;
                let end = self.const_arg(&args[3], op.name())?;
                Ok(self.emit_packed_call(mode, name, stack, begin, end, dtype)?.value)
            }
            Builtin::CallTracePackedLowered => {
                self.expect_arity(op, args, 5)?;
                if dtype.is_void() {
                    return Err(self.type_mismatch(op.name(), dtype));
                }
                let name = self.str_arg(&args[0], op.name())?;
                let stack = self.lower_expr(&args[1])?;
                let begin = self.const_arg(&args[2], op.name())?;
                let end = self.const_arg(&args[3], op.name())?;
                let call = self.emit_packed_call(PackedCallMode::Lookup, name, stack, begin, end, dtype)?;
                let traced = self.lower_expr_as(&args[4], dtype)?;
                Ok(self.select_traced(call, traced))
            }
            Builtin::StaticHandle => {
                self.expect_arity(op, args, 0)?;
                self.static_handle()
            }
            Builtin::ThrowLastError => {
                let failed = self.emitter.iconst(types::I32, -1);
                self.emitter.ret(&[failed]);
                Ok(self.emitter.iconst(types::I32, -1))
            }
            Builtin::StructGet => {
                self.expect_arity(op, args, 3)?;
                let base = self.lower_expr(&args[0])?;
                let index = self.lower_expr(&args[1])?;
                let kind = self.const_arg(&args[2], op.name())?;
                let kind = self.decode_field(kind)?;
                let field = self.struct_field_ref(dtype, base, index, kind)?;
                if kind == StructField::ArrAddr {
                    return Ok(field.addr);
                }
                if dtype.is_bool() {
                    let raw = self.emitter.load(types::I64, field.addr, 0);
                    return Ok(self.emitter.ins().icmp_imm(IntCC::NotEqual, raw, 0));
                }
                let raw = self.emitter.load(field.ty, field.addr, 0);
                self.convert(raw, field.dtype, dtype)
            }
            Builtin::StructSet => {
                self.expect_arity(op, args, 4)?;
                let base = self.lower_expr(&args[0])?;
                let index = self.lower_expr(&args[1])?;
                let kind = self.const_arg(&args[2], op.name())?;
                let kind = self.decode_field(kind)?;
                if kind == StructField::ArrAddr {
                    return Err(CodegenError::StoreToAddressField { func: self.func_name.clone() });
                }
                let value_dtype = args[3].dtype();
                let field = self.struct_field_ref(value_dtype, base, index, kind)?;
                let value = self.lower_expr_as(&args[3], field.dtype)?;
                if kind == StructField::AnyUnionValue {
                    self.store_payload(field, value);
                } else {
                    self.emitter.store(value, field.addr, 0);
                }
                Ok(self.emitter.iconst(types::I32, 0))
            }
            Builtin::StackAlloca => {
                self.expect_arity(op, args, 2)?;
                let ty = self.str_arg(&args[0], op.name())?;
                let count = self.const_arg(&args[1], op.name())?;
                let catalog = &self.session.catalog;
                let (size, align) = match ty {
                    "shape" => (catalog.shape_index_bytes(), catalog.shape_index_bytes()),
                    "ffi_any" => (catalog.ffi_any.size, catalog.ffi_any.align),
                    "array" => (catalog.array.size, catalog.array.align),
                    other => {
                        return Err(CodegenError::UnknownStackAllocType {
                            func: self.func_name.clone(),
                            ty: other.to_string(),
                        })
                    }
                };
                let count = u32::try_from(count.max(1)).map_err(|_| CodegenError::ExpectedConstant {
                    func: self.func_name.clone(),
                    construct: op.name(),
                })?;
                Ok(self.emitter.stack_alloc(size * count, align))
            }
            Builtin::CallExtern => self.lower_call_extern(dtype, args),
            Builtin::Reinterpret => {
                self.expect_arity(op, args, 1)?;
                let value = self.lower_expr(&args[0])?;
                let to_ty = self.clif_type(dtype)?;
                let from_ty = self.emitter.value_type(value);
                if from_ty == to_ty {
                    Ok(value)
                } else if from_ty.bits() == to_ty.bits() {
                    Ok(self.emitter.ins().bitcast(to_ty, MemFlags::new(), value))
                } else {
                    Err(self.type_mismatch(op.name(), dtype))
                }
            }
            Builtin::IsNullPointer => {
                self.expect_arity(op, args, 1)?;
                let value = self.lower_expr(&args[0])?;
                Ok(self.emitter.ins().icmp_imm(IntCC::Equal, value, 0))
            }
            Builtin::Likely => {
                self.expect_arity(op, args, 1)?;
                self.lower_expr(&args[0])
            }
            Builtin::Ret => {
                self.expect_arity(op, args, 1)?;
                let value = self.lower_expr_as(&args[0], DataType::int32())?;
                self.emitter.ret(&[value]);
                Ok(value)
            }
        }
    }

    /// Plain C call. Workspace allocation goes through the runtime binding so the loader can
    /// supply it.
    fn lower_call_extern(&mut self, dtype: DataType, args: &[Expr]) -> Result<Value> {
        let Some((name, rest)) = args.split_first() else {
            return Err(CodegenError::IntrinsicArity {
                func: self.func_name.clone(),
                op: Builtin::CallExtern.name(),
                expected: 1,
                found: 0,
            });
        };
        let name = self.str_arg(name, Builtin::CallExtern.name())?;
        let values = rest.iter().map(|arg| self.lower_expr(arg)).collect::<Result<Vec<_>>>()?;
        let ret_ty = if dtype.is_void() { None } else { Some(self.clif_type(dtype)?) };

        let workspace = RuntimeFn::from_symbol(name)
            .filter(|rt| matches!(rt, RuntimeFn::AllocWorkspace | RuntimeFn::FreeWorkspace));
        let result = match (workspace, self.session.binding()) {
            (Some(rt), RuntimeBinding::ContextSlots) => {
                let sig = rt.signature(self.emitter.pointer_type(), self.session.call_conv);
                let params: Vec<Type> = sig.params.iter().map(|p| p.value_type).collect();
                let values = self.fit_args(&values, &params);
                self.call_runtime(rt, &values)?
            }
            _ => {
                let params: Vec<Type> = values.iter().map(|v| self.emitter.value_type(*v)).collect();
                let sig = abi::signature(self.session.call_conv, &params, ret_ty);
                self.call_import(name, &sig, &values)?
            }
        };
        Ok(match result {
            Some(value) => value,
            None => self.emitter.iconst(types::I32, 0),
        })
    }

    fn expect_arity(&self, op: Builtin, args: &[Expr], expected: usize) -> Result<()> {
        if args.len() == expected {
            Ok(())
        } else {
            Err(CodegenError::IntrinsicArity {
                func: self.func_name.clone(),
                op: op.name(),
                expected,
                found: args.len(),
            })
        }
    }

    fn const_arg(&self, expr: &Expr, construct: &'static str) -> Result<i64> {
        expr.as_const_int().ok_or_else(|| CodegenError::ExpectedConstant {
            func: self.func_name.clone(),
            construct,
        })
    }

    pub(crate) fn str_arg<'x>(&self, expr: &'x Expr, construct: &'static str) -> Result<&'x str> {
        expr.as_str().ok_or_else(|| CodegenError::ExpectedString {
            func: self.func_name.clone(),
            construct,
        })
    }
}
