// Lowering of scalar expressions and conversions between IR types.

use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::{types, InstBuilder, Type, Value};
use cranelift_module::Module;
use kiln_tir::{BinaryOp, CmpOp, DataType, Expr, TypeCode};

use super::FunctionTranslator;
use crate::{CodegenError, Result};

fn binary_op_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "sub",
        BinaryOp::Mul => "mul",
        BinaryOp::Div => "div",
        BinaryOp::Mod => "mod",
        BinaryOp::Min => "min",
        BinaryOp::Max => "max",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
    }
}

impl<M: Module> FunctionTranslator<'_, '_, '_, M> {
    pub(crate) fn lower_expr(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::IntImm { dtype, value } => {
                let ty = self.clif_type(*dtype)?;
                if dtype.is_float() {
                    return self.float_const(ty, *value as f64);
                }
                Ok(self.emitter.iconst(ty, *value))
            }
            Expr::FloatImm { dtype, value } => {
                let ty = self.clif_type(*dtype)?;
                if !dtype.is_float() {
                    return Err(self.type_mismatch("float immediate", *dtype));
                }
                self.float_const(ty, *value)
            }
            Expr::StringImm(value) => self.string_ptr(value),
            Expr::Var(var) => self.lookup(var),
            Expr::Cast { dtype, value } => {
                let lowered = self.lower_expr(value)?;
                self.convert(lowered, value.dtype(), *dtype)
            }
            Expr::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs),
            Expr::Cmp { op, lhs, rhs } => self.lower_cmp(*op, lhs, rhs),
            Expr::Not(value) => {
                let value = self.lower_expr_as(value, DataType::bool())?;
                Ok(self.emitter.ins().icmp_imm(IntCC::Equal, value, 0))
            }
            Expr::Select { cond, then_value, else_value } => {
                let dtype = then_value.dtype();
                let cond = self.lower_expr_as(cond, DataType::bool())?;
                let then_value = self.lower_expr(then_value)?;
                let else_value = self.lower_expr_as(else_value, dtype)?;
                Ok(self.emitter.ins().select(cond, then_value, else_value))
            }
            Expr::Load { dtype, buffer, index } => {
                let ty = self.clif_type(*dtype)?;
                let base = self.lookup(buffer)?;
                let index = self.lower_expr(index)?;
                let addr = self.emitter.element_addr(base, index, dtype.bytes(), 0);
                Ok(self.emitter.load(ty, addr, 0))
            }
            Expr::Call { dtype, op, args } => self.lower_builtin(*dtype, *op, args),
            Expr::Let { var, value, body } => {
                let value = self.lower_expr_as(value, var.dtype)?;
                self.with_binding(var, value, |t| t.lower_expr(body))
            }
        }
    }

    /// Lowers `expr` and converts the result to `dtype`.
    pub(crate) fn lower_expr_as(&mut self, expr: &Expr, dtype: DataType) -> Result<Value> {
        let value = self.lower_expr(expr)?;
        self.convert(value, expr.dtype(), dtype)
    }

    pub(crate) fn type_mismatch(&self, op: &'static str, dtype: DataType) -> CodegenError {
        CodegenError::TypeMismatch { func: self.func_name.clone(), op, dtype }
    }

    fn float_const(&mut self, ty: Type, value: f64) -> Result<Value> {
        Ok(match ty {
            types::F32 => self.emitter.ins().f32const(value as f32),
            _ => self.emitter.ins().f64const(value),
        })
    }

    fn lower_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Result<Value> {
        let dtype = lhs.dtype();
        let a = self.lower_expr(lhs)?;
        let b = self.lower_expr_as(rhs, dtype)?;
        let ins = self.emitter.ins();
        let value = match dtype.code {
            TypeCode::Float => match op {
                BinaryOp::Add => ins.fadd(a, b),
                BinaryOp::Sub => ins.fsub(a, b),
                BinaryOp::Mul => ins.fmul(a, b),
                BinaryOp::Div => ins.fdiv(a, b),
                BinaryOp::Min => ins.fmin(a, b),
                BinaryOp::Max => ins.fmax(a, b),
                BinaryOp::Mod | BinaryOp::And | BinaryOp::Or => {
                    return Err(self.type_mismatch(binary_op_name(op), dtype))
                }
            },
            TypeCode::Bool => match op {
                BinaryOp::And => ins.band(a, b),
                BinaryOp::Or => ins.bor(a, b),
                _ => return Err(self.type_mismatch(binary_op_name(op), dtype)),
            },
            TypeCode::Int | TypeCode::UInt => {
                let signed = dtype.is_int();
                match op {
                    BinaryOp::Add => ins.iadd(a, b),
                    BinaryOp::Sub => ins.isub(a, b),
                    BinaryOp::Mul => ins.imul(a, b),
                    BinaryOp::Div if signed => ins.sdiv(a, b),
                    BinaryOp::Div => ins.udiv(a, b),
                    BinaryOp::Mod if signed => ins.srem(a, b),
                    BinaryOp::Mod => ins.urem(a, b),
                    BinaryOp::Min if signed => ins.smin(a, b),
                    BinaryOp::Min => ins.umin(a, b),
                    BinaryOp::Max if signed => ins.smax(a, b),
                    BinaryOp::Max => ins.umax(a, b),
                    BinaryOp::And => ins.band(a, b),
                    BinaryOp::Or => ins.bor(a, b),
                }
            }
            TypeCode::Handle | TypeCode::Void => {
                return Err(self.type_mismatch(binary_op_name(op), dtype))
            }
        };
        Ok(value)
    }

    fn lower_cmp(&mut self, op: CmpOp, lhs: &Expr, rhs: &Expr) -> Result<Value> {
        let dtype = lhs.dtype();
        let a = self.lower_expr(lhs)?;
        let b = self.lower_expr_as(rhs, dtype)?;
        if dtype.is_float() {
            let cc = match op {
                CmpOp::Eq => FloatCC::Equal,
                CmpOp::Ne => FloatCC::NotEqual,
                CmpOp::Lt => FloatCC::LessThan,
                CmpOp::Le => FloatCC::LessThanOrEqual,
                CmpOp::Gt => FloatCC::GreaterThan,
                CmpOp::Ge => FloatCC::GreaterThanOrEqual,
            };
            return Ok(self.emitter.ins().fcmp(cc, a, b));
        }
        if dtype.is_void() {
            return Err(self.type_mismatch("compare", dtype));
        }
        let signed = dtype.is_int();
        let cc = match op {
            CmpOp::Eq => IntCC::Equal,
            CmpOp::Ne => IntCC::NotEqual,
            CmpOp::Lt if signed => IntCC::SignedLessThan,
            CmpOp::Lt => IntCC::UnsignedLessThan,
            CmpOp::Le if signed => IntCC::SignedLessThanOrEqual,
            CmpOp::Le => IntCC::UnsignedLessThanOrEqual,
            CmpOp::Gt if signed => IntCC::SignedGreaterThan,
            CmpOp::Gt => IntCC::UnsignedGreaterThan,
            CmpOp::Ge if signed => IntCC::SignedGreaterThanOrEqual,
            CmpOp::Ge => IntCC::UnsignedGreaterThanOrEqual,
        };
        Ok(self.emitter.ins().icmp(cc, a, b))
    }

    /// Converts `value` of IR type `from` to IR type `to`.
    pub(crate) fn convert(&mut self, value: Value, from: DataType, to: DataType) -> Result<Value> {
        if from == to {
            return Ok(value);
        }
        let to_ty = self.clif_type(to)?;
        if from.is_void() || !from.is_scalar() {
            return Err(self.type_mismatch("cast", from));
        }
        let from_ty = self.emitter.value_type(value);
        let converted = match (from.code, to.code) {
            (_, TypeCode::Void) => return Err(self.type_mismatch("cast", to)),
            (TypeCode::Float, TypeCode::Bool) => {
                let zero = self.float_const(from_ty, 0.0)?;
                self.emitter.ins().fcmp(FloatCC::NotEqual, value, zero)
            }
            (_, TypeCode::Bool) => self.emitter.ins().icmp_imm(IntCC::NotEqual, value, 0),
            (TypeCode::Float, TypeCode::Float) => {
                if to_ty.bits() > from_ty.bits() {
                    self.emitter.ins().fpromote(to_ty, value)
                } else if to_ty.bits() < from_ty.bits() {
                    self.emitter.ins().fdemote(to_ty, value)
                } else {
                    value
                }
            }
            (TypeCode::Float, TypeCode::Int | TypeCode::UInt) => {
                let wide = if to_ty.bits() < 32 { types::I32 } else { to_ty };
                let converted = if to.is_int() {
                    self.emitter.ins().fcvt_to_sint_sat(wide, value)
                } else {
                    self.emitter.ins().fcvt_to_uint_sat(wide, value)
                };
                self.resize(converted, to_ty, false)
            }
            (TypeCode::Float, TypeCode::Handle) | (TypeCode::Handle, TypeCode::Float) => {
                return Err(self.type_mismatch("cast", to))
            }
            (TypeCode::Int, TypeCode::Float) => {
                let widened = self.widen_to_i32(value, true);
                self.emitter.ins().fcvt_from_sint(to_ty, widened)
            }
            (_, TypeCode::Float) => {
                let widened = self.widen_to_i32(value, false);
                self.emitter.ins().fcvt_from_uint(to_ty, widened)
            }
            (TypeCode::Int, _) => self.resize(value, to_ty, true),
            (_, _) => self.resize(value, to_ty, false),
        };
        Ok(converted)
    }

    /// Integer width change; extension follows the signedness of the source.
    fn resize(&mut self, value: Value, to_ty: Type, signed: bool) -> Value {
        let from_ty = self.emitter.value_type(value);
        if from_ty == to_ty {
            value
        } else if to_ty.bits() > from_ty.bits() {
            if signed {
                self.emitter.ins().sextend(to_ty, value)
            } else {
                self.emitter.ins().uextend(to_ty, value)
            }
        } else {
            self.emitter.ins().ireduce(to_ty, value)
        }
    }

    fn widen_to_i32(&mut self, value: Value, signed: bool) -> Value {
        if self.emitter.value_type(value).bits() < 32 {
            self.resize(value, types::I32, signed)
        } else {
            value
        }
    }

    /// Converts integer call arguments to the widths a fixed signature expects.
    pub(crate) fn fit_args(&mut self, args: &[Value], params: &[Type]) -> Vec<Value> {
        args.iter()
            .zip(params)
            .map(|(arg, ty)| {
                let arg_ty = self.emitter.value_type(*arg);
                if arg_ty.is_int() && ty.is_int() {
                    self.resize(*arg, *ty, true)
                } else {
                    *arg
                }
            })
            .collect()
    }
}
