use crate::{Builtin, DataType, StructField, Var};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// Truncating division for integers.
    Div,
    /// Truncating remainder for integers.
    Mod,
    Min,
    Max,
    /// Logical and for bools, bitwise and for integers.
    And,
    /// Logical or for bools, bitwise or for integers.
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Scalar IR expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    IntImm {
        dtype: DataType,
        value: i64,
    },
    FloatImm {
        dtype: DataType,
        value: f64,
    },
    StringImm(String),
    Var(Var),
    Cast {
        dtype: DataType,
        value: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Cmp {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    Select {
        cond: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
    },
    /// Element `index` of the buffer pointed to by `buffer`.
    Load {
        dtype: DataType,
        buffer: Var,
        index: Box<Expr>,
    },
    Call {
        dtype: DataType,
        op: Builtin,
        args: Vec<Expr>,
    },
    Let {
        var: Var,
        value: Box<Expr>,
        body: Box<Expr>,
    },
}

impl Expr {
    pub fn dtype(&self) -> DataType {
        match self {
            Expr::IntImm { dtype, .. }
            | Expr::FloatImm { dtype, .. }
            | Expr::Cast { dtype, .. }
            | Expr::Load { dtype, .. }
            | Expr::Call { dtype, .. } => *dtype,
            Expr::StringImm(_) => DataType::handle(),
            Expr::Var(var) => var.dtype,
            Expr::Binary { lhs, .. } => lhs.dtype(),
            Expr::Cmp { .. } | Expr::Not(_) => DataType::bool(),
            Expr::Select { then_value, .. } => then_value.dtype(),
            Expr::Let { body, .. } => body.dtype(),
        }
    }

    pub fn int(dtype: DataType, value: i64) -> Self {
        Expr::IntImm { dtype, value }
    }

    pub fn int32(value: i64) -> Self {
        Self::int(DataType::int32(), value)
    }

    pub fn int64(value: i64) -> Self {
        Self::int(DataType::int64(), value)
    }

    pub fn float64(value: f64) -> Self {
        Expr::FloatImm { dtype: DataType::float64(), value }
    }

    pub fn bool(value: bool) -> Self {
        Self::int(DataType::bool(), i64::from(value))
    }

    pub fn str(value: impl Into<String>) -> Self {
        Expr::StringImm(value.into())
    }

    pub fn var(var: &Var) -> Self {
        Expr::Var(var.clone())
    }

    pub fn cast(dtype: DataType, value: Expr) -> Self {
        Expr::Cast { dtype, value: Box::new(value) }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    pub fn add(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Add, lhs, rhs)
    }

    pub fn sub(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Sub, lhs, rhs)
    }

    pub fn mul(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Mul, lhs, rhs)
    }

    pub fn cmp(op: CmpOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Cmp { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    pub fn select(cond: Expr, then_value: Expr, else_value: Expr) -> Self {
        Expr::Select {
            cond: Box::new(cond),
            then_value: Box::new(then_value),
            else_value: Box::new(else_value),
        }
    }

    pub fn load(dtype: DataType, buffer: &Var, index: Expr) -> Self {
        Expr::Load { dtype, buffer: buffer.clone(), index: Box::new(index) }
    }

    pub fn call(dtype: DataType, op: Builtin, args: Vec<Expr>) -> Self {
        Expr::Call { dtype, op, args }
    }

    pub fn struct_get(dtype: DataType, base: Expr, index: i64, field: StructField) -> Self {
        Self::call(
            dtype,
            Builtin::StructGet,
            vec![base, Expr::int32(index), Expr::int32(field as i64)],
        )
    }

    pub fn struct_set(base: Expr, index: i64, field: StructField, value: Expr) -> Self {
        Self::call(
            DataType::int32(),
            Builtin::StructSet,
            vec![base, Expr::int32(index), Expr::int32(field as i64), value],
        )
    }

    /// Packed call of `name` over `stack[begin..end]`, result written to `stack[end]`.
    pub fn call_packed(dtype: DataType, name: &str, stack: &Var, begin: i64, end: i64) -> Self {
        Self::call(
            dtype,
            Builtin::CallPackedLowered,
            vec![Expr::str(name), Expr::var(stack), Expr::int32(begin), Expr::int32(end)],
        )
    }

    pub fn call_extern(dtype: DataType, name: &str, args: Vec<Expr>) -> Self {
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(Expr::str(name));
        all.extend(args);
        Self::call(dtype, Builtin::CallExtern, all)
    }

    /// Integer value of an immediate, looking through casts.
    pub fn as_const_int(&self) -> Option<i64> {
        match self {
            Expr::IntImm { value, .. } => Some(*value),
            Expr::Cast { value, dtype } if dtype.is_integral() => value.as_const_int(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expr::StringImm(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&Var> for Expr {
    fn from(var: &Var) -> Self {
        Expr::var(var)
    }
}
