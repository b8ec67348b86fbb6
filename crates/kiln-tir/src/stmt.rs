use crate::{DataType, Expr, Var};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForKind {
    #[default]
    Serial,
    Unrolled,
    Parallel,
}

/// IR statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stmt {
    LetStmt {
        var: Var,
        value: Expr,
        body: Box<Stmt>,
    },
    /// Annotation on `body`; the key decides how the backend treats it.
    AttrStmt {
        key: String,
        value: Expr,
        body: Box<Stmt>,
    },
    AssertStmt {
        condition: Expr,
        message: String,
        body: Box<Stmt>,
    },
    For {
        loop_var: Var,
        min: Expr,
        extent: Expr,
        #[serde(default)]
        kind: ForKind,
        body: Box<Stmt>,
    },
    IfThenElse {
        condition: Expr,
        then_case: Box<Stmt>,
        #[serde(default)]
        else_case: Option<Box<Stmt>>,
    },
    /// `buffer[index] = value`, element type taken from `value`.
    Store {
        buffer: Var,
        index: Expr,
        value: Expr,
    },
    Evaluate(Expr),
    Seq(Vec<Stmt>),
    /// Stack buffer of `extent` elements bound to `buffer_var` for the duration of `body`.
    Allocate {
        buffer_var: Var,
        dtype: DataType,
        extent: i64,
        #[serde(default)]
        alignment: Option<u32>,
        body: Box<Stmt>,
    },
}

impl Stmt {
    pub fn let_stmt(var: &Var, value: Expr, body: Stmt) -> Self {
        Stmt::LetStmt { var: var.clone(), value, body: Box::new(body) }
    }

    pub fn attr(key: &str, value: Expr, body: Stmt) -> Self {
        Stmt::AttrStmt { key: key.to_string(), value, body: Box::new(body) }
    }

    pub fn assert(condition: Expr, message: &str, body: Stmt) -> Self {
        Stmt::AssertStmt { condition, message: message.to_string(), body: Box::new(body) }
    }

    pub fn for_loop(loop_var: &Var, extent: Expr, kind: ForKind, body: Stmt) -> Self {
        Stmt::For {
            loop_var: loop_var.clone(),
            min: Expr::int(loop_var.dtype, 0),
            extent,
            kind,
            body: Box::new(body),
        }
    }

    pub fn if_then_else(condition: Expr, then_case: Stmt, else_case: Option<Stmt>) -> Self {
        Stmt::IfThenElse {
            condition,
            then_case: Box::new(then_case),
            else_case: else_case.map(Box::new),
        }
    }

    pub fn store(buffer: &Var, index: Expr, value: Expr) -> Self {
        Stmt::Store { buffer: buffer.clone(), index, value }
    }

    pub fn evaluate(value: Expr) -> Self {
        Stmt::Evaluate(value)
    }

    pub fn seq(stmts: Vec<Stmt>) -> Self {
        Stmt::Seq(stmts)
    }

    pub fn allocate(buffer_var: &Var, dtype: DataType, extent: i64, body: Stmt) -> Self {
        Stmt::Allocate {
            buffer_var: buffer_var.clone(),
            dtype,
            extent,
            alignment: None,
            body: Box::new(body),
        }
    }

    /// No-op statement.
    pub fn nop() -> Self {
        Stmt::Seq(Vec::new())
    }
}
