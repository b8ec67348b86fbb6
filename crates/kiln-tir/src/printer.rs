use crate::{BinaryOp, CmpOp, Expr, ForKind, PrimFunc, Stmt};
use std::fmt::{self, Write};

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::IntImm { dtype, value } if dtype.is_bool() => write!(f, "{}", *value != 0),
            Expr::IntImm { value, .. } => write!(f, "{value}"),
            Expr::FloatImm { value, .. } => write!(f, "{value:?}"),
            Expr::StringImm(s) => write!(f, "{s:?}"),
            Expr::Var(var) => write!(f, "{var}"),
            Expr::Cast { dtype, value } => write!(f, "{dtype}({value})"),
            Expr::Binary { op: BinaryOp::Min, lhs, rhs } => write!(f, "min({lhs}, {rhs})"),
            Expr::Binary { op: BinaryOp::Max, lhs, rhs } => write!(f, "max({lhs}, {rhs})"),
            Expr::Binary { op, lhs, rhs } => {
                let symbol = match op {
                    BinaryOp::Add => "+",
                    BinaryOp::Sub => "-",
                    BinaryOp::Mul => "*",
                    BinaryOp::Div => "/",
                    BinaryOp::Mod => "%",
                    BinaryOp::And => "&&",
                    BinaryOp::Or => "||",
                    BinaryOp::Min | BinaryOp::Max => unreachable!("handled above"),
                };
                write!(f, "({lhs} {symbol} {rhs})")
            }
            Expr::Cmp { op, lhs, rhs } => {
                let symbol = match op {
                    CmpOp::Eq => "==",
                    CmpOp::Ne => "!=",
                    CmpOp::Lt => "<",
                    CmpOp::Le => "<=",
                    CmpOp::Gt => ">",
                    CmpOp::Ge => ">=",
                };
                write!(f, "({lhs} {symbol} {rhs})")
            }
            Expr::Not(value) => write!(f, "!{value}"),
            Expr::Select { cond, then_value, else_value } => {
                write!(f, "select({cond}, {then_value}, {else_value})")
            }
            Expr::Load { buffer, index, .. } => write!(f, "{buffer}[{index}]"),
            Expr::Call { op, args, .. } => {
                write!(f, "{op}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Expr::Let { var, value, body } => write!(f, "(let {var} = {value} in {body})"),
        }
    }
}

struct StmtPrinter<'a, 'f> {
    out: &'a mut fmt::Formatter<'f>,
    indent: usize,
}

impl StmtPrinter<'_, '_> {
    fn line(&mut self, text: fmt::Arguments<'_>) -> fmt::Result {
        for _ in 0..self.indent {
            self.out.write_str("  ")?;
        }
        self.out.write_fmt(text)?;
        self.out.write_char('\n')
    }

    fn nested(&mut self, stmt: &Stmt) -> fmt::Result {
        self.indent += 1;
        let result = self.print(stmt);
        self.indent -= 1;
        result
    }

    fn print(&mut self, stmt: &Stmt) -> fmt::Result {
        match stmt {
            Stmt::LetStmt { var, value, body } => {
                self.line(format_args!("let {var}: {} = {value}", var.dtype))?;
                self.print(body)
            }
            Stmt::AttrStmt { key, value, body } => {
                self.line(format_args!("attr {key} = {value} {{"))?;
                self.nested(body)?;
                self.line(format_args!("}}"))
            }
            Stmt::AssertStmt { condition, message, body } => {
                self.line(format_args!("assert({condition}, {message:?})"))?;
                self.print(body)
            }
            Stmt::For { loop_var, min, extent, kind, body } => {
                let kind = match kind {
                    ForKind::Serial => "for",
                    ForKind::Unrolled => "unrolled",
                    ForKind::Parallel => "parallel",
                };
                self.line(format_args!("{kind} ({loop_var}, {min}, {extent}) {{"))?;
                self.nested(body)?;
                self.line(format_args!("}}"))
            }
            Stmt::IfThenElse { condition, then_case, else_case } => {
                self.line(format_args!("if ({condition}) {{"))?;
                self.nested(then_case)?;
                if let Some(else_case) = else_case {
                    self.line(format_args!("}} else {{"))?;
                    self.nested(else_case)?;
                }
                self.line(format_args!("}}"))
            }
            Stmt::Store { buffer, index, value } => {
                self.line(format_args!("{buffer}[{index}] = {value}"))
            }
            Stmt::Evaluate(expr) => self.line(format_args!("{expr}")),
            Stmt::Seq(stmts) => stmts.iter().try_for_each(|s| self.print(s)),
            Stmt::Allocate { buffer_var, dtype, extent, body, .. } => {
                self.line(format_args!("allocate {buffer_var}: {dtype}[{extent}]"))?;
                self.print(body)
            }
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        StmtPrinter { out: f, indent: 0 }.print(self)
    }
}

impl fmt::Display for PrimFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}: {}", param.dtype)?;
        }
        writeln!(f, ") -> {} {{", self.ret_type)?;
        StmtPrinter { out: f, indent: 1 }.print(&self.body)?;
        f.write_str("}\n")
    }
}
