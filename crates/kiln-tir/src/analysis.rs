use crate::{Expr, ForKind, Stmt, Var};
use rustc_hash::{FxHashMap, FxHashSet};

/// Collects the variables used but not bound inside a statement or expression.
///
/// Results are in first-occurrence order, which is also the field order of closure records.
#[derive(Default)]
struct UndefinedVarCollector {
    bound: FxHashMap<Var, usize>,
    seen: FxHashSet<Var>,
    undefined: Vec<Var>,
}

impl UndefinedVarCollector {
    fn bind(&mut self, var: &Var) {
        *self.bound.entry(var.clone()).or_insert(0) += 1;
    }

    fn unbind(&mut self, var: &Var) {
        if let Some(count) = self.bound.get_mut(var) {
            *count -= 1;
            if *count == 0 {
                self.bound.remove(var);
            }
        }
    }

    fn use_var(&mut self, var: &Var) {
        if !self.bound.contains_key(var) && self.seen.insert(var.clone()) {
            self.undefined.push(var.clone());
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::IntImm { .. } | Expr::FloatImm { .. } | Expr::StringImm(_) => {}
            Expr::Var(var) => self.use_var(var),
            Expr::Cast { value, .. } | Expr::Not(value) => self.visit_expr(value),
            Expr::Binary { lhs, rhs, .. } | Expr::Cmp { lhs, rhs, .. } => {
                self.visit_expr(lhs);
                self.visit_expr(rhs);
            }
            Expr::Select { cond, then_value, else_value } => {
                self.visit_expr(cond);
                self.visit_expr(then_value);
                self.visit_expr(else_value);
            }
            Expr::Load { buffer, index, .. } => {
                self.use_var(buffer);
                self.visit_expr(index);
            }
            Expr::Call { args, .. } => args.iter().for_each(|arg| self.visit_expr(arg)),
            Expr::Let { var, value, body } => {
                self.visit_expr(value);
                self.bind(var);
                self.visit_expr(body);
                self.unbind(var);
            }
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::LetStmt { var, value, body } => {
                self.visit_expr(value);
                self.bind(var);
                self.visit_stmt(body);
                self.unbind(var);
            }
            Stmt::AttrStmt { value, body, .. } => {
                self.visit_expr(value);
                self.visit_stmt(body);
            }
            Stmt::AssertStmt { condition, body, .. } => {
                self.visit_expr(condition);
                self.visit_stmt(body);
            }
            Stmt::For { loop_var, min, extent, body, .. } => {
                self.visit_expr(min);
                self.visit_expr(extent);
                self.bind(loop_var);
                self.visit_stmt(body);
                self.unbind(loop_var);
            }
            Stmt::IfThenElse { condition, then_case, else_case } => {
                self.visit_expr(condition);
                self.visit_stmt(then_case);
                if let Some(else_case) = else_case {
                    self.visit_stmt(else_case);
                }
            }
            Stmt::Store { buffer, index, value } => {
                self.use_var(buffer);
                self.visit_expr(index);
                self.visit_expr(value);
            }
            Stmt::Evaluate(expr) => self.visit_expr(expr),
            Stmt::Seq(stmts) => stmts.iter().for_each(|s| self.visit_stmt(s)),
            Stmt::Allocate { buffer_var, body, .. } => {
                self.bind(buffer_var);
                self.visit_stmt(body);
                self.unbind(buffer_var);
            }
        }
    }
}

/// Variables `stmt` reads without binding them, excluding `defined`.
pub fn undefined_vars(stmt: &Stmt, defined: &[Var]) -> Vec<Var> {
    let mut collector = UndefinedVarCollector::default();
    defined.iter().for_each(|var| collector.bind(var));
    collector.visit_stmt(stmt);
    collector.undefined
}

pub fn undefined_vars_expr(expr: &Expr) -> Vec<Var> {
    let mut collector = UndefinedVarCollector::default();
    collector.visit_expr(expr);
    collector.undefined
}

/// Whether `stmt` contains a parallel `For` anywhere inside it.
pub fn contains_parallel_loop(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::For { kind: ForKind::Parallel, .. } => true,
        Stmt::For { body, .. }
        | Stmt::LetStmt { body, .. }
        | Stmt::AttrStmt { body, .. }
        | Stmt::AssertStmt { body, .. }
        | Stmt::Allocate { body, .. } => contains_parallel_loop(body),
        Stmt::IfThenElse { then_case, else_case, .. } => {
            contains_parallel_loop(then_case)
                || else_case.as_deref().is_some_and(contains_parallel_loop)
        }
        Stmt::Seq(stmts) => stmts.iter().any(contains_parallel_loop),
        Stmt::Store { .. } | Stmt::Evaluate(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DataType;

    #[test]
    fn free_vars_in_first_occurrence_order() {
        let a = Var::handle("A");
        let n = Var::int32("n");
        let i = Var::int32("i");
        let body = Stmt::for_loop(
            &i,
            Expr::var(&n),
            ForKind::Serial,
            Stmt::store(&a, Expr::var(&i), Expr::cast(DataType::float64(), Expr::var(&i))),
        );
        let free = undefined_vars(&body, &[]);
        assert_eq!(free, vec![n, a]);
    }

    #[test]
    fn bound_vars_are_excluded() {
        let x = Var::int32("x");
        let y = Var::int32("y");
        let out = Var::handle("out");
        let body = Stmt::let_stmt(
            &x,
            Expr::var(&y),
            Stmt::store(&out, Expr::int32(0), Expr::var(&x)),
        );
        assert_eq!(undefined_vars(&body, &[out.clone()]), vec![y]);
    }

    #[test]
    fn use_after_scope_is_free() {
        let t = Var::int32("t");
        let out = Var::handle("out");
        let body = Stmt::seq(vec![
            Stmt::let_stmt(&t, Expr::int32(1), Stmt::nop()),
            Stmt::store(&out, Expr::int32(0), Expr::var(&t)),
        ]);
        assert_eq!(undefined_vars(&body, &[]), vec![out, t]);
    }

    #[test]
    fn finds_nested_parallel_loop() {
        let i = Var::int32("i");
        let inner = Stmt::for_loop(&i, Expr::int32(4), ForKind::Parallel, Stmt::nop());
        let outer = Stmt::attr("pragma_parallel_launch_point", Expr::int32(1), inner);
        assert!(contains_parallel_loop(&outer));
        assert!(!contains_parallel_loop(&Stmt::nop()));
    }
}
