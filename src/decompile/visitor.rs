//! Read-only traversal of a decompiled tree.
//!
//! Every `visit_*` method defaults to the matching `walk_*` function, which
//! visits the children of the node in source order. An implementation that
//! overrides a method and still wants the children visited calls the `walk_*`
//! function itself.

use super::condition::Condition;
use super::expr::Expr;
use super::structured_types::{CatchClause, Statement, StatementBlock, SwitchCase};

pub trait Visitor {
    fn visit_block(&mut self, block: &StatementBlock) {
        walk_block(self, block);
    }

    fn visit_statement(&mut self, statement: &Statement) {
        walk_statement(self, statement);
    }

    fn visit_switch_case(&mut self, case: &SwitchCase) {
        self.visit_block(&case.body);
    }

    fn visit_catch(&mut self, clause: &CatchClause) {
        self.visit_block(&clause.body);
    }

    fn visit_condition(&mut self, condition: &Condition) {
        walk_condition(self, condition);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }
}

pub fn walk_block<V: Visitor + ?Sized>(visitor: &mut V, block: &StatementBlock) {
    for statement in &block.statements {
        visitor.visit_statement(statement);
    }
}

pub fn walk_statement<V: Visitor + ?Sized>(visitor: &mut V, statement: &Statement) {
    match statement {
        Statement::LocalStore { value, .. } => visitor.visit_expr(value),
        Statement::FieldStore { object, value, .. } => {
            if let Some(object) = object {
                visitor.visit_expr(object);
            }
            visitor.visit_expr(value);
        }
        Statement::ArrayStore { array, index, value } => {
            visitor.visit_expr(array);
            visitor.visit_expr(index);
            visitor.visit_expr(value);
        }
        Statement::Expression(expr) | Statement::Throw(expr) => visitor.visit_expr(expr),
        Statement::Monitor { object, .. } => visitor.visit_expr(object),
        Statement::Return(value) => {
            if let Some(value) = value {
                visitor.visit_expr(value);
            }
        }
        Statement::Increment { .. } | Statement::Break { .. } | Statement::Continue { .. } => {}
        Statement::If { condition, then_block, else_block } => {
            visitor.visit_condition(condition);
            visitor.visit_block(then_block);
            if let Some(else_block) = else_block {
                visitor.visit_block(else_block);
            }
        }
        Statement::While { condition, body, .. } => {
            if let Some(condition) = condition {
                visitor.visit_condition(condition);
            }
            visitor.visit_block(body);
        }
        Statement::DoWhile { body, condition, .. } => {
            visitor.visit_block(body);
            visitor.visit_condition(condition);
        }
        Statement::For { init, condition, update, body, .. } => {
            for statement in init {
                visitor.visit_statement(statement);
            }
            if let Some(condition) = condition {
                visitor.visit_condition(condition);
            }
            for statement in update {
                visitor.visit_statement(statement);
            }
            visitor.visit_block(body);
        }
        Statement::Switch { key, cases, .. } => {
            visitor.visit_expr(key);
            for case in cases {
                visitor.visit_switch_case(case);
            }
        }
        Statement::TryCatch { body, catches } => {
            visitor.visit_block(body);
            for clause in catches {
                visitor.visit_catch(clause);
            }
        }
    }
}

pub fn walk_condition<V: Visitor + ?Sized>(visitor: &mut V, condition: &Condition) {
    match condition {
        Condition::Test { expr, .. } => visitor.visit_expr(expr),
        Condition::Compare { left, right, .. } => {
            visitor.visit_expr(left);
            visitor.visit_expr(right);
        }
        Condition::And(operands) | Condition::Or(operands) => {
            for operand in operands {
                visitor.visit_condition(operand);
            }
        }
        Condition::Not(inner) => visitor.visit_condition(inner),
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(visitor: &mut V, expr: &Expr) {
    match expr {
        Expr::Ternary { condition, then_expr, else_expr } => {
            visitor.visit_condition(condition);
            visitor.visit_expr(then_expr);
            visitor.visit_expr(else_expr);
        }
        Expr::Condition(condition) => visitor.visit_condition(condition),
        other => {
            for child in other.children() {
                visitor.visit_expr(child);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompile::expr::{CompareOp, InvokeKind};
    use crate::decompile::descriptor::JvmType;
    use crate::decompile::locals::LocalId;
    use crate::decompile::structured_types::BlockRole;

    #[derive(Default)]
    struct CallCounter {
        calls: usize,
        conditions: usize,
    }

    impl Visitor for CallCounter {
        fn visit_condition(&mut self, condition: &Condition) {
            self.conditions += 1;
            walk_condition(self, condition);
        }

        fn visit_expr(&mut self, expr: &Expr) {
            if matches!(expr, Expr::MethodCall { .. }) {
                self.calls += 1;
            }
            walk_expr(self, expr);
        }
    }

    fn call(name: &str, args: Vec<Expr>) -> Expr {
        Expr::MethodCall {
            kind: InvokeKind::Static,
            object: None,
            class_name: "Foo".into(),
            method_name: name.into(),
            descriptor: "()I".into(),
            args,
            return_type: JvmType::Int,
        }
    }

    #[test]
    fn test_walk_reaches_nested_calls() {
        let body = StatementBlock::new(
            BlockRole::MethodBody,
            vec![Statement::If {
                condition: Condition::compare(CompareOp::Lt, call("a", vec![]), Expr::IntLiteral(0)),
                then_block: StatementBlock::new(
                    BlockRole::Then,
                    vec![Statement::Expression(call("b", vec![call("c", vec![])]))],
                ),
                else_block: Some(StatementBlock::new(
                    BlockRole::Else,
                    vec![Statement::Increment { local: LocalId(0), amount: 1 }],
                )),
            }],
        );
        let mut counter = CallCounter::default();
        counter.visit_block(&body);
        assert_eq!(counter.calls, 3);
        assert_eq!(counter.conditions, 1);
    }
}
