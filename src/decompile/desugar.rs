//! Source-level cleanups applied to a structured method body.
//!
//! Each pass rewrites patterns the compiler introduced back into the form a
//! programmer would have written: synthetic accessor calls, `c ? 1 : 0` in
//! boolean positions, and counting loops.

use super::class_decompiler::DecompileOptions;
use super::condition::Condition;
use super::descriptor::{parse_method_descriptor, JvmType};
use super::expr::*;
use super::locals::{LocalId, LocalTable};
use super::registry::{AccessorTarget, Registry};
use super::structured_types::*;
use super::visitor::{walk_statement, Visitor};

/// What the passes may consult about the method being cleaned up.
pub struct DesugarContext<'a> {
    pub registry: &'a dyn Registry,
    pub locals: &'a LocalTable,
    pub return_type: &'a JvmType,
}

/// Run all enabled desugaring passes on a structured body.
pub fn desugar(body: &mut StatementBlock, options: &DecompileOptions, ctx: &DesugarContext<'_>) {
    desugar_block(body, options, ctx);
    if body.role == BlockRole::MethodBody && matches!(body.statements.last(), Some(Statement::Return(None))) {
        body.statements.pop();
    }
}

fn desugar_block(block: &mut StatementBlock, options: &DecompileOptions, ctx: &DesugarContext<'_>) {
    for stmt in block.statements.iter_mut() {
        desugar_stmt(stmt, options, ctx);
    }
    if options.fold_for_loops {
        fold_for_loops_in_block(&mut block.statements);
    }
}

fn desugar_stmt(stmt: &mut Statement, options: &DecompileOptions, ctx: &DesugarContext<'_>) {
    for block in stmt.blocks_mut() {
        desugar_block(block, options, ctx);
    }
    if let Statement::For { init, update, .. } = stmt {
        for s in init.iter_mut().chain(update.iter_mut()) {
            desugar_stmt(s, options, ctx);
        }
    }
    if options.fold_synthetic_accessors {
        fold_accessor_store(stmt, ctx.registry);
        rewrite_stmt_exprs(stmt, &mut |e| fold_accessor_expr(e, ctx.registry));
    }
    if options.fold_boolean_ternaries {
        fold_boolean_stmt(stmt, ctx);
    }
}

// ---------------------------------------------------------------------------
// Expression rewriting
// ---------------------------------------------------------------------------

/// Applies `f` to every expression of `stmt` outside nested blocks, children
/// before parents.
fn rewrite_stmt_exprs(stmt: &mut Statement, f: &mut dyn FnMut(&mut Expr)) {
    match stmt {
        Statement::LocalStore { value, .. } => rewrite_expr(value, f),
        Statement::FieldStore { object, value, .. } => {
            if let Some(object) = object {
                rewrite_expr(object, f);
            }
            rewrite_expr(value, f);
        }
        Statement::ArrayStore { array, index, value } => {
            rewrite_expr(array, f);
            rewrite_expr(index, f);
            rewrite_expr(value, f);
        }
        Statement::Expression(e) | Statement::Throw(e) | Statement::Return(Some(e)) => rewrite_expr(e, f),
        Statement::Monitor { object, .. } => rewrite_expr(object, f),
        Statement::If { condition, .. } | Statement::DoWhile { condition, .. } => rewrite_condition(condition, f),
        Statement::While { condition: Some(condition), .. } | Statement::For { condition: Some(condition), .. } => {
            rewrite_condition(condition, f)
        }
        Statement::Switch { key, .. } => rewrite_expr(key, f),
        _ => {}
    }
}

fn rewrite_condition(condition: &mut Condition, f: &mut dyn FnMut(&mut Expr)) {
    match condition {
        Condition::Test { expr, .. } => rewrite_expr(expr, f),
        Condition::Compare { left, right, .. } => {
            rewrite_expr(left, f);
            rewrite_expr(right, f);
        }
        Condition::And(operands) | Condition::Or(operands) => {
            for operand in operands {
                rewrite_condition(operand, f);
            }
        }
        Condition::Not(inner) => rewrite_condition(inner, f),
    }
}

fn rewrite_expr(expr: &mut Expr, f: &mut dyn FnMut(&mut Expr)) {
    match expr {
        Expr::BinaryOp { left, right, .. } | Expr::CmpResult { left, right, .. } => {
            rewrite_expr(left, f);
            rewrite_expr(right, f);
        }
        Expr::UnaryOp { operand, .. } | Expr::Cast { operand, .. } | Expr::Instanceof { operand, .. } => {
            rewrite_expr(operand, f)
        }
        Expr::FieldGet { object: Some(object), .. } => rewrite_expr(object, f),
        Expr::MethodCall { object, args, .. } => {
            if let Some(object) = object {
                rewrite_expr(object, f);
            }
            args.iter_mut().for_each(|a| rewrite_expr(a, f));
        }
        Expr::New { args, .. } => args.iter_mut().for_each(|a| rewrite_expr(a, f)),
        Expr::NewArray { length, .. } => rewrite_expr(length, f),
        Expr::NewMultiArray { dimensions, .. } => dimensions.iter_mut().for_each(|d| rewrite_expr(d, f)),
        Expr::ArrayLength { array } => rewrite_expr(array, f),
        Expr::ArrayLoad { array, index, .. } => {
            rewrite_expr(array, f);
            rewrite_expr(index, f);
        }
        Expr::InvokeDynamic { captures, .. } => captures.iter_mut().for_each(|c| rewrite_expr(c, f)),
        Expr::Ternary { condition, then_expr, else_expr } => {
            rewrite_condition(condition, f);
            rewrite_expr(then_expr, f);
            rewrite_expr(else_expr, f);
        }
        Expr::Condition(condition) => rewrite_condition(condition, f),
        _ => {}
    }
    f(expr);
}

// ---------------------------------------------------------------------------
// Synthetic accessors
// ---------------------------------------------------------------------------

fn accessor_of(expr: &Expr, registry: &dyn Registry) -> Option<AccessorTarget> {
    match expr {
        Expr::MethodCall {
            kind: InvokeKind::Static,
            class_name,
            method_name,
            descriptor,
            ..
        } => registry.accessor(class_name, method_name, descriptor),
        _ => None,
    }
}

/// `Outer.access$000(o)` -> `o.field`, `Outer.access$100(o, x)` -> `o.m(x)`.
fn fold_accessor_expr(expr: &mut Expr, registry: &dyn Registry) {
    let Some(target) = accessor_of(expr, registry) else {
        return;
    };
    let Expr::MethodCall { args, return_type, .. } = expr else {
        return;
    };
    let mut args = std::mem::take(args);
    let return_type = return_type.clone();
    let replacement = match target {
        AccessorTarget::FieldGet { field, field_type, is_static } => {
            let object = match (is_static, args.len()) {
                (true, 0) => None,
                (false, 1) => args.pop().map(Box::new),
                _ => return restore_args(expr, args),
            };
            Expr::FieldGet {
                object,
                class_name: field.class_name,
                field_name: field.name,
                field_type,
            }
        }
        AccessorTarget::Method { kind, method } => {
            let object = if kind == InvokeKind::Static || args.is_empty() {
                None
            } else {
                Some(Box::new(args.remove(0)))
            };
            let return_type = parse_method_descriptor(&method.descriptor)
                .map(|(_, ret)| ret)
                .unwrap_or(return_type);
            Expr::MethodCall {
                kind,
                object,
                class_name: method.class_name,
                method_name: method.name,
                descriptor: method.descriptor,
                args,
                return_type,
            }
        }
        // A field write whose value is used has no expression form.
        AccessorTarget::FieldSet { .. } => return restore_args(expr, args),
    };
    *expr = replacement;
}

fn restore_args(expr: &mut Expr, restored: Vec<Expr>) {
    if let Expr::MethodCall { args, .. } = expr {
        *args = restored;
    }
}

/// `Outer.access$002(o, v);` as a statement -> `o.field = v;`.
fn fold_accessor_store(stmt: &mut Statement, registry: &dyn Registry) {
    let Statement::Expression(call) = stmt else {
        return;
    };
    let Some(AccessorTarget::FieldSet { field, field_type, is_static }) = accessor_of(call, registry) else {
        return;
    };
    let Expr::MethodCall { args, .. } = call else {
        return;
    };
    let expected = if is_static { 1 } else { 2 };
    if args.len() != expected {
        return;
    }
    let mut args = std::mem::take(args);
    let Some(value) = args.pop() else {
        return;
    };
    *stmt = Statement::FieldStore {
        object: args.pop(),
        class_name: field.class_name,
        field_name: field.name,
        field_type,
        value,
    };
}

// ---------------------------------------------------------------------------
// Boolean ternaries
// ---------------------------------------------------------------------------

/// `c ? 1 : 0` -> `c`, `c ? 0 : 1` -> `!c`.
fn ternary_as_condition(expr: &Expr) -> Option<Condition> {
    match expr {
        Expr::Ternary { condition, then_expr, else_expr } => match (&**then_expr, &**else_expr) {
            (Expr::IntLiteral(1), Expr::IntLiteral(0)) => Some((**condition).clone()),
            (Expr::IntLiteral(0), Expr::IntLiteral(1)) => Some(condition.invert()),
            _ => None,
        },
        Expr::Condition(condition) => Some((**condition).clone()),
        _ => None,
    }
}

fn fold_boolean_value(expr: &mut Expr) {
    if matches!(expr, Expr::Ternary { .. }) {
        if let Some(condition) = ternary_as_condition(expr) {
            *expr = Expr::Condition(Box::new(condition));
        }
    }
}

fn fold_boolean_stmt(stmt: &mut Statement, ctx: &DesugarContext<'_>) {
    rewrite_stmt_exprs(stmt, &mut fold_boolean_arguments);
    match stmt {
        Statement::LocalStore { local, value } if ctx.locals.ty(*local) == JvmType::Boolean => fold_boolean_value(value),
        Statement::FieldStore { field_type: JvmType::Boolean, value, .. } => fold_boolean_value(value),
        Statement::Return(Some(value)) if *ctx.return_type == JvmType::Boolean => fold_boolean_value(value),
        Statement::If { condition, .. } | Statement::DoWhile { condition, .. } => flatten_condition(condition),
        Statement::While { condition: Some(condition), .. } | Statement::For { condition: Some(condition), .. } => {
            flatten_condition(condition)
        }
        _ => {}
    }
}

/// Arguments passed to `boolean` parameters.
fn fold_boolean_arguments(expr: &mut Expr) {
    if let Expr::MethodCall { descriptor, args, .. } = expr {
        if let Some((params, _)) = parse_method_descriptor(descriptor) {
            for (param, arg) in params.iter().zip(args.iter_mut()) {
                if *param == JvmType::Boolean {
                    fold_boolean_value(arg);
                }
            }
        }
    }
}

/// Replaces tests of boolean ternaries inside `condition` by the ternary's
/// own condition.
fn flatten_condition(condition: &mut Condition) {
    match condition {
        Condition::And(operands) | Condition::Or(operands) => operands.iter_mut().for_each(flatten_condition),
        Condition::Not(inner) => flatten_condition(inner),
        Condition::Test { expr, negated } => {
            if let Some(inner) = ternary_as_condition(expr) {
                *condition = if *negated { inner.invert() } else { inner };
            }
        }
        Condition::Compare { op, left, right } => {
            let zero = matches!(right, Expr::IntLiteral(0));
            if let (true, Some(inner)) = (zero, ternary_as_condition(left)) {
                match op {
                    CompareOp::Ne => *condition = inner,
                    CompareOp::Eq => *condition = inner.invert(),
                    _ => {}
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// For loops
// ---------------------------------------------------------------------------

struct ContinueFinder {
    label: LoopId,
    found: bool,
}

impl Visitor for ContinueFinder {
    fn visit_statement(&mut self, statement: &Statement) {
        if matches!(statement, Statement::Continue { target, .. } if *target == self.label) {
            self.found = true;
        }
        walk_statement(self, statement);
    }
}

fn continues_to(body: &StatementBlock, label: LoopId) -> bool {
    let mut finder = ContinueFinder { label, found: false };
    finder.visit_block(body);
    finder.found
}

fn writes_local(stmt: &Statement, local: LocalId) -> bool {
    matches!(stmt, Statement::LocalStore { local: l, .. } | Statement::Increment { local: l, .. } if *l == local)
}

/// Detect `init; while (c) { ...; update }` where `init` and `update` write
/// the variable the condition reads. Rewrites to For.
fn fold_for_loops_in_block(stmts: &mut Vec<Statement>) {
    let mut i = 1;
    while i < stmts.len() {
        let Statement::LocalStore { local: counter, .. } = stmts[i - 1] else {
            i += 1;
            continue;
        };
        let foldable = match &stmts[i] {
            Statement::While { label, condition: Some(condition), body } => {
                condition.reads_local(counter)
                    && body.statements.len() > 1
                    && body.statements.last().is_some_and(|s| writes_local(s, counter))
                    && !continues_to(body, *label)
            }
            Statement::For { init, condition: Some(condition), .. } => init.is_empty() && condition.reads_local(counter),
            _ => false,
        };
        if !foldable {
            i += 1;
            continue;
        }
        let init = stmts.remove(i - 1);
        let target = &mut stmts[i - 1];
        if let Statement::While { label, condition, body } = target {
            let update: Vec<Statement> = body.statements.pop().into_iter().collect();
            *target = Statement::For {
                label: *label,
                init: Vec::new(),
                condition: condition.take(),
                update,
                body: std::mem::replace(body, StatementBlock::new(BlockRole::LoopBody, Vec::new())),
            };
        }
        if let Statement::For { init: slot, .. } = target {
            slot.push(init);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant_info::FieldRef;
    use crate::decompile::registry::{ClassRegistry, EmptyRegistry};

    fn local(n: u32) -> Expr {
        Expr::Local(LocalId(n))
    }

    fn options() -> DecompileOptions {
        DecompileOptions::default()
    }

    fn run(statements: Vec<Statement>, registry: &dyn Registry, return_type: JvmType) -> Vec<Statement> {
        let locals = LocalTable::default();
        let ctx = DesugarContext {
            registry,
            locals: &locals,
            return_type: &return_type,
        };
        let mut body = StatementBlock::new(BlockRole::MethodBody, statements);
        desugar(&mut body, &options(), &ctx);
        body.statements
    }

    fn counting_loop(with_continue: bool) -> Vec<Statement> {
        let label = LoopId(0);
        let mut body = vec![Statement::Expression(Expr::IntLiteral(7))];
        if with_continue {
            body.insert(0, Statement::Continue { target: label, needs_label: false });
        }
        body.push(Statement::Increment { local: LocalId(1), amount: 1 });
        vec![
            Statement::LocalStore { local: LocalId(1), value: Expr::IntLiteral(0) },
            Statement::While {
                label,
                condition: Some(Condition::compare(CompareOp::Lt, local(1), local(0))),
                body: StatementBlock::new(BlockRole::LoopBody, body),
            },
        ]
    }

    #[test]
    fn test_counting_while_becomes_for() {
        let out = run(counting_loop(false), &EmptyRegistry, JvmType::Void);
        assert_eq!(out.len(), 1);
        match &out[0] {
            Statement::For { init, update, body, .. } => {
                assert_eq!(init.len(), 1);
                assert_eq!(update, &vec![Statement::Increment { local: LocalId(1), amount: 1 }]);
                assert_eq!(body.statements.len(), 1);
            }
            other => panic!("expected for loop, got {:?}", other),
        }
    }

    #[test]
    fn test_continue_blocks_for_folding() {
        let out = run(counting_loop(true), &EmptyRegistry, JvmType::Void);
        assert_eq!(out.len(), 2);
        assert!(matches!(out[1], Statement::While { .. }));
    }

    #[test]
    fn test_boolean_ternary_in_return() {
        let c = Condition::compare(CompareOp::Gt, local(0), local(1));
        let ternary = Expr::Ternary {
            condition: Box::new(c.clone()),
            then_expr: Box::new(Expr::IntLiteral(0)),
            else_expr: Box::new(Expr::IntLiteral(1)),
        };
        let out = run(vec![Statement::Return(Some(ternary.clone()))], &EmptyRegistry, JvmType::Boolean);
        assert_eq!(out, vec![Statement::Return(Some(Expr::Condition(Box::new(c.invert()))))]);

        // int-returning methods keep the ternary
        let out = run(vec![Statement::Return(Some(ternary.clone()))], &EmptyRegistry, JvmType::Int);
        assert_eq!(out, vec![Statement::Return(Some(ternary))]);
    }

    #[test]
    fn test_accessor_calls_fold() {
        let count = FieldRef::new("Outer", "count", "I");
        let mut registry = ClassRegistry::new();
        registry.register_accessor(
            "Outer",
            "access$002",
            "(LOuter;I)I",
            AccessorTarget::FieldSet { field: count.clone(), field_type: JvmType::Int, is_static: false },
        );
        registry.register_accessor(
            "Outer",
            "access$000",
            "(LOuter;)I",
            AccessorTarget::FieldGet { field: count, field_type: JvmType::Int, is_static: false },
        );
        let call = |name: &str, descriptor: &str, args: Vec<Expr>| Expr::MethodCall {
            kind: InvokeKind::Static,
            object: None,
            class_name: "Outer".into(),
            method_name: name.into(),
            descriptor: descriptor.into(),
            args,
            return_type: JvmType::Int,
        };
        let out = run(
            vec![
                Statement::Expression(call("access$002", "(LOuter;I)I", vec![local(0), Expr::IntLiteral(3)])),
                Statement::Return(Some(call("access$000", "(LOuter;)I", vec![local(0)]))),
            ],
            &registry,
            JvmType::Int,
        );
        assert_eq!(
            out[0],
            Statement::FieldStore {
                object: Some(local(0)),
                class_name: "Outer".into(),
                field_name: "count".into(),
                field_type: JvmType::Int,
                value: Expr::IntLiteral(3),
            }
        );
        assert!(matches!(&out[1], Statement::Return(Some(Expr::FieldGet { field_name, .. })) if field_name == "count"));
    }

    #[test]
    fn test_trailing_void_return_is_elided() {
        let out = run(
            vec![Statement::Expression(Expr::IntLiteral(1)), Statement::Return(None)],
            &EmptyRegistry,
            JvmType::Void,
        );
        assert_eq!(out, vec![Statement::Expression(Expr::IntLiteral(1))]);
    }
}
