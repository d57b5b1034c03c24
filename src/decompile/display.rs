//! Java-like text for expressions and conditions, for diagnostics and tests.
//! Statement layout and formatting options belong to the renderer that
//! consumes the tree, not here.

use std::fmt::{self, Display, Formatter, Write};

use super::condition::Condition;
use super::descriptor::simple_class_name;
use super::expr::{CompareOp, Expr, InvokeKind, UnaryOp};
use super::locals::LocalTable;

const ATOM: u8 = 15;
const PREFIX: u8 = 13;
const RELATIONAL: u8 = 9;
const EQUALITY: u8 = 8;
const AND: u8 = 4;
const OR: u8 = 3;
const TERNARY: u8 = 2;

/// A tree node paired with the local table that names its variables.
pub struct Displayed<'a, T> {
    node: &'a T,
    locals: &'a LocalTable,
}

impl Expr {
    pub fn display<'a>(&'a self, locals: &'a LocalTable) -> Displayed<'a, Expr> {
        Displayed { node: self, locals }
    }
}

impl Condition {
    pub fn display<'a>(&'a self, locals: &'a LocalTable) -> Displayed<'a, Condition> {
        Displayed { node: self, locals }
    }
}

impl Display for Displayed<'_, Expr> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_expr(f, self.node, self.locals, 0)
    }
}

impl Display for Displayed<'_, Condition> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_condition(f, self.node, self.locals, 0)
    }
}

fn expr_precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::BinaryOp { op, .. } => op.precedence(),
        Expr::UnaryOp { .. } | Expr::Cast { .. } => PREFIX,
        Expr::Instanceof { .. } => RELATIONAL,
        Expr::Ternary { .. } => TERNARY,
        Expr::Condition(condition) => condition_precedence(condition),
        _ => ATOM,
    }
}

fn condition_precedence(condition: &Condition) -> u8 {
    match condition {
        Condition::Test { negated: true, .. } | Condition::Not(_) => PREFIX,
        Condition::Test { expr, .. } => expr_precedence(expr),
        Condition::Compare { op: CompareOp::Eq | CompareOp::Ne, .. } => EQUALITY,
        Condition::Compare { .. } => RELATIONAL,
        Condition::And(_) => AND,
        Condition::Or(_) => OR,
    }
}

fn write_args(f: &mut Formatter<'_>, args: &[Expr], locals: &LocalTable) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write_expr(f, arg, locals, 0)?;
    }
    Ok(())
}

fn write_expr(f: &mut Formatter<'_>, expr: &Expr, locals: &LocalTable, min: u8) -> fmt::Result {
    let precedence = expr_precedence(expr);
    if precedence < min {
        f.write_char('(')?;
        write_expr(f, expr, locals, 0)?;
        return f.write_char(')');
    }
    match expr {
        Expr::IntLiteral(v) => write!(f, "{}", v),
        Expr::LongLiteral(v) => write!(f, "{}L", v),
        Expr::FloatLiteral(v) if v.is_nan() => f.write_str("Float.NaN"),
        Expr::FloatLiteral(v) => write!(f, "{:?}f", v),
        Expr::DoubleLiteral(v) if v.is_nan() => f.write_str("Double.NaN"),
        Expr::DoubleLiteral(v) => write!(f, "{:?}", v),
        Expr::StringLiteral(s) => write!(f, "\"{}\"", s.escape_default()),
        Expr::ClassLiteral(name) => write!(f, "{}.class", simple_class_name(name)),
        Expr::NullLiteral => f.write_str("null"),
        Expr::Local(id) => f.write_str(locals.name(*id)),
        Expr::This => f.write_str("this"),
        Expr::CaughtException(_) => f.write_str("<caught>"),
        Expr::BinaryOp { op, left, right } => {
            write_expr(f, left, locals, precedence)?;
            write!(f, " {} ", op.symbol())?;
            write_expr(f, right, locals, precedence + 1)
        }
        Expr::UnaryOp { op: UnaryOp::Neg, operand } => {
            f.write_char('-')?;
            write_expr(f, operand, locals, PREFIX)
        }
        Expr::Cast { target_type, operand } => {
            write!(f, "({})", target_type.simple_name())?;
            write_expr(f, operand, locals, PREFIX)
        }
        Expr::Instanceof { operand, check_type } => {
            write_expr(f, operand, locals, RELATIONAL)?;
            write!(f, " instanceof {}", simple_class_name(check_type))
        }
        Expr::FieldGet { object, class_name, field_name, .. } => {
            match object {
                Some(object) => write_expr(f, object, locals, ATOM)?,
                None => f.write_str(simple_class_name(class_name))?,
            }
            write!(f, ".{}", field_name)
        }
        Expr::MethodCall { kind, object, class_name, method_name, args, .. } => {
            match (kind, object) {
                (InvokeKind::Static, _) | (_, None) => f.write_str(simple_class_name(class_name))?,
                (_, Some(object)) => write_expr(f, object, locals, ATOM)?,
            }
            write!(f, ".{}(", method_name)?;
            write_args(f, args, locals)?;
            f.write_char(')')
        }
        Expr::New { class_name, args, .. } => {
            write!(f, "new {}(", simple_class_name(class_name))?;
            write_args(f, args, locals)?;
            f.write_char(')')
        }
        Expr::NewArray { element_type, length } => {
            write!(f, "new {}[", element_type.simple_name())?;
            write_expr(f, length, locals, 0)?;
            f.write_char(']')
        }
        Expr::NewMultiArray { array_type, dimensions } => {
            let mut element = array_type.simple_name();
            for _ in 0..dimensions.len() {
                element = element.strip_suffix("[]").unwrap_or(&element).to_string();
            }
            write!(f, "new {}", element)?;
            for dimension in dimensions {
                f.write_char('[')?;
                write_expr(f, dimension, locals, 0)?;
                f.write_char(']')?;
            }
            Ok(())
        }
        Expr::ArrayLength { array } => {
            write_expr(f, array, locals, ATOM)?;
            f.write_str(".length")
        }
        Expr::ArrayLoad { array, index, .. } => {
            write_expr(f, array, locals, ATOM)?;
            f.write_char('[')?;
            write_expr(f, index, locals, 0)?;
            f.write_char(']')
        }
        Expr::CmpResult { left, right, .. } => {
            f.write_str("compare(")?;
            write_expr(f, left, locals, 0)?;
            f.write_str(", ")?;
            write_expr(f, right, locals, 0)?;
            f.write_char(')')
        }
        Expr::InvokeDynamic { method_name, captures, .. } => {
            write!(f, "{}<dynamic>(", method_name)?;
            write_args(f, captures, locals)?;
            f.write_char(')')
        }
        Expr::Ternary { condition, then_expr, else_expr } => {
            write_condition(f, condition, locals, TERNARY + 1)?;
            f.write_str(" ? ")?;
            write_expr(f, then_expr, locals, TERNARY + 1)?;
            f.write_str(" : ")?;
            write_expr(f, else_expr, locals, TERNARY)
        }
        Expr::Condition(condition) => write_condition(f, condition, locals, min),
        Expr::UninitNew { class_name, .. } => write!(f, "new {}", simple_class_name(class_name)),
    }
}

fn write_condition(f: &mut Formatter<'_>, condition: &Condition, locals: &LocalTable, min: u8) -> fmt::Result {
    let precedence = condition_precedence(condition);
    if precedence < min {
        f.write_char('(')?;
        write_condition(f, condition, locals, 0)?;
        return f.write_char(')');
    }
    match condition {
        Condition::Test { expr, negated: false } => write_expr(f, expr, locals, min),
        Condition::Test { expr, negated: true } => {
            f.write_char('!')?;
            write_expr(f, expr, locals, PREFIX)
        }
        Condition::Compare { op, left, right } => {
            write_expr(f, left, locals, precedence)?;
            write!(f, " {} ", op.as_str())?;
            write_expr(f, right, locals, precedence + 1)
        }
        Condition::And(operands) | Condition::Or(operands) => {
            let separator = if precedence == AND { " && " } else { " || " };
            for (i, operand) in operands.iter().enumerate() {
                if i > 0 {
                    f.write_str(separator)?;
                }
                write_condition(f, operand, locals, precedence + 1)?;
            }
            Ok(())
        }
        Condition::Not(inner) => {
            f.write_char('!')?;
            write_condition(f, inner, locals, PREFIX)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompile::expr::BinOp;
    use crate::decompile::locals::{LocalId, LocalKind, LocalVariable};
    use crate::decompile::descriptor::JvmType;

    fn table() -> LocalTable {
        LocalTable {
            variables: ["a", "b"]
                .iter()
                .enumerate()
                .map(|(i, name)| LocalVariable {
                    id: LocalId(i as u32),
                    slot: Some(i as u16),
                    name: name.to_string(),
                    ty: JvmType::Int,
                    start_pc: 0,
                    end_pc: 10,
                    kind: LocalKind::Parameter,
                })
                .collect(),
        }
    }

    #[test]
    fn test_binary_precedence() {
        let locals = table();
        let sum = Expr::BinaryOp {
            op: BinOp::Add,
            left: Box::new(Expr::Local(LocalId(0))),
            right: Box::new(Expr::Local(LocalId(1))),
        };
        let product = Expr::BinaryOp {
            op: BinOp::Mul,
            left: Box::new(sum.clone()),
            right: Box::new(Expr::IntLiteral(2)),
        };
        assert_eq!(product.display(&locals).to_string(), "(a + b) * 2");
        let difference = Expr::BinaryOp {
            op: BinOp::Sub,
            left: Box::new(Expr::IntLiteral(1)),
            right: Box::new(sum),
        };
        assert_eq!(difference.display(&locals).to_string(), "1 - (a + b)");
    }

    #[test]
    fn test_condition_grouping() {
        let locals = table();
        let a = Condition::test(Expr::Local(LocalId(0)));
        let b = Condition::compare(CompareOp::Lt, Expr::Local(LocalId(1)), Expr::IntLiteral(5));
        let c = Condition::and(vec![Condition::or(vec![a.clone(), b.clone()]), a.invert()]);
        assert_eq!(c.display(&locals).to_string(), "(a || b < 5) && !a");
    }
}
