use super::condition::Condition;
use super::descriptor::JvmType;
use super::locals::{LocalId, LocalTable};

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinOp {
    Add, Sub, Mul, Div, Rem,
    Shl, Shr, Ushr,
    And, Or, Xor,
}

impl BinOp {
    /// Java source token for this operator.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Ushr => ">>>",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
        }
    }

    /// Java binding strength; larger binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Mul | BinOp::Div | BinOp::Rem => 12,
            BinOp::Add | BinOp::Sub => 11,
            BinOp::Shl | BinOp::Shr | BinOp::Ushr => 10,
            BinOp::And => 7,
            BinOp::Xor => 6,
            BinOp::Or => 5,
        }
    }
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UnaryOp {
    Neg,
}

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompareOp {
    Eq, Ne, Lt, Ge, Gt, Le,
}

impl CompareOp {
    /// Returns the negated comparison.
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Ge => CompareOp::Lt,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Le => CompareOp::Gt,
        }
    }

    /// True for the operator of each negation pair that names the atom.
    pub fn is_canonical(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Lt | CompareOp::Gt)
    }

    /// Java source token for this operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
        }
    }
}

/// Method invocation kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

/// Compare instruction kinds (for lcmp, fcmpl, etc.)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CmpKind {
    LCmp,
    FCmpL,
    FCmpG,
    DCmpL,
    DCmpG,
}

/// Expression tree node -- represents a value-producing computation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Expr {
    // --- Literals ---
    IntLiteral(i32),
    LongLiteral(i64),
    FloatLiteral(f32),
    DoubleLiteral(f64),
    StringLiteral(String),
    ClassLiteral(String),
    NullLiteral,

    // --- Variables ---
    Local(LocalId),
    This,
    /// The exception object on entry to a handler, before it is bound.
    CaughtException(String),

    // --- Operations ---
    BinaryOp { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    UnaryOp { op: UnaryOp, operand: Box<Expr> },
    Cast { target_type: JvmType, operand: Box<Expr> },
    Instanceof { operand: Box<Expr>, check_type: String },

    // --- Field access ---
    FieldGet {
        object: Option<Box<Expr>>,
        class_name: String,
        field_name: String,
        field_type: JvmType,
    },

    // --- Method invocation ---
    MethodCall {
        kind: InvokeKind,
        object: Option<Box<Expr>>,
        class_name: String,
        method_name: String,
        descriptor: String,
        args: Vec<Expr>,
        return_type: JvmType,
    },

    // --- Object creation ---
    New {
        class_name: String,
        constructor_descriptor: String,
        args: Vec<Expr>,
    },
    NewArray { element_type: JvmType, length: Box<Expr> },
    /// `array_type` is the full type of the created array.
    NewMultiArray { array_type: JvmType, dimensions: Vec<Expr> },
    ArrayLength { array: Box<Expr> },
    ArrayLoad { array: Box<Expr>, index: Box<Expr>, element_type: JvmType },

    /// Result of lcmp/fcmpl/fcmpg/dcmpl/dcmpg: -1, 0, or 1
    CmpResult { kind: CmpKind, left: Box<Expr>, right: Box<Expr> },

    // --- invokedynamic (lambdas, string concatenation) ---
    InvokeDynamic {
        bootstrap_index: u16,
        method_name: String,
        descriptor: String,
        captures: Vec<Expr>,
        return_type: JvmType,
    },

    // --- Synthesized during structuring ---
    Ternary { condition: Box<Condition>, then_expr: Box<Expr>, else_expr: Box<Expr> },
    /// A boolean-valued condition used as a value.
    Condition(Box<Condition>),

    /// Marker for an uninitialized `new` before <init> is called. `site` is
    /// the offset of the `new` instruction.
    UninitNew { class_name: String, site: u32 },
}

impl Expr {
    /// The statically inferred type of this expression.
    pub fn ty(&self, locals: &LocalTable) -> JvmType {
        match self {
            Expr::IntLiteral(_) => JvmType::Int,
            Expr::LongLiteral(_) => JvmType::Long,
            Expr::FloatLiteral(_) => JvmType::Float,
            Expr::DoubleLiteral(_) => JvmType::Double,
            Expr::StringLiteral(_) => JvmType::Reference("java/lang/String".into()),
            Expr::ClassLiteral(_) => JvmType::Reference("java/lang/Class".into()),
            Expr::NullLiteral => JvmType::Null,
            Expr::Local(id) => locals.ty(*id),
            Expr::This => locals.this_type(),
            Expr::CaughtException(class_name) => JvmType::Reference(class_name.clone()),
            Expr::BinaryOp { op, left, right } => {
                let left_ty = left.ty(locals);
                match op {
                    BinOp::Shl | BinOp::Shr | BinOp::Ushr => left_ty,
                    _ if left_ty == JvmType::Unknown => right.ty(locals),
                    _ => left_ty,
                }
            }
            Expr::UnaryOp { operand, .. } => operand.ty(locals),
            Expr::Cast { target_type, .. } => target_type.clone(),
            Expr::Instanceof { .. } => JvmType::Boolean,
            Expr::FieldGet { field_type, .. } => field_type.clone(),
            Expr::MethodCall { return_type, .. } => return_type.clone(),
            Expr::New { class_name, .. } | Expr::UninitNew { class_name, .. } => {
                JvmType::Reference(class_name.clone())
            }
            Expr::NewArray { element_type, .. } => JvmType::Array(Box::new(element_type.clone())),
            Expr::NewMultiArray { array_type, .. } => array_type.clone(),
            Expr::ArrayLength { .. } => JvmType::Int,
            Expr::ArrayLoad { array, element_type, .. } => match array.ty(locals) {
                JvmType::Array(inner) => *inner,
                _ => element_type.clone(),
            },
            Expr::CmpResult { .. } => JvmType::Int,
            Expr::InvokeDynamic { return_type, .. } => return_type.clone(),
            Expr::Ternary { then_expr, else_expr, .. } => match then_expr.ty(locals) {
                JvmType::Null | JvmType::Unknown => else_expr.ty(locals),
                ty => ty,
            },
            Expr::Condition(_) => JvmType::Boolean,
        }
    }

    /// Values that can be duplicated on the operand stack without
    /// re-evaluating anything observable.
    pub fn is_trivial(&self) -> bool {
        matches!(
            self,
            Expr::IntLiteral(_)
                | Expr::LongLiteral(_)
                | Expr::FloatLiteral(_)
                | Expr::DoubleLiteral(_)
                | Expr::StringLiteral(_)
                | Expr::ClassLiteral(_)
                | Expr::NullLiteral
                | Expr::Local(_)
                | Expr::This
                | Expr::CaughtException(_)
        )
    }

    /// True if `pred` holds for this expression or any expression nested in
    /// it, including the operands of embedded conditions.
    pub fn any(&self, pred: &dyn Fn(&Expr) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        match self {
            Expr::Ternary { condition, .. } | Expr::Condition(condition)
                if condition.exprs().iter().any(|e| e.any(pred)) =>
            {
                true
            }
            other => other.children().any(|child| child.any(pred)),
        }
    }

    /// Does evaluating this expression run code (calls, constructors)?
    pub fn has_side_effects(&self) -> bool {
        self.any(&|e| {
            matches!(
                e,
                Expr::MethodCall { .. } | Expr::New { .. } | Expr::InvokeDynamic { .. }
            )
        })
    }

    /// Does this expression read local `id`?
    pub fn reads_local(&self, id: LocalId) -> bool {
        self.any(&|e| *e == Expr::Local(id))
    }

    /// Does this expression read the named field?
    pub fn reads_field(&self, class_name: &str, field_name: &str) -> bool {
        self.any(&|e| {
            matches!(e, Expr::FieldGet { class_name: c, field_name: f, .. }
                if c == class_name && f == field_name)
        })
    }

    /// Does this expression read any array element?
    pub fn reads_array(&self) -> bool {
        self.any(&|e| matches!(e, Expr::ArrayLoad { .. }))
    }

    /// Direct sub-expressions, not descending into conditions.
    pub fn children(&self) -> impl Iterator<Item = &Expr> {
        let children: Vec<&Expr> = match self {
            Expr::BinaryOp { left, right, .. } | Expr::CmpResult { left, right, .. } => {
                vec![&**left, &**right]
            }
            Expr::UnaryOp { operand, .. }
            | Expr::Cast { operand, .. }
            | Expr::Instanceof { operand, .. } => vec![&**operand],
            Expr::FieldGet { object, .. } => object.iter().map(|o| o.as_ref()).collect(),
            Expr::MethodCall { object, args, .. } => object
                .iter()
                .map(|o| o.as_ref())
                .chain(args.iter())
                .collect(),
            Expr::New { args, .. } => args.iter().collect(),
            Expr::NewArray { length, .. } => vec![&**length],
            Expr::NewMultiArray { dimensions, .. } => dimensions.iter().collect(),
            Expr::ArrayLength { array } => vec![&**array],
            Expr::ArrayLoad { array, index, .. } => vec![&**array, &**index],
            Expr::InvokeDynamic { captures, .. } => captures.iter().collect(),
            Expr::Ternary { then_expr, else_expr, .. } => vec![&**then_expr, &**else_expr],
            _ => Vec::new(),
        };
        children.into_iter()
    }
}
