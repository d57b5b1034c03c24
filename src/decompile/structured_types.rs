use super::condition::Condition;
use super::descriptor::JvmType;
use super::expr::Expr;
use super::locals::LocalId;

/// Identity of a breakable construct (loop or switch). Break and continue
/// statements name their target by id, never by reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoopId(pub u32);

/// What kind of region a statement block is the body of.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BlockRole {
    MethodBody,
    LoopBody,
    Then,
    Else,
    CaseBody,
    TryBody,
    CatchBody,
}

/// An ordered statement sequence tagged with its role.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatementBlock {
    pub role: BlockRole,
    pub statements: Vec<Statement>,
}

impl StatementBlock {
    pub fn new(role: BlockRole, statements: Vec<Statement>) -> Self {
        Self { role, statements }
    }

    pub fn from_sections(role: BlockRole, sections: Vec<Section>) -> Self {
        Self {
            role,
            statements: sections.into_iter().flat_map(Section::into_statements).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// One unit of sequential execution.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Statement {
    LocalStore { local: LocalId, value: Expr },
    FieldStore {
        object: Option<Expr>,
        class_name: String,
        field_name: String,
        field_type: JvmType,
        value: Expr,
    },
    ArrayStore { array: Expr, index: Expr, value: Expr },
    /// A call or constructor evaluated for its effect.
    Expression(Expr),
    Increment { local: LocalId, amount: i32 },
    Return(Option<Expr>),
    Throw(Expr),
    /// `monitorenter` / `monitorexit` outside a recognized synchronized block.
    Monitor { enter: bool, object: Expr },

    If {
        condition: Condition,
        then_block: StatementBlock,
        else_block: Option<StatementBlock>,
    },
    /// `condition: None` is an infinite loop.
    While {
        label: LoopId,
        condition: Option<Condition>,
        body: StatementBlock,
    },
    DoWhile {
        label: LoopId,
        body: StatementBlock,
        condition: Condition,
    },
    For {
        label: LoopId,
        init: Vec<Statement>,
        condition: Option<Condition>,
        update: Vec<Statement>,
        body: StatementBlock,
    },
    Switch {
        label: LoopId,
        key: Expr,
        cases: Vec<SwitchCase>,
    },
    TryCatch {
        body: StatementBlock,
        catches: Vec<CatchClause>,
    },
    /// `needs_label` is set when the target is not the innermost breakable
    /// construct.
    Break { target: LoopId, needs_label: bool },
    /// `needs_label` is set when the target is not the innermost loop.
    Continue { target: LoopId, needs_label: bool },
}

impl Statement {
    /// Nested statement blocks, in source order.
    pub fn blocks(&self) -> Vec<&StatementBlock> {
        match self {
            Statement::If { then_block, else_block, .. } => {
                std::iter::once(then_block).chain(else_block.iter()).collect()
            }
            Statement::While { body, .. }
            | Statement::DoWhile { body, .. }
            | Statement::For { body, .. } => vec![body],
            Statement::Switch { cases, .. } => cases.iter().map(|c| &c.body).collect(),
            Statement::TryCatch { body, catches } => std::iter::once(body)
                .chain(catches.iter().map(|c| &c.body))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn blocks_mut(&mut self) -> Vec<&mut StatementBlock> {
        match self {
            Statement::If { then_block, else_block, .. } => {
                std::iter::once(then_block).chain(else_block.iter_mut()).collect()
            }
            Statement::While { body, .. }
            | Statement::DoWhile { body, .. }
            | Statement::For { body, .. } => vec![body],
            Statement::Switch { cases, .. } => cases.iter_mut().map(|c| &mut c.body).collect(),
            Statement::TryCatch { body, catches } => std::iter::once(body)
                .chain(catches.iter_mut().map(|c| &mut c.body))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// The label of a breakable construct.
    pub fn label(&self) -> Option<LoopId> {
        match self {
            Statement::While { label, .. }
            | Statement::DoWhile { label, .. }
            | Statement::For { label, .. }
            | Statement::Switch { label, .. } => Some(*label),
            _ => None,
        }
    }

    /// True if control never continues with the next statement.
    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            Statement::Return(_) | Statement::Throw(_) | Statement::Break { .. } | Statement::Continue { .. }
        )
    }
}

/// A structured fragment produced by one structuring step.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Section {
    /// A straight-line run of simple statements.
    Linear(Vec<Statement>),
    /// One control construct.
    Construct(Statement),
}

impl Section {
    pub fn into_statements(self) -> Vec<Statement> {
        match self {
            Section::Linear(statements) => statements,
            Section::Construct(statement) => vec![statement],
        }
    }

    pub fn statements(&self) -> &[Statement] {
        match self {
            Section::Linear(statements) => statements,
            Section::Construct(statement) => std::slice::from_ref(statement),
        }
    }
}

/// Value for a switch case label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SwitchLabel {
    Value(i32),
    Default,
}

/// A switch case arm.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SwitchCase {
    pub labels: Vec<SwitchLabel>,
    pub body: StatementBlock,
    /// False when control falls into the next case.
    pub breaks: bool,
}

/// A catch clause in a try-catch.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CatchClause {
    /// Internal names of the caught classes; several for a multi-catch.
    pub exception_types: Vec<String>,
    pub local: LocalId,
    pub body: StatementBlock,
}
