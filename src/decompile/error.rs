use thiserror::Error;

/// Failure while decompiling one routine. Every variant is fatal for the
/// routine it was raised in and nothing else.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DecompileError {
    #[error("jump at offset {from} targets offset {target}, which starts no block")]
    MissingBlock { from: u32, target: u32 },
    #[error("exception table entry {start}..{end} -> {handler} does not fall on instruction boundaries")]
    MalformedExceptionTable { start: u32, end: u32, handler: u32 },
    #[error("malformed descriptor `{0}`")]
    MalformedDescriptor(String),
    #[error("operand stack underflow at offset {offset}")]
    StackUnderflow { offset: u32 },
    #[error("unsupported instruction `{mnemonic}` at offset {offset}")]
    UnsupportedInstruction { offset: u32, mnemonic: String },
    #[error("operand stack holds {found} values at offset {offset}, expected {expected}")]
    StackDepthMismatch { offset: u32, expected: usize, found: usize },
    #[error("conditional chain at offset {offset} does not converge on its body or join")]
    ConditionGraph { offset: u32 },
    #[error("conditional chain at offset {offset} has more than {limit} paths")]
    TooManyPaths { offset: u32, limit: usize },
    #[error("no region matches the blocks at offset {offset}")]
    Unstructured { offset: u32 },
    #[error("structuring gave up after {passes} passes")]
    PassLimit { passes: usize },
}

/// A [`DecompileError`] attached to the identity of the routine it broke.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[error("failed to decompile {class_name}.{method_name}{descriptor}: {error}")]
pub struct RoutineFailure {
    pub class_name: String,
    pub method_name: String,
    pub descriptor: String,
    #[source]
    pub error: DecompileError,
}
