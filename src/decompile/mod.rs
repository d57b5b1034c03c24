//! Bytecode to statement-tree pipeline.
//!
//! A method's instruction stream is cut into a block graph ([`cfg`]), whose
//! blocks are simulated on an operand stack ([`stack_sim`]) while the
//! structuring engine ([`structuring`]) reduces them to nested control
//! constructs. [`desugar`] then restores source-level idioms.

pub mod cfg;
pub mod cfg_types;
mod class_decompiler;
mod cond_builder;
pub mod condition;
mod conditionals;
pub mod descriptor;
pub mod desugar;
mod display;
pub mod error;
pub mod expr;
pub mod locals;
mod loops;
pub mod registry;
pub mod simplify;
pub mod stack_sim;
pub mod structured_types;
mod structuring;
mod switches;
mod ternary;
mod try_catch;
pub mod visitor;

pub use self::class_decompiler::*;
pub use self::condition::Condition;
pub use self::descriptor::JvmType;
pub use self::error::{DecompileError, RoutineFailure};
pub use self::expr::Expr;
pub use self::locals::{LocalId, LocalTable, LocalVariable};
pub use self::registry::{AccessorTarget, ClassRegistry, EmptyRegistry, MethodSignature, Registry};
pub use self::structured_types::*;
pub use self::visitor::Visitor;
