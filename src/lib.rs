//! Structures [JVM method bytecode](https://docs.oracle.com/javase/specs/jvms/se10/html/jvms-6.html)
//! into statement and expression trees.
//!
//! The input is an already-decoded method (see [`MethodInfo`] and
//! [`code_attribute::MethodCode`]); the output is a [`decompile::MethodBody`]
//! holding a tree of structured statements plus the table of local variables.
//!
//! ```rust
//! use classfile_decompiler::code_attribute::{Instruction, MethodCode};
//! use classfile_decompiler::decompile::{Decompiler, EmptyRegistry};
//! use classfile_decompiler::{MethodAccessFlags, MethodInfo};
//!
//! let method = MethodInfo {
//!     name: "answer".into(),
//!     descriptor: "()I".into(),
//!     access_flags: MethodAccessFlags::STATIC,
//!     code: Some(MethodCode::sequential(vec![Instruction::Bipush(42), Instruction::Ireturn])),
//! };
//! let registry = EmptyRegistry;
//! let decompiler = Decompiler::new(&registry);
//! let outcome = decompiler.decompile_method("Example", &method);
//! let body = outcome.body().unwrap();
//! assert_eq!(body.body.statements.len(), 1);
//! ```

#[macro_use]
extern crate bitflags;

pub mod code_attribute;
pub mod constant_info;
pub mod method_info;

pub mod decompile;

pub mod types;

pub use method_info::*;
pub use types::*;
