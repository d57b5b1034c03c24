//! Read-only lookup of member signatures across the classes being decompiled.
//!
//! A registry is filled in a registration phase, before any method body is
//! decompiled, and then shared by reference with every decompilation.

use std::collections::HashMap;

use tracing::trace;

use crate::code_attribute::Instruction;
use crate::constant_info::{FieldRef, MethodRef};
use crate::method_info::MethodInfo;
use crate::types::ClassInfo;

use super::descriptor::{parse_method_descriptor, parse_type_descriptor, JvmType};
use super::expr::InvokeKind;

/// Declared signature of a method.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodSignature {
    pub parameters: Vec<JvmType>,
    pub return_type: JvmType,
    pub is_static: bool,
}

/// The member a synthetic accessor method stands for.
#[derive(Clone, Debug, PartialEq)]
pub enum AccessorTarget {
    /// The accessor reads a field; instance fields take the object as the
    /// first argument.
    FieldGet { field: FieldRef, field_type: JvmType, is_static: bool },
    /// The accessor writes its last argument to a field.
    FieldSet { field: FieldRef, field_type: JvmType, is_static: bool },
    /// The accessor forwards its arguments to a method.
    Method { kind: InvokeKind, method: MethodRef },
}

pub trait Registry: Sync {
    /// Declared signature of a method, if its class is registered.
    fn method(&self, class_name: &str, name: &str, descriptor: &str) -> Option<MethodSignature>;

    /// The member behind a synthetic accessor method.
    fn accessor(&self, class_name: &str, name: &str, descriptor: &str) -> Option<AccessorTarget>;
}

/// A registry that knows nothing; every lookup falls back to descriptors.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyRegistry;

impl Registry for EmptyRegistry {
    fn method(&self, _: &str, _: &str, _: &str) -> Option<MethodSignature> {
        None
    }

    fn accessor(&self, _: &str, _: &str, _: &str) -> Option<AccessorTarget> {
        None
    }
}

type MemberKey = (String, String, String);

fn key(class_name: &str, name: &str, descriptor: &str) -> MemberKey {
    (class_name.to_string(), name.to_string(), descriptor.to_string())
}

/// In-memory registry populated from class member lists.
#[derive(Clone, Debug, Default)]
pub struct ClassRegistry {
    methods: HashMap<MemberKey, MethodSignature>,
    accessors: HashMap<MemberKey, AccessorTarget>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every method of `class`, and every synthetic accessor whose
    /// body is a plain field access or forwarding call.
    pub fn register_class(&mut self, class: &ClassInfo) {
        for method in &class.methods {
            let Some((parameters, return_type)) = parse_method_descriptor(&method.descriptor) else {
                trace!(class = %class.name, method = %method.name, "skipping method with malformed descriptor");
                continue;
            };
            self.methods.insert(
                key(&class.name, &method.name, &method.descriptor),
                MethodSignature {
                    parameters,
                    return_type,
                    is_static: method.is_static(),
                },
            );
            if method.is_synthetic_accessor() {
                if let Some(target) = detect_accessor(method) {
                    self.register_accessor(&class.name, &method.name, &method.descriptor, target);
                }
            }
        }
    }

    pub fn register_accessor(&mut self, class_name: &str, name: &str, descriptor: &str, target: AccessorTarget) {
        self.accessors.insert(key(class_name, name, descriptor), target);
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl Registry for ClassRegistry {
    fn method(&self, class_name: &str, name: &str, descriptor: &str) -> Option<MethodSignature> {
        self.methods.get(&key(class_name, name, descriptor)).cloned()
    }

    fn accessor(&self, class_name: &str, name: &str, descriptor: &str) -> Option<AccessorTarget> {
        self.accessors.get(&key(class_name, name, descriptor)).cloned()
    }
}

fn is_load(instr: &Instruction) -> bool {
    matches!(
        instr,
        Instruction::Iload(_)
            | Instruction::Lload(_)
            | Instruction::Fload(_)
            | Instruction::Dload(_)
            | Instruction::Aload(_)
    )
}

fn is_return(instr: &Instruction) -> bool {
    matches!(
        instr,
        Instruction::Ireturn
            | Instruction::Lreturn
            | Instruction::Freturn
            | Instruction::Dreturn
            | Instruction::Areturn
            | Instruction::Return
    )
}

/// Recognizes `load*; <member access>; [dup]; return` accessor bodies.
fn detect_accessor(method: &MethodInfo) -> Option<AccessorTarget> {
    let code = method.code.as_ref()?;
    let body: Vec<&Instruction> = code
        .instructions
        .iter()
        .map(|i| &i.instruction)
        .filter(|i| !matches!(i, Instruction::Dup | Instruction::Dupx1 | Instruction::Dup2x1))
        .collect();
    let (last, rest) = body.split_last()?;
    let (core, loads) = rest.split_last()?;
    if !is_return(last) || !loads.iter().all(|i| is_load(i)) {
        return None;
    }
    let field_type = |field: &FieldRef| parse_type_descriptor(&field.descriptor).unwrap_or(JvmType::Unknown);
    let target = match (*core, loads.len()) {
        (Instruction::Getstatic(field), 0) => AccessorTarget::FieldGet {
            field: field.clone(),
            field_type: field_type(field),
            is_static: true,
        },
        (Instruction::Getfield(field), 1) => AccessorTarget::FieldGet {
            field: field.clone(),
            field_type: field_type(field),
            is_static: false,
        },
        (Instruction::Putstatic(field), 1) => AccessorTarget::FieldSet {
            field: field.clone(),
            field_type: field_type(field),
            is_static: true,
        },
        (Instruction::Putfield(field), 2) => AccessorTarget::FieldSet {
            field: field.clone(),
            field_type: field_type(field),
            is_static: false,
        },
        (Instruction::Invokestatic(method), _) => AccessorTarget::Method {
            kind: InvokeKind::Static,
            method: method.clone(),
        },
        (Instruction::Invokevirtual(method), _) => AccessorTarget::Method {
            kind: InvokeKind::Virtual,
            method: method.clone(),
        },
        (Instruction::Invokespecial(method), _) if method.name != "<init>" => AccessorTarget::Method {
            kind: InvokeKind::Special,
            method: method.clone(),
        },
        (Instruction::Invokeinterface(method), _) => AccessorTarget::Method {
            kind: InvokeKind::Interface,
            method: method.clone(),
        },
        _ => return None,
    };
    Some(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_attribute::MethodCode;
    use crate::method_info::MethodAccessFlags;
    use crate::types::ClassAccessFlags;

    fn accessor(name: &str, descriptor: &str, body: Vec<Instruction>) -> MethodInfo {
        MethodInfo {
            name: name.into(),
            descriptor: descriptor.into(),
            access_flags: MethodAccessFlags::STATIC | MethodAccessFlags::SYNTHETIC,
            code: Some(MethodCode::sequential(body)),
        }
    }

    #[test]
    fn test_register_detects_accessors() {
        let count = FieldRef::new("Outer", "count", "I");
        let class = ClassInfo {
            name: "Outer".into(),
            super_name: Some("java/lang/Object".into()),
            access_flags: ClassAccessFlags::PUBLIC,
            methods: vec![
                accessor(
                    "access$000",
                    "(LOuter;)I",
                    vec![Instruction::Aload(0), Instruction::Getfield(count.clone()), Instruction::Ireturn],
                ),
                accessor(
                    "access$002",
                    "(LOuter;I)I",
                    vec![
                        Instruction::Aload(0),
                        Instruction::Iload(1),
                        Instruction::Dupx1,
                        Instruction::Putfield(count.clone()),
                        Instruction::Ireturn,
                    ],
                ),
            ],
        };
        let mut registry = ClassRegistry::new();
        registry.register_class(&class);
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.accessor("Outer", "access$000", "(LOuter;)I"),
            Some(AccessorTarget::FieldGet { field: count.clone(), field_type: JvmType::Int, is_static: false })
        );
        assert_eq!(
            registry.accessor("Outer", "access$002", "(LOuter;I)I"),
            Some(AccessorTarget::FieldSet { field: count, field_type: JvmType::Int, is_static: false })
        );
        let signature = registry.method("Outer", "access$000", "(LOuter;)I").unwrap();
        assert!(signature.is_static);
        assert_eq!(signature.parameters, vec![JvmType::Reference("Outer".into())]);
    }
}
