//! Live-range tracking for local variable slots.
//!
//! One slot can hold several source variables over the life of a method.
//! Every declared live range (from the `LocalVariableTable`) and every
//! inferred re-use of a slot with a different type becomes its own
//! [`LocalVariable`], addressed by a stable [`LocalId`].

use std::collections::HashMap;

use tracing::trace;

use crate::code_attribute::MethodCode;

use super::descriptor::{parse_type_descriptor, JvmType};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocalId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LocalKind {
    This,
    Parameter,
    /// Named by the local variable table.
    Declared,
    /// Slot use without table coverage.
    Synthetic,
    /// Binding of a caught exception.
    Exception,
    /// Introduced by the decompiler to preserve evaluation order.
    Temporary,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocalVariable {
    pub id: LocalId,
    /// `None` for temporaries, which live in no slot.
    pub slot: Option<u16>,
    pub name: String,
    pub ty: JvmType,
    pub start_pc: u32,
    pub end_pc: u32,
    pub kind: LocalKind,
}

impl LocalVariable {
    fn covers(&self, slot: u16, pc: u32) -> bool {
        self.slot == Some(slot) && self.start_pc <= pc && pc < self.end_pc
    }
}

/// The finished variable table of one method.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocalTable {
    pub variables: Vec<LocalVariable>,
}

impl LocalTable {
    pub fn get(&self, id: LocalId) -> Option<&LocalVariable> {
        self.variables.get(id.0 as usize)
    }

    pub fn name(&self, id: LocalId) -> &str {
        self.get(id).map(|v| v.name.as_str()).unwrap_or("<unknown>")
    }

    pub fn ty(&self, id: LocalId) -> JvmType {
        self.get(id).map(|v| v.ty.clone()).unwrap_or(JvmType::Unknown)
    }

    pub fn this_type(&self) -> JvmType {
        self.variables
            .iter()
            .find(|v| v.kind == LocalKind::This)
            .map(|v| v.ty.clone())
            .unwrap_or(JvmType::Unknown)
    }

    pub fn find(&self, name: &str) -> Option<&LocalVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalVariable> {
        self.variables.iter()
    }

    fn push(&mut self, mut variable: LocalVariable) -> LocalId {
        let id = LocalId(self.variables.len() as u32);
        variable.id = id;
        self.variables.push(variable);
        id
    }
}

/// Resolves slot accesses to variables while a method is being simulated.
#[derive(Debug)]
pub struct Locals {
    table: LocalTable,
    /// Most recent binding of each slot not covered by the table.
    current: HashMap<u16, LocalId>,
    /// Number of instances created so far per slot, for naming.
    instances: HashMap<u16, u32>,
    this_id: Option<LocalId>,
    code_length: u32,
    temporaries: u32,
}

impl Locals {
    pub fn new(code: &MethodCode, class_name: &str, params: &[JvmType], is_static: bool) -> Self {
        let mut locals = Locals {
            table: LocalTable::default(),
            current: HashMap::new(),
            instances: HashMap::new(),
            this_id: None,
            code_length: code.code_length,
            temporaries: 0,
        };
        let whole = |slot: u16| {
            code.local_variable_table
                .iter()
                .find(|item| item.index == slot && item.start_pc == 0)
        };

        let mut slot = 0u16;
        if !is_static {
            let id = locals.table.push(LocalVariable {
                id: LocalId(0),
                slot: Some(0),
                name: "this".into(),
                ty: JvmType::Reference(class_name.to_string()),
                start_pc: 0,
                end_pc: code.code_length,
                kind: LocalKind::This,
            });
            locals.this_id = Some(id);
            slot = 1;
        }
        for param in params {
            let name = whole(slot)
                .map(|item| item.name.clone())
                .unwrap_or_else(|| format!("param{}", slot));
            locals.table.push(LocalVariable {
                id: LocalId(0),
                slot: Some(slot),
                name,
                ty: param.clone(),
                start_pc: 0,
                end_pc: code.code_length,
                kind: LocalKind::Parameter,
            });
            slot += if param.is_wide() { 2 } else { 1 };
        }
        let first_free = slot;

        for item in &code.local_variable_table {
            if item.index < first_free && item.start_pc == 0 {
                continue;
            }
            locals.table.push(LocalVariable {
                id: LocalId(0),
                slot: Some(item.index),
                name: item.name.clone(),
                ty: parse_type_descriptor(&item.descriptor).unwrap_or(JvmType::Unknown),
                start_pc: item.start_pc,
                end_pc: item.start_pc.saturating_add(item.length),
                kind: LocalKind::Declared,
            });
        }
        locals
    }

    pub fn table(&self) -> &LocalTable {
        &self.table
    }

    pub fn into_table(self) -> LocalTable {
        self.table
    }

    pub fn is_this(&self, id: LocalId) -> bool {
        self.this_id == Some(id)
    }

    fn declared_at(&self, slot: u16, pc: u32) -> Option<LocalId> {
        self.table
            .variables
            .iter()
            .filter(|v| matches!(v.kind, LocalKind::This | LocalKind::Parameter | LocalKind::Declared))
            .find(|v| v.covers(slot, pc))
            .map(|v| v.id)
    }

    /// The variable read by a load of `slot` at `pc`.
    pub fn load(&mut self, slot: u16, pc: u32, hint: JvmType) -> LocalId {
        if let Some(id) = self.declared_at(slot, pc) {
            return id;
        }
        if let Some(&id) = self.current.get(&slot) {
            return id;
        }
        self.bind_new(slot, pc, hint, LocalKind::Synthetic)
    }

    /// The variable written by a store to `slot` at `pc`. The table names a
    /// variable from the instruction after its initializing store, so `next_pc`
    /// is consulted too. A store whose type does not fit the slot's current
    /// binding starts a new variable.
    pub fn store(&mut self, slot: u16, pc: u32, next_pc: u32, hint: JvmType, value_ty: JvmType) -> LocalId {
        if let Some(id) = self
            .declared_at(slot, pc)
            .or_else(|| self.declared_at(slot, next_pc))
        {
            self.refine(id, &value_ty);
            return id;
        }
        let ty = if value_ty.same_category(&hint) && value_ty.kind() != super::descriptor::TypeKind::Unknown && value_ty != JvmType::Null {
            value_ty
        } else {
            hint
        };
        if let Some(&id) = self.current.get(&slot) {
            if self.table.ty(id).same_category(&ty) {
                self.refine(id, &ty);
                return id;
            }
        }
        self.bind_new(slot, pc, ty, LocalKind::Synthetic)
    }

    /// Binds a caught exception stored into `slot`; always a new variable
    /// unless the table declares one.
    pub fn store_exception(&mut self, slot: u16, pc: u32, next_pc: u32, class_name: &str) -> LocalId {
        let ty = JvmType::Reference(class_name.to_string());
        let id = match self
            .declared_at(slot, pc)
            .or_else(|| self.declared_at(slot, next_pc))
        {
            Some(id) => id,
            None => self.bind_new(slot, pc, ty, LocalKind::Exception),
        };
        if let Some(variable) = self.table.variables.get_mut(id.0 as usize) {
            variable.kind = LocalKind::Exception;
        }
        id
    }

    /// A fresh exception binding for a handler that discards its exception.
    pub fn exception_temporary(&mut self, class_name: &str) -> LocalId {
        self.temporaries += 1;
        self.table.push(LocalVariable {
            id: LocalId(0),
            slot: None,
            name: format!("ex{}", self.temporaries),
            ty: JvmType::Reference(class_name.to_string()),
            start_pc: 0,
            end_pc: self.code_length,
            kind: LocalKind::Exception,
        })
    }

    /// A fresh slot-less temporary.
    pub fn temporary(&mut self, ty: JvmType) -> LocalId {
        self.temporaries += 1;
        self.table.push(LocalVariable {
            id: LocalId(0),
            slot: None,
            name: format!("tmp{}", self.temporaries),
            ty,
            start_pc: 0,
            end_pc: self.code_length,
            kind: LocalKind::Temporary,
        })
    }

    fn refine(&mut self, id: LocalId, ty: &JvmType) {
        if let Some(variable) = self.table.variables.get_mut(id.0 as usize) {
            if variable.ty == JvmType::Unknown && *ty != JvmType::Unknown && *ty != JvmType::Null {
                variable.ty = ty.clone();
            }
        }
    }

    fn bind_new(&mut self, slot: u16, pc: u32, ty: JvmType, kind: LocalKind) -> LocalId {
        let count = self.instances.entry(slot).or_insert(0);
        *count += 1;
        let name = if *count == 1 {
            format!("local{}", slot)
        } else {
            format!("local{}_{}", slot, count)
        };
        trace!(slot, pc, %name, "binding new local");
        let id = self.table.push(LocalVariable {
            id: LocalId(0),
            slot: Some(slot),
            name,
            ty,
            start_pc: pc,
            end_pc: self.code_length,
            kind,
        });
        self.current.insert(slot, id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_attribute::{Instruction, LocalVariableTableItem};

    fn code_with_table(items: Vec<LocalVariableTableItem>) -> MethodCode {
        MethodCode::sequential(vec![Instruction::Nop; 10]).with_local_variables(items)
    }

    #[test]
    fn test_parameters_are_prebound() {
        let code = code_with_table(vec![]);
        let mut locals = Locals::new(&code, "Foo", &[JvmType::Long, JvmType::Int], false);
        let this = locals.load(0, 0, JvmType::Unknown);
        assert!(locals.is_this(this));
        let wide = locals.load(1, 3, JvmType::Long);
        let int = locals.load(3, 3, JvmType::Int);
        assert_eq!(locals.table().name(wide), "param1");
        assert_eq!(locals.table().name(int), "param3");
    }

    #[test]
    fn test_declared_ranges_are_distinct_variables() {
        let code = code_with_table(vec![
            LocalVariableTableItem { start_pc: 2, length: 3, name: "a".into(), descriptor: "I".into(), index: 1 },
            LocalVariableTableItem { start_pc: 6, length: 4, name: "s".into(), descriptor: "Ljava/lang/String;".into(), index: 1 },
        ]);
        let mut locals = Locals::new(&code, "Foo", &[], true);
        let first = locals.store(1, 1, 2, JvmType::Int, JvmType::Int);
        let second = locals.store(1, 5, 6, JvmType::Reference("java/lang/Object".into()), JvmType::Unknown);
        assert_ne!(first, second);
        assert_eq!(locals.table().name(first), "a");
        assert_eq!(locals.table().name(second), "s");
        assert_eq!(locals.load(1, 3, JvmType::Int), first);
    }

    #[test]
    fn test_slot_reuse_with_other_type_binds_new_variable() {
        let code = code_with_table(vec![]);
        let mut locals = Locals::new(&code, "Foo", &[], true);
        let int = locals.store(2, 0, 1, JvmType::Int, JvmType::Int);
        let again = locals.store(2, 4, 5, JvmType::Int, JvmType::Boolean);
        let reference = locals.store(2, 6, 7, JvmType::Reference("java/lang/Object".into()), JvmType::Reference("java/lang/String".into()));
        assert_eq!(int, again);
        assert_ne!(int, reference);
        assert_eq!(locals.table().name(reference), "local2_2");
        assert_eq!(locals.table().ty(reference), JvmType::Reference("java/lang/String".into()));
    }

    #[test]
    fn test_unknown_declared_type_is_inferred() {
        let code = code_with_table(vec![LocalVariableTableItem {
            start_pc: 1,
            length: 5,
            name: "x".into(),
            descriptor: "not a descriptor".into(),
            index: 0,
        }]);
        let mut locals = Locals::new(&code, "Foo", &[], true);
        let id = locals.store(0, 0, 1, JvmType::Int, JvmType::Char);
        assert_eq!(locals.table().ty(id), JvmType::Char);
    }
}
