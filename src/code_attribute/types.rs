use crate::constant_info::{Constant, DynamicCallSite, FieldRef, MethodRef};

/// A decoded JVM instruction.
///
/// Constant pool operands are already resolved, fixed-slot short forms
/// (`iload_1`, `astore_0`, ...) and their `wide` variants are normalized to the
/// indexed form, and branch operands keep their class-file meaning: an offset
/// relative to the address of the branching instruction.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Instruction {
    Nop,
    Aconstnull,
    Iconstm1,
    Iconst0,
    Iconst1,
    Iconst2,
    Iconst3,
    Iconst4,
    Iconst5,
    Lconst0,
    Lconst1,
    Fconst0,
    Fconst1,
    Fconst2,
    Dconst0,
    Dconst1,
    Bipush(i8),
    Sipush(i16),
    Ldc(Constant),
    LdcW(Constant),
    Ldc2W(Constant),

    Iload(u16),
    Lload(u16),
    Fload(u16),
    Dload(u16),
    Aload(u16),
    Iaload,
    Laload,
    Faload,
    Daload,
    Aaload,
    Baload,
    Caload,
    Saload,

    Istore(u16),
    Lstore(u16),
    Fstore(u16),
    Dstore(u16),
    Astore(u16),
    Iastore,
    Lastore,
    Fastore,
    Dastore,
    Aastore,
    Bastore,
    Castore,
    Sastore,

    Pop,
    Pop2,
    Dup,
    Dupx1,
    Dupx2,
    Dup2,
    Dup2x1,
    Dup2x2,
    Swap,

    Iadd,
    Ladd,
    Fadd,
    Dadd,
    Isub,
    Lsub,
    Fsub,
    Dsub,
    Imul,
    Lmul,
    Fmul,
    Dmul,
    Idiv,
    Ldiv,
    Fdiv,
    Ddiv,
    Irem,
    Lrem,
    Frem,
    Drem,
    Ineg,
    Lneg,
    Fneg,
    Dneg,
    Ishl,
    Lshl,
    Ishr,
    Lshr,
    Iushr,
    Lushr,
    Iand,
    Land,
    Ior,
    Lor,
    Ixor,
    Lxor,
    Iinc { index: u16, value: i16 },

    I2l,
    I2f,
    I2d,
    L2i,
    L2f,
    L2d,
    F2i,
    F2l,
    F2d,
    D2i,
    D2l,
    D2f,
    I2b,
    I2c,
    I2s,

    Lcmp,
    Fcmpl,
    Fcmpg,
    Dcmpl,
    Dcmpg,
    Ifeq(i32),
    Ifne(i32),
    Iflt(i32),
    Ifge(i32),
    Ifgt(i32),
    Ifle(i32),
    IfIcmpeq(i32),
    IfIcmpne(i32),
    IfIcmplt(i32),
    IfIcmpge(i32),
    IfIcmpgt(i32),
    IfIcmple(i32),
    IfAcmpeq(i32),
    IfAcmpne(i32),
    Ifnull(i32),
    Ifnonnull(i32),

    Goto(i32),
    GotoW(i32),
    Jsr(i32),
    JsrW(i32),
    Ret(u16),
    Tableswitch { default: i32, low: i32, high: i32, offsets: Vec<i32> },
    Lookupswitch { default: i32, pairs: Vec<(i32, i32)> },
    Ireturn,
    Lreturn,
    Freturn,
    Dreturn,
    Areturn,
    Return,

    Getstatic(FieldRef),
    Putstatic(FieldRef),
    Getfield(FieldRef),
    Putfield(FieldRef),
    Invokevirtual(MethodRef),
    Invokespecial(MethodRef),
    Invokestatic(MethodRef),
    Invokeinterface(MethodRef),
    Invokedynamic(DynamicCallSite),
    New(String),
    Newarray(u8),
    Anewarray(String),
    Arraylength,
    Athrow,
    Checkcast(String),
    Instanceof(String),
    Monitorenter,
    Monitorexit,
    Multianewarray { class_name: String, dimensions: u8 },

    /// An opcode the reader could not decode.
    Unknown(u8),
}

impl Instruction {
    /// Relative offset of the taken edge of a conditional branch.
    pub fn conditional_offset(&self) -> Option<i32> {
        match self {
            Instruction::Ifeq(off)
            | Instruction::Ifne(off)
            | Instruction::Iflt(off)
            | Instruction::Ifge(off)
            | Instruction::Ifgt(off)
            | Instruction::Ifle(off)
            | Instruction::IfIcmpeq(off)
            | Instruction::IfIcmpne(off)
            | Instruction::IfIcmplt(off)
            | Instruction::IfIcmpge(off)
            | Instruction::IfIcmpgt(off)
            | Instruction::IfIcmple(off)
            | Instruction::IfAcmpeq(off)
            | Instruction::IfAcmpne(off)
            | Instruction::Ifnull(off)
            | Instruction::Ifnonnull(off) => Some(*off),
            _ => None,
        }
    }

    /// Every relative jump offset this instruction can transfer control to.
    pub fn jump_offsets(&self) -> Vec<i32> {
        match self {
            Instruction::Goto(off)
            | Instruction::GotoW(off)
            | Instruction::Jsr(off)
            | Instruction::JsrW(off) => vec![*off],
            Instruction::Tableswitch { default, offsets, .. } => {
                let mut all = vec![*default];
                all.extend(offsets.iter().copied());
                all
            }
            Instruction::Lookupswitch { default, pairs } => {
                let mut all = vec![*default];
                all.extend(pairs.iter().map(|(_, off)| *off));
                all
            }
            other => other.conditional_offset().into_iter().collect(),
        }
    }

    /// True if execution never continues with the next instruction.
    pub fn is_unconditional_transfer(&self) -> bool {
        matches!(
            self,
            Instruction::Goto(_)
                | Instruction::GotoW(_)
                | Instruction::Jsr(_)
                | Instruction::JsrW(_)
                | Instruction::Ret(_)
                | Instruction::Tableswitch { .. }
                | Instruction::Lookupswitch { .. }
                | Instruction::Ireturn
                | Instruction::Lreturn
                | Instruction::Freturn
                | Instruction::Dreturn
                | Instruction::Areturn
                | Instruction::Return
                | Instruction::Athrow
        )
    }

    /// True if this instruction ends a basic block.
    pub fn ends_block(&self) -> bool {
        self.is_unconditional_transfer() || self.conditional_offset().is_some()
    }
}

/// An instruction paired with its bytecode address.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AddressedInstruction {
    pub address: u32,
    pub instruction: Instruction,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExceptionEntry {
    pub start_pc: u32,
    pub end_pc: u32,
    pub handler_pc: u32,
    /// Internal name of the caught class; `None` catches anything.
    pub catch_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocalVariableTableItem {
    pub start_pc: u32,
    pub length: u32,
    pub name: String,
    pub descriptor: String,
    pub index: u16,
}

/// The decoded `Code` attribute of one method.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MethodCode {
    pub max_stack: u16,
    pub max_locals: u16,
    /// Address one past the last instruction.
    pub code_length: u32,
    pub instructions: Vec<AddressedInstruction>,
    pub exception_table: Vec<ExceptionEntry>,
    pub local_variable_table: Vec<LocalVariableTableItem>,
}

impl MethodCode {
    /// Builds a code attribute whose addresses are instruction indices, so
    /// branch offsets count instructions rather than bytes.
    pub fn sequential(instructions: Vec<Instruction>) -> Self {
        let code_length = instructions.len() as u32;
        MethodCode {
            max_stack: 0,
            max_locals: 0,
            code_length,
            instructions: instructions
                .into_iter()
                .enumerate()
                .map(|(address, instruction)| AddressedInstruction {
                    address: address as u32,
                    instruction,
                })
                .collect(),
            exception_table: Vec::new(),
            local_variable_table: Vec::new(),
        }
    }

    pub fn with_exception_table(mut self, entries: Vec<ExceptionEntry>) -> Self {
        self.exception_table = entries;
        self
    }

    pub fn with_local_variables(mut self, items: Vec<LocalVariableTableItem>) -> Self {
        self.local_variable_table = items;
        self
    }

    /// Address of the instruction following the one at `index`.
    pub fn next_address(&self, index: usize) -> u32 {
        self.instructions
            .get(index + 1)
            .map(|next| next.address)
            .unwrap_or(self.code_length)
    }
}
