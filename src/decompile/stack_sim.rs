use std::collections::HashMap;

use tracing::debug;

use crate::code_attribute::Instruction;
use crate::constant_info::{Constant, FieldRef, MethodRef};

use super::cfg::mnemonic;
use super::cfg_types::*;
use super::condition::Condition;
use super::descriptor::*;
use super::error::DecompileError;
use super::expr::*;
use super::locals::Locals;
use super::registry::Registry;
use super::structured_types::Statement;

/// Pop one value or fail with a stack underflow at `$offset`.
macro_rules! pop {
    ($stack:expr, $offset:expr) => {
        $stack
            .pop()
            .ok_or(DecompileError::StackUnderflow { offset: $offset })?
    };
}

/// The statements and exit state of one simulated block.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulatedBlock {
    pub statements: Vec<Statement>,
    /// Values left on the operand stack, bottom first.
    pub exit_stack: Vec<Expr>,
    /// Condition under which a conditional jump ending the block is taken.
    pub branch: Option<Condition>,
    /// Key of a switch ending the block.
    pub switch_key: Option<Expr>,
}

/// Turns block instructions into statements and expressions by simulating
/// the operand stack. Results for a block's natural entry stack are cached.
pub struct BlockSimulator<'r> {
    registry: &'r dyn Registry,
    locals: Locals,
    cache: HashMap<BlockId, SimulatedBlock>,
}

impl<'r> BlockSimulator<'r> {
    pub fn new(registry: &'r dyn Registry, locals: Locals) -> Self {
        Self {
            registry,
            locals,
            cache: HashMap::new(),
        }
    }

    pub fn locals(&self) -> &Locals {
        &self.locals
    }

    pub fn locals_mut(&mut self) -> &mut Locals {
        &mut self.locals
    }

    pub fn into_locals(self) -> Locals {
        self.locals
    }

    pub fn invalidate(&mut self, id: BlockId) {
        self.cache.remove(&id);
    }

    /// The operand stack on entry to `id`: an explicit entry stack, the caught
    /// exception for a handler entry, or nothing.
    pub fn entry_stack(&self, graph: &BlockGraph, id: BlockId) -> Vec<Expr> {
        if let Some(stack) = graph.blocks.get(id).and_then(|b| b.entry_stack.clone()) {
            return stack;
        }
        let previous = id.checked_sub(1).and_then(|p| graph.blocks.get(p));
        if let Some(BlockKind::Handler { region, handler }) = previous.map(|b| &b.kind) {
            let catch_types = graph
                .regions
                .get(*region)
                .and_then(|r| r.handlers.get(*handler))
                .map(|h| h.catch_types.as_slice())
                .unwrap_or_default();
            let class_name = match catch_types {
                [only] => only.clone(),
                _ => "java/lang/Throwable".to_string(),
            };
            return vec![Expr::CaughtException(class_name)];
        }
        Vec::new()
    }

    /// Simulates `id` from its natural entry stack.
    pub fn simulate(&mut self, graph: &BlockGraph, id: BlockId) -> Result<SimulatedBlock, DecompileError> {
        if let Some(cached) = self.cache.get(&id) {
            return Ok(cached.clone());
        }
        let entry = self.entry_stack(graph, id);
        let simulated = self.simulate_with(graph, id, entry)?;
        self.cache.insert(id, simulated.clone());
        Ok(simulated)
    }

    /// Simulates `id` from an explicit entry stack, bypassing the cache.
    pub fn simulate_with(
        &mut self,
        graph: &BlockGraph,
        id: BlockId,
        entry: Vec<Expr>,
    ) -> Result<SimulatedBlock, DecompileError> {
        let block = graph.blocks.get(id).ok_or(DecompileError::MissingBlock {
            from: graph.offset(id),
            target: graph.offset(id),
        })?;
        match &block.kind {
            BlockKind::Prebuilt { statements, exit_stack } => {
                let mut stack = entry;
                stack.extend(exit_stack.iter().cloned());
                Ok(SimulatedBlock {
                    statements: statements.clone(),
                    exit_stack: stack,
                    branch: None,
                    switch_key: None,
                })
            }
            BlockKind::Code => self.run(block, entry),
            _ => Ok(SimulatedBlock {
                statements: Vec::new(),
                exit_stack: entry,
                branch: None,
                switch_key: None,
            }),
        }
    }

    fn run(&mut self, block: &Block, entry: Vec<Expr>) -> Result<SimulatedBlock, DecompileError> {
        let mut stack: Vec<Expr> = entry;
        let mut stmts: Vec<Statement> = Vec::new();
        let mut branch: Option<Condition> = None;
        let mut switch_key: Option<Expr> = None;

        for (i, addressed) in block.instructions.iter().enumerate() {
            let instr = &addressed.instruction;
            let pc = addressed.address;
            let next_pc = block
                .instructions
                .get(i + 1)
                .map(|n| n.address)
                .unwrap_or(block.end);
            match instr {
                // ============================================================
                // Constants
                // ============================================================
                Instruction::Nop => {}
                Instruction::Aconstnull => stack.push(Expr::NullLiteral),
                Instruction::Iconstm1 => stack.push(Expr::IntLiteral(-1)),
                Instruction::Iconst0 => stack.push(Expr::IntLiteral(0)),
                Instruction::Iconst1 => stack.push(Expr::IntLiteral(1)),
                Instruction::Iconst2 => stack.push(Expr::IntLiteral(2)),
                Instruction::Iconst3 => stack.push(Expr::IntLiteral(3)),
                Instruction::Iconst4 => stack.push(Expr::IntLiteral(4)),
                Instruction::Iconst5 => stack.push(Expr::IntLiteral(5)),
                Instruction::Lconst0 => stack.push(Expr::LongLiteral(0)),
                Instruction::Lconst1 => stack.push(Expr::LongLiteral(1)),
                Instruction::Fconst0 => stack.push(Expr::FloatLiteral(0.0)),
                Instruction::Fconst1 => stack.push(Expr::FloatLiteral(1.0)),
                Instruction::Fconst2 => stack.push(Expr::FloatLiteral(2.0)),
                Instruction::Dconst0 => stack.push(Expr::DoubleLiteral(0.0)),
                Instruction::Dconst1 => stack.push(Expr::DoubleLiteral(1.0)),
                Instruction::Bipush(val) => stack.push(Expr::IntLiteral(*val as i32)),
                Instruction::Sipush(val) => stack.push(Expr::IntLiteral(*val as i32)),
                Instruction::Ldc(constant) | Instruction::LdcW(constant) | Instruction::Ldc2W(constant) => {
                    stack.push(load_constant(constant));
                }

                // ============================================================
                // Locals
                // ============================================================
                Instruction::Iload(slot) => stack.push(self.load(*slot, pc, JvmType::Int)),
                Instruction::Lload(slot) => stack.push(self.load(*slot, pc, JvmType::Long)),
                Instruction::Fload(slot) => stack.push(self.load(*slot, pc, JvmType::Float)),
                Instruction::Dload(slot) => stack.push(self.load(*slot, pc, JvmType::Double)),
                Instruction::Aload(slot) => stack.push(self.load(*slot, pc, object_type())),

                Instruction::Istore(slot) => self.store(&mut stack, &mut stmts, *slot, pc, next_pc, JvmType::Int)?,
                Instruction::Lstore(slot) => self.store(&mut stack, &mut stmts, *slot, pc, next_pc, JvmType::Long)?,
                Instruction::Fstore(slot) => self.store(&mut stack, &mut stmts, *slot, pc, next_pc, JvmType::Float)?,
                Instruction::Dstore(slot) => self.store(&mut stack, &mut stmts, *slot, pc, next_pc, JvmType::Double)?,
                Instruction::Astore(slot) => self.store(&mut stack, &mut stmts, *slot, pc, next_pc, object_type())?,

                Instruction::Iinc { index, value } => {
                    let local = self.locals.load(*index, pc, JvmType::Int);
                    self.spill(&mut stack, &mut stmts, |e| e.has_side_effects() || e.reads_local(local));
                    stmts.push(Statement::Increment { local, amount: *value as i32 });
                }

                // ============================================================
                // Arrays
                // ============================================================
                Instruction::Iaload => array_load(&mut stack, pc, JvmType::Int)?,
                Instruction::Laload => array_load(&mut stack, pc, JvmType::Long)?,
                Instruction::Faload => array_load(&mut stack, pc, JvmType::Float)?,
                Instruction::Daload => array_load(&mut stack, pc, JvmType::Double)?,
                Instruction::Aaload => array_load(&mut stack, pc, object_type())?,
                Instruction::Baload => array_load(&mut stack, pc, JvmType::Byte)?,
                Instruction::Caload => array_load(&mut stack, pc, JvmType::Char)?,
                Instruction::Saload => array_load(&mut stack, pc, JvmType::Short)?,

                Instruction::Iastore
                | Instruction::Lastore
                | Instruction::Fastore
                | Instruction::Dastore
                | Instruction::Aastore
                | Instruction::Bastore
                | Instruction::Castore
                | Instruction::Sastore => {
                    let value = pop!(stack, pc);
                    let index = pop!(stack, pc);
                    let array = pop!(stack, pc);
                    self.spill(&mut stack, &mut stmts, |e| e.has_side_effects() || e.reads_array());
                    stmts.push(Statement::ArrayStore { array, index, value });
                }

                Instruction::Newarray(atype) => {
                    let length = pop!(stack, pc);
                    stack.push(Expr::NewArray {
                        element_type: newarray_type(*atype),
                        length: Box::new(length),
                    });
                }
                Instruction::Anewarray(class_name) => {
                    let length = pop!(stack, pc);
                    stack.push(Expr::NewArray {
                        element_type: class_operand_type(class_name),
                        length: Box::new(length),
                    });
                }
                Instruction::Multianewarray { class_name, dimensions } => {
                    let mut dims = Vec::with_capacity(*dimensions as usize);
                    for _ in 0..*dimensions {
                        dims.push(pop!(stack, pc));
                    }
                    dims.reverse();
                    stack.push(Expr::NewMultiArray {
                        array_type: class_operand_type(class_name),
                        dimensions: dims,
                    });
                }
                Instruction::Arraylength => {
                    let array = pop!(stack, pc);
                    stack.push(Expr::ArrayLength { array: Box::new(array) });
                }

                // ============================================================
                // Stack manipulation
                // ============================================================
                Instruction::Pop => {
                    let val = pop!(stack, pc);
                    self.discard(&mut stack, &mut stmts, val);
                }
                Instruction::Pop2 => {
                    for val in self.pop_units(&mut stack, 2, pc)? {
                        self.discard(&mut stack, &mut stmts, val);
                    }
                }
                Instruction::Dup => self.dup(&mut stack, &mut stmts, 1, 0, pc)?,
                Instruction::Dupx1 => self.dup(&mut stack, &mut stmts, 1, 1, pc)?,
                Instruction::Dupx2 => self.dup(&mut stack, &mut stmts, 1, 2, pc)?,
                Instruction::Dup2 => self.dup(&mut stack, &mut stmts, 2, 0, pc)?,
                Instruction::Dup2x1 => self.dup(&mut stack, &mut stmts, 2, 1, pc)?,
                Instruction::Dup2x2 => self.dup(&mut stack, &mut stmts, 2, 2, pc)?,
                Instruction::Swap => {
                    let val1 = pop!(stack, pc);
                    let val2 = pop!(stack, pc);
                    stack.push(val1);
                    stack.push(val2);
                }

                // ============================================================
                // Arithmetic
                // ============================================================
                Instruction::Iadd | Instruction::Ladd | Instruction::Fadd | Instruction::Dadd => {
                    binary(&mut stack, pc, BinOp::Add)?
                }
                Instruction::Isub | Instruction::Lsub | Instruction::Fsub | Instruction::Dsub => {
                    binary(&mut stack, pc, BinOp::Sub)?
                }
                Instruction::Imul | Instruction::Lmul | Instruction::Fmul | Instruction::Dmul => {
                    binary(&mut stack, pc, BinOp::Mul)?
                }
                Instruction::Idiv | Instruction::Ldiv | Instruction::Fdiv | Instruction::Ddiv => {
                    binary(&mut stack, pc, BinOp::Div)?
                }
                Instruction::Irem | Instruction::Lrem | Instruction::Frem | Instruction::Drem => {
                    binary(&mut stack, pc, BinOp::Rem)?
                }
                Instruction::Ishl | Instruction::Lshl => binary(&mut stack, pc, BinOp::Shl)?,
                Instruction::Ishr | Instruction::Lshr => binary(&mut stack, pc, BinOp::Shr)?,
                Instruction::Iushr | Instruction::Lushr => binary(&mut stack, pc, BinOp::Ushr)?,
                Instruction::Iand | Instruction::Land => binary(&mut stack, pc, BinOp::And)?,
                Instruction::Ior | Instruction::Lor => binary(&mut stack, pc, BinOp::Or)?,
                Instruction::Ixor | Instruction::Lxor => binary(&mut stack, pc, BinOp::Xor)?,
                Instruction::Ineg | Instruction::Lneg | Instruction::Fneg | Instruction::Dneg => {
                    let operand = pop!(stack, pc);
                    stack.push(Expr::UnaryOp { op: UnaryOp::Neg, operand: Box::new(operand) });
                }

                // ============================================================
                // Conversions
                // ============================================================
                Instruction::I2l | Instruction::F2l | Instruction::D2l => cast(&mut stack, pc, JvmType::Long)?,
                Instruction::I2f | Instruction::L2f | Instruction::D2f => cast(&mut stack, pc, JvmType::Float)?,
                Instruction::I2d | Instruction::L2d | Instruction::F2d => cast(&mut stack, pc, JvmType::Double)?,
                Instruction::L2i | Instruction::F2i | Instruction::D2i => cast(&mut stack, pc, JvmType::Int)?,
                Instruction::I2b => cast(&mut stack, pc, JvmType::Byte)?,
                Instruction::I2c => cast(&mut stack, pc, JvmType::Char)?,
                Instruction::I2s => cast(&mut stack, pc, JvmType::Short)?,
                Instruction::Checkcast(class_name) => cast(&mut stack, pc, class_operand_type(class_name))?,
                Instruction::Instanceof(class_name) => {
                    let operand = pop!(stack, pc);
                    stack.push(Expr::Instanceof {
                        operand: Box::new(operand),
                        check_type: class_name.clone(),
                    });
                }

                // ============================================================
                // Comparisons
                // ============================================================
                Instruction::Lcmp => compare(&mut stack, pc, CmpKind::LCmp)?,
                Instruction::Fcmpl => compare(&mut stack, pc, CmpKind::FCmpL)?,
                Instruction::Fcmpg => compare(&mut stack, pc, CmpKind::FCmpG)?,
                Instruction::Dcmpl => compare(&mut stack, pc, CmpKind::DCmpL)?,
                Instruction::Dcmpg => compare(&mut stack, pc, CmpKind::DCmpG)?,

                // ============================================================
                // Branches: consumed by the graph, only their operands matter
                // ============================================================
                Instruction::Ifeq(_) => branch = Some(self.make_if_zero_cond(pop!(stack, pc), CompareOp::Eq)),
                Instruction::Ifne(_) => branch = Some(self.make_if_zero_cond(pop!(stack, pc), CompareOp::Ne)),
                Instruction::Iflt(_) => branch = Some(self.make_if_zero_cond(pop!(stack, pc), CompareOp::Lt)),
                Instruction::Ifge(_) => branch = Some(self.make_if_zero_cond(pop!(stack, pc), CompareOp::Ge)),
                Instruction::Ifgt(_) => branch = Some(self.make_if_zero_cond(pop!(stack, pc), CompareOp::Gt)),
                Instruction::Ifle(_) => branch = Some(self.make_if_zero_cond(pop!(stack, pc), CompareOp::Le)),
                Instruction::IfIcmpeq(_) | Instruction::IfAcmpeq(_) => branch = Some(two_operand(&mut stack, pc, CompareOp::Eq)?),
                Instruction::IfIcmpne(_) | Instruction::IfAcmpne(_) => branch = Some(two_operand(&mut stack, pc, CompareOp::Ne)?),
                Instruction::IfIcmplt(_) => branch = Some(two_operand(&mut stack, pc, CompareOp::Lt)?),
                Instruction::IfIcmpge(_) => branch = Some(two_operand(&mut stack, pc, CompareOp::Ge)?),
                Instruction::IfIcmpgt(_) => branch = Some(two_operand(&mut stack, pc, CompareOp::Gt)?),
                Instruction::IfIcmple(_) => branch = Some(two_operand(&mut stack, pc, CompareOp::Le)?),
                Instruction::Ifnull(_) => {
                    branch = Some(Condition::compare(CompareOp::Eq, pop!(stack, pc), Expr::NullLiteral));
                }
                Instruction::Ifnonnull(_) => {
                    branch = Some(Condition::compare(CompareOp::Ne, pop!(stack, pc), Expr::NullLiteral));
                }
                Instruction::Goto(_) | Instruction::GotoW(_) => {}
                Instruction::Tableswitch { .. } | Instruction::Lookupswitch { .. } => {
                    switch_key = Some(pop!(stack, pc));
                }

                // ============================================================
                // Fields
                // ============================================================
                Instruction::Getstatic(field) => {
                    stack.push(field_get(field, None)?);
                }
                Instruction::Getfield(field) => {
                    let object = pop!(stack, pc);
                    stack.push(field_get(field, Some(object))?);
                }
                Instruction::Putstatic(field) => {
                    let value = pop!(stack, pc);
                    self.field_store(&mut stack, &mut stmts, field, None, value)?;
                }
                Instruction::Putfield(field) => {
                    let value = pop!(stack, pc);
                    let object = pop!(stack, pc);
                    self.field_store(&mut stack, &mut stmts, field, Some(object), value)?;
                }

                // ============================================================
                // Invocation and object creation
                // ============================================================
                Instruction::Invokevirtual(method) => {
                    self.invoke(&mut stack, &mut stmts, InvokeKind::Virtual, method, pc)?
                }
                Instruction::Invokeinterface(method) => {
                    self.invoke(&mut stack, &mut stmts, InvokeKind::Interface, method, pc)?
                }
                Instruction::Invokestatic(method) => {
                    self.invoke(&mut stack, &mut stmts, InvokeKind::Static, method, pc)?
                }
                Instruction::Invokespecial(method) => {
                    self.invoke(&mut stack, &mut stmts, InvokeKind::Special, method, pc)?
                }
                Instruction::Invokedynamic(site) => {
                    let (params, return_type) = parse_method_descriptor(&site.descriptor)
                        .ok_or_else(|| DecompileError::MalformedDescriptor(site.descriptor.clone()))?;
                    let captures = pop_args(&mut stack, params.len(), pc)?;
                    let expr = Expr::InvokeDynamic {
                        bootstrap_index: site.bootstrap_index,
                        method_name: site.name.clone(),
                        descriptor: site.descriptor.clone(),
                        captures,
                        return_type: return_type.clone(),
                    };
                    self.push_or_emit_call(&mut stack, &mut stmts, expr, &return_type);
                }
                Instruction::New(class_name) => {
                    stack.push(Expr::UninitNew { class_name: class_name.clone(), site: pc });
                }

                // ============================================================
                // Monitors, returns and throws
                // ============================================================
                Instruction::Monitorenter | Instruction::Monitorexit => {
                    let object = pop!(stack, pc);
                    self.spill(&mut stack, &mut stmts, Expr::has_side_effects);
                    stmts.push(Statement::Monitor {
                        enter: matches!(instr, Instruction::Monitorenter),
                        object,
                    });
                }
                Instruction::Return => stmts.push(Statement::Return(None)),
                Instruction::Ireturn
                | Instruction::Lreturn
                | Instruction::Freturn
                | Instruction::Dreturn
                | Instruction::Areturn => {
                    let val = pop!(stack, pc);
                    stmts.push(Statement::Return(Some(val)));
                }
                Instruction::Athrow => {
                    let val = pop!(stack, pc);
                    stmts.push(Statement::Throw(val));
                }

                Instruction::Jsr(_) | Instruction::JsrW(_) | Instruction::Ret(_) | Instruction::Unknown(_) => {
                    return Err(DecompileError::UnsupportedInstruction {
                        offset: pc,
                        mnemonic: mnemonic(instr),
                    });
                }
            }
        }

        Ok(SimulatedBlock {
            statements: stmts,
            exit_stack: stack,
            branch,
            switch_key,
        })
    }

    // ---------------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------------

    fn load(&mut self, slot: u16, pc: u32, hint: JvmType) -> Expr {
        let id = self.locals.load(slot, pc, hint);
        if self.locals.is_this(id) {
            Expr::This
        } else {
            Expr::Local(id)
        }
    }

    fn store(
        &mut self,
        stack: &mut Vec<Expr>,
        stmts: &mut Vec<Statement>,
        slot: u16,
        pc: u32,
        next_pc: u32,
        hint: JvmType,
    ) -> Result<(), DecompileError> {
        let value = pop!(stack, pc);
        let local = match &value {
            Expr::CaughtException(class_name) => self.locals.store_exception(slot, pc, next_pc, class_name),
            _ => {
                let value_ty = value.ty(self.locals.table());
                self.locals.store(slot, pc, next_pc, hint, value_ty)
            }
        };
        self.spill(stack, stmts, |e| e.has_side_effects() || e.reads_local(local));
        stmts.push(Statement::LocalStore { local, value });
        Ok(())
    }

    fn field_store(
        &mut self,
        stack: &mut Vec<Expr>,
        stmts: &mut Vec<Statement>,
        field: &FieldRef,
        object: Option<Expr>,
        value: Expr,
    ) -> Result<(), DecompileError> {
        let field_type = parse_type_descriptor(&field.descriptor)
            .ok_or_else(|| DecompileError::MalformedDescriptor(field.descriptor.clone()))?;
        self.spill(stack, stmts, |e| {
            e.has_side_effects() || e.reads_field(&field.class_name, &field.name)
        });
        stmts.push(Statement::FieldStore {
            object,
            class_name: field.class_name.clone(),
            field_name: field.name.clone(),
            field_type,
            value,
        });
        Ok(())
    }

    /// Moves pending stack values matching `pred` into temporaries so that
    /// the next statement does not reorder their evaluation.
    fn spill(&mut self, stack: &mut [Expr], stmts: &mut Vec<Statement>, pred: impl Fn(&Expr) -> bool) {
        for entry in stack.iter_mut() {
            if entry.is_trivial() || matches!(entry, Expr::UninitNew { .. }) || !pred(entry) {
                continue;
            }
            let ty = entry.ty(self.locals.table());
            let temp = self.locals.temporary(ty);
            let value = std::mem::replace(entry, Expr::Local(temp));
            stmts.push(Statement::LocalStore { local: temp, value });
        }
    }

    /// A copy of `val` that can be evaluated twice.
    fn duplicate(&mut self, stmts: &mut Vec<Statement>, val: Expr) -> Expr {
        if val.is_trivial() || matches!(val, Expr::UninitNew { .. }) {
            return val;
        }
        let ty = val.ty(self.locals.table());
        let temp = self.locals.temporary(ty);
        stmts.push(Statement::LocalStore { local: temp, value: val });
        Expr::Local(temp)
    }

    fn width(&self, val: &Expr) -> usize {
        if val.ty(self.locals.table()).is_wide() {
            2
        } else {
            1
        }
    }

    /// Pops values covering exactly `units` stack slots, returned bottom first.
    fn pop_units(&self, stack: &mut Vec<Expr>, units: usize, pc: u32) -> Result<Vec<Expr>, DecompileError> {
        let mut taken = Vec::new();
        let mut covered = 0;
        while covered < units {
            let val = pop!(stack, pc);
            covered += self.width(&val);
            taken.push(val);
        }
        if covered != units {
            return Err(DecompileError::StackDepthMismatch {
                offset: pc,
                expected: units,
                found: covered,
            });
        }
        taken.reverse();
        Ok(taken)
    }

    /// The `dup` family: copies the top `units` slots below the next `depth`
    /// slots.
    fn dup(
        &mut self,
        stack: &mut Vec<Expr>,
        stmts: &mut Vec<Statement>,
        units: usize,
        depth: usize,
        pc: u32,
    ) -> Result<(), DecompileError> {
        let top = self.pop_units(stack, units, pc)?;
        let below = if depth > 0 {
            self.pop_units(stack, depth, pc)?
        } else {
            Vec::new()
        };
        self.spill(stack, stmts, Expr::has_side_effects);
        let mut copies = Vec::with_capacity(top.len());
        for val in top {
            copies.push(self.duplicate(stmts, val));
        }
        stack.extend(copies.iter().cloned());
        stack.extend(below);
        stack.extend(copies);
        Ok(())
    }

    fn discard(&mut self, stack: &mut [Expr], stmts: &mut Vec<Statement>, val: Expr) {
        if val.has_side_effects() {
            self.spill(stack, stmts, Expr::has_side_effects);
            stmts.push(Statement::Expression(val));
        }
    }

    fn make_if_zero_cond(&self, val: Expr, op: CompareOp) -> Condition {
        match val {
            Expr::CmpResult { left, right, .. } => Condition::compare(op, *left, *right),
            val => {
                let kind = val.ty(self.locals.table()).kind();
                let boolean = matches!(kind, TypeKind::Boolean | TypeKind::Unknown);
                match op {
                    CompareOp::Ne if boolean => Condition::Test { expr: val, negated: false },
                    CompareOp::Eq if boolean => Condition::Test { expr: val, negated: true },
                    _ => Condition::compare(op, val, Expr::IntLiteral(0)),
                }
            }
        }
    }

    fn invoke(
        &mut self,
        stack: &mut Vec<Expr>,
        stmts: &mut Vec<Statement>,
        kind: InvokeKind,
        method: &MethodRef,
        pc: u32,
    ) -> Result<(), DecompileError> {
        let (params, return_type) = match self.registry.method(&method.class_name, &method.name, &method.descriptor) {
            Some(signature) => (signature.parameters, signature.return_type),
            None => {
                debug!(class = %method.class_name, method = %method.name, "callee not in registry, using descriptor");
                parse_method_descriptor(&method.descriptor)
                    .ok_or_else(|| DecompileError::MalformedDescriptor(method.descriptor.clone()))?
            }
        };
        let args = pop_args(stack, params.len(), pc)?;
        let receiver = match kind {
            InvokeKind::Static => None,
            _ => Some(pop!(stack, pc)),
        };

        if method.name == "<init>" {
            if let Some(Expr::UninitNew { class_name, site }) = &receiver {
                let new_expr = Expr::New {
                    class_name: class_name.clone(),
                    constructor_descriptor: method.descriptor.clone(),
                    args,
                };
                if !replace_uninit_new(stack, *site, &new_expr) {
                    self.spill(stack, stmts, Expr::has_side_effects);
                    stmts.push(Statement::Expression(new_expr));
                }
                return Ok(());
            }
        }

        let call = Expr::MethodCall {
            kind,
            object: receiver.map(Box::new),
            class_name: method.class_name.clone(),
            method_name: method.name.clone(),
            descriptor: method.descriptor.clone(),
            args,
            return_type: return_type.clone(),
        };
        self.push_or_emit_call(stack, stmts, call, &return_type);
        Ok(())
    }

    /// If a method returns void, emit the call as a statement; otherwise push the result.
    fn push_or_emit_call(&mut self, stack: &mut Vec<Expr>, stmts: &mut Vec<Statement>, call: Expr, return_type: &JvmType) {
        if *return_type == JvmType::Void {
            self.spill(stack, stmts, Expr::has_side_effects);
            stmts.push(Statement::Expression(call));
        } else {
            stack.push(call);
        }
    }
}

fn object_type() -> JvmType {
    JvmType::Reference("java/lang/Object".to_string())
}

fn load_constant(constant: &Constant) -> Expr {
    match constant {
        Constant::Integer(v) => Expr::IntLiteral(*v),
        Constant::Float(v) => Expr::FloatLiteral(*v),
        Constant::Long(v) => Expr::LongLiteral(*v),
        Constant::Double(v) => Expr::DoubleLiteral(*v),
        Constant::String(s) => Expr::StringLiteral(s.clone()),
        Constant::Class(name) => Expr::ClassLiteral(name.clone()),
    }
}

fn field_get(field: &FieldRef, object: Option<Expr>) -> Result<Expr, DecompileError> {
    let field_type = parse_type_descriptor(&field.descriptor)
        .ok_or_else(|| DecompileError::MalformedDescriptor(field.descriptor.clone()))?;
    Ok(Expr::FieldGet {
        object: object.map(Box::new),
        class_name: field.class_name.clone(),
        field_name: field.name.clone(),
        field_type,
    })
}

fn array_load(stack: &mut Vec<Expr>, pc: u32, element_type: JvmType) -> Result<(), DecompileError> {
    let index = pop!(stack, pc);
    let array = pop!(stack, pc);
    stack.push(Expr::ArrayLoad {
        array: Box::new(array),
        index: Box::new(index),
        element_type,
    });
    Ok(())
}

fn binary(stack: &mut Vec<Expr>, pc: u32, op: BinOp) -> Result<(), DecompileError> {
    let right = pop!(stack, pc);
    let left = pop!(stack, pc);
    stack.push(Expr::BinaryOp { op, left: Box::new(left), right: Box::new(right) });
    Ok(())
}

fn cast(stack: &mut Vec<Expr>, pc: u32, target_type: JvmType) -> Result<(), DecompileError> {
    let operand = pop!(stack, pc);
    stack.push(Expr::Cast { target_type, operand: Box::new(operand) });
    Ok(())
}

fn compare(stack: &mut Vec<Expr>, pc: u32, kind: CmpKind) -> Result<(), DecompileError> {
    let right = pop!(stack, pc);
    let left = pop!(stack, pc);
    stack.push(Expr::CmpResult { kind, left: Box::new(left), right: Box::new(right) });
    Ok(())
}

fn two_operand(stack: &mut Vec<Expr>, pc: u32, op: CompareOp) -> Result<Condition, DecompileError> {
    let right = pop!(stack, pc);
    let left = pop!(stack, pc);
    Ok(Condition::compare(op, left, right))
}

/// Pop `n` arguments, returned in declaration order.
fn pop_args(stack: &mut Vec<Expr>, n: usize, pc: u32) -> Result<Vec<Expr>, DecompileError> {
    if stack.len() < n {
        return Err(DecompileError::StackUnderflow { offset: pc });
    }
    Ok(stack.split_off(stack.len() - n))
}

/// Replaces the `new` marker from `site` left below a `dup` with the
/// constructed value. Returns false if no marker remains.
fn replace_uninit_new(stack: &mut [Expr], site: u32, replacement: &Expr) -> bool {
    for item in stack.iter_mut().rev() {
        if matches!(item, Expr::UninitNew { site: s, .. } if *s == site) {
            *item = replacement.clone();
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_attribute::MethodCode;
    use crate::decompile::cfg::build_graph;
    use crate::decompile::locals::LocalId;
    use crate::decompile::registry::EmptyRegistry;

    fn simulate(code: Vec<Instruction>, params: &[JvmType]) -> (SimulatedBlock, Locals) {
        let code = MethodCode::sequential(code);
        let graph = build_graph(&code).unwrap();
        let locals = Locals::new(&code, "Foo", params, true);
        let mut sim = BlockSimulator::new(&EmptyRegistry, locals);
        let block = sim.simulate(&graph, 0).unwrap();
        (block, sim.into_locals())
    }

    #[test]
    fn test_constructor_folds_into_new() {
        let (block, _) = simulate(
            vec![
                Instruction::New("java/lang/StringBuilder".into()),
                Instruction::Dup,
                Instruction::Invokespecial(MethodRef::new("java/lang/StringBuilder", "<init>", "()V")),
                Instruction::Astore(0),
                Instruction::Return,
            ],
            &[],
        );
        match &block.statements[0] {
            Statement::LocalStore { value: Expr::New { class_name, args, .. }, .. } => {
                assert_eq!(class_name, "java/lang/StringBuilder");
                assert!(args.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(block.statements[1], Statement::Return(None));
    }

    #[test]
    fn test_discarded_call_is_one_statement() {
        let (block, _) = simulate(
            vec![
                Instruction::Invokestatic(MethodRef::new("Foo", "next", "()I")),
                Instruction::Pop,
                Instruction::Iconst1,
                Instruction::Pop,
                Instruction::Return,
            ],
            &[],
        );
        assert_eq!(block.statements.len(), 2);
        assert!(matches!(block.statements[0], Statement::Expression(Expr::MethodCall { .. })));
    }

    #[test]
    fn test_load_then_increment_spills() {
        // return i++;
        let (block, locals) = simulate(
            vec![Instruction::Iload(0), Instruction::Iinc { index: 0, value: 1 }, Instruction::Ireturn],
            &[JvmType::Int],
        );
        let temp = match &block.statements[0] {
            Statement::LocalStore { local, value: Expr::Local(LocalId(0)) } => *local,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(locals.table().name(temp), "tmp1");
        assert_eq!(block.statements[1], Statement::Increment { local: LocalId(0), amount: 1 });
        assert_eq!(block.statements[2], Statement::Return(Some(Expr::Local(temp))));
    }

    #[test]
    fn test_lcmp_folds_into_compare() {
        let code = MethodCode::sequential(vec![
            Instruction::Lload(0),
            Instruction::Lconst0,
            Instruction::Lcmp,
            Instruction::Ifle(2),
            Instruction::Return,
            Instruction::Return,
        ]);
        let graph = build_graph(&code).unwrap();
        let locals = Locals::new(&code, "Foo", &[JvmType::Long], true);
        let mut sim = BlockSimulator::new(&EmptyRegistry, locals);
        let block = sim.simulate(&graph, 0).unwrap();
        assert_eq!(
            block.branch,
            Some(Condition::compare(CompareOp::Le, Expr::Local(LocalId(0)), Expr::LongLiteral(0)))
        );
    }

    #[test]
    fn test_boolean_zero_test_is_atomic() {
        let code = MethodCode::sequential(vec![Instruction::Iload(0), Instruction::Ifeq(2), Instruction::Return, Instruction::Return]);
        let graph = build_graph(&code).unwrap();
        let locals = Locals::new(&code, "Foo", &[JvmType::Boolean], true);
        let mut sim = BlockSimulator::new(&EmptyRegistry, locals);
        let block = sim.simulate(&graph, 0).unwrap();
        assert_eq!(block.branch, Some(Condition::Test { expr: Expr::Local(LocalId(0)), negated: true }));
    }

    #[test]
    fn test_underflow_is_reported() {
        let code = MethodCode::sequential(vec![Instruction::Iadd, Instruction::Return]);
        let graph = build_graph(&code).unwrap();
        let locals = Locals::new(&code, "Foo", &[], true);
        let mut sim = BlockSimulator::new(&EmptyRegistry, locals);
        assert_eq!(sim.simulate(&graph, 0), Err(DecompileError::StackUnderflow { offset: 0 }));
    }

    #[test]
    fn test_unknown_opcode_is_unsupported() {
        let code = MethodCode::sequential(vec![Instruction::Unknown(0xcb), Instruction::Return]);
        let graph = build_graph(&code).unwrap();
        let locals = Locals::new(&code, "Foo", &[], true);
        let mut sim = BlockSimulator::new(&EmptyRegistry, locals);
        assert!(matches!(
            sim.simulate(&graph, 0),
            Err(DecompileError::UnsupportedInstruction { offset: 0, .. })
        ));
    }
}
