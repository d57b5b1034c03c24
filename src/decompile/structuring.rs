//! Region structuring over the block arena.
//!
//! A range of live blocks is scanned left to right in passes. At each
//! unprocessed block the region processors are asked, in priority order,
//! whether a construct starts there: loop, try/catch, switch, conditional,
//! straight-line code. A match structures the construct's inner ranges
//! recursively and overwrites its head block with a processed block spanning
//! the whole construct. A range is finished when every live block in it is
//! processed; its sections are then collected in address order, turning the
//! remaining jumps into break, continue or nothing.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::code_attribute::Instruction;

use super::cfg_types::*;
use super::class_decompiler::DecompileOptions;
use super::error::DecompileError;
use super::locals::Locals;
use super::stack_sim::BlockSimulator;
use super::structured_types::*;

/// Longest chain of jump-only blocks followed when comparing jump targets.
const MAX_JUMP_THREADING: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FrameKind {
    Loop,
    Switch,
}

/// An enclosing breakable construct.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Frame {
    pub label: LoopId,
    pub kind: FrameKind,
    pub continue_target: Option<BlockId>,
    pub break_target: BlockId,
}

pub(crate) struct Structurer<'r, 'o> {
    pub(crate) graph: BlockGraph,
    pub(crate) sim: BlockSimulator<'r>,
    pub(crate) options: &'o DecompileOptions,
    pub(crate) frames: Vec<Frame>,
    /// Loop headers whose loop is being structured; they are not matched as
    /// loops again inside their own body.
    pub(crate) loop_heads: HashSet<BlockId>,
    next_label: u32,
}

impl<'r, 'o> Structurer<'r, 'o> {
    pub(crate) fn new(graph: BlockGraph, sim: BlockSimulator<'r>, options: &'o DecompileOptions) -> Self {
        Self {
            graph,
            sim,
            options,
            frames: Vec::new(),
            loop_heads: HashSet::new(),
            next_label: 0,
        }
    }

    /// Structures the whole graph into the method body.
    pub(crate) fn run(mut self) -> Result<(StatementBlock, Locals), DecompileError> {
        self.fold_ternaries()?;
        let len = self.graph.len();
        let sections = self.structure_range(0, len, len)?;
        debug!(blocks = len, labels = self.next_label, "structured method body");
        Ok((
            StatementBlock::from_sections(BlockRole::MethodBody, sections),
            self.sim.into_locals(),
        ))
    }

    pub(crate) fn fresh_label(&mut self) -> LoopId {
        let label = LoopId(self.next_label);
        self.next_label += 1;
        label
    }

    // ---------------------------------------------------------------------------
    // Positions
    // ---------------------------------------------------------------------------

    pub(crate) fn same_position(&self, a: BlockId, b: BlockId) -> bool {
        self.graph.offset(a) == self.graph.offset(b)
    }

    /// Where control ends up after entering `id`, following blocks that hold
    /// nothing but a `goto`.
    fn destination(&self, id: BlockId) -> u32 {
        let mut offset = self.graph.offset(id);
        for _ in 0..MAX_JUMP_THREADING {
            let Some(code) = self.graph.code_block_at(offset) else {
                break;
            };
            let block = &self.graph.blocks[code];
            let jump_only = block.instructions.len() == 1 && block.instructions[0].instruction.is_unconditional_transfer();
            match (&block.terminator, jump_only) {
                (Terminator::Goto { target }, true) => offset = self.graph.offset(*target),
                _ => break,
            }
        }
        offset
    }

    /// True if a jump to `target` has the same effect as one to `place`.
    pub(crate) fn lands_on(&self, target: BlockId, place: BlockId) -> bool {
        self.same_position(target, place) || self.destination(target) == self.destination(place)
    }

    /// The first live block in `[lo, hi)` at or after the address of `target`,
    /// or `hi`.
    pub(crate) fn boundary(&self, target: BlockId, lo: BlockId, hi: BlockId) -> BlockId {
        let offset = self.graph.offset(target);
        self.graph
            .live_ids(lo, hi)
            .into_iter()
            .find(|&id| self.graph.offset(id) >= offset)
            .unwrap_or(hi)
    }

    pub(crate) fn is_processed(&self, id: BlockId) -> bool {
        matches!(self.graph.blocks[id].kind, BlockKind::Processed { .. })
    }

    /// Overwrites `head` with a processed block covering `head..=span_end`.
    pub(crate) fn replace(&mut self, head: BlockId, span_end: BlockId, sections: Vec<Section>, terminator: Terminator) {
        let block = &mut self.graph.blocks[head];
        block.kind = BlockKind::Processed { sections };
        block.span_end = span_end.max(head);
        block.terminator = terminator;
    }

    // ---------------------------------------------------------------------------
    // Jumps
    // ---------------------------------------------------------------------------

    /// The statement a jump from `from` to `target` becomes. A jump at the end
    /// of a range to its follow is implicit.
    pub(crate) fn resolve_jump(
        &self,
        from: BlockId,
        target: BlockId,
        follow: BlockId,
        at_end: bool,
    ) -> Result<Option<Statement>, DecompileError> {
        if at_end && self.lands_on(target, follow) {
            return Ok(None);
        }
        let innermost = self.frames.len().saturating_sub(1);
        for (depth, frame) in self.frames.iter().enumerate().rev() {
            if let Some(continue_target) = frame.continue_target {
                if self.lands_on(target, continue_target) {
                    let needs_label = self.frames[depth + 1..].iter().any(|f| f.kind == FrameKind::Loop);
                    return Ok(Some(Statement::Continue {
                        target: frame.label,
                        needs_label,
                    }));
                }
            }
            if self.lands_on(target, frame.break_target) {
                return Ok(Some(Statement::Break {
                    target: frame.label,
                    needs_label: depth != innermost,
                }));
            }
        }
        if self.is_bare_return(target) {
            return Ok(Some(Statement::Return(None)));
        }
        Err(DecompileError::Unstructured {
            offset: self.graph.offset(from),
        })
    }

    fn is_bare_return(&self, target: BlockId) -> bool {
        self.graph
            .code_block_at(self.graph.offset(target))
            .map(|id| &self.graph.blocks[id].instructions)
            .is_some_and(|instructions| {
                matches!(instructions.as_slice(), [only] if only.instruction == Instruction::Return)
            })
    }

    // ---------------------------------------------------------------------------
    // Ranges
    // ---------------------------------------------------------------------------

    /// Structures the live blocks in `[lo, hi)`. `follow` is where control
    /// goes when it leaves the range at its end.
    pub(crate) fn structure_range(&mut self, lo: BlockId, hi: BlockId, follow: BlockId) -> Result<Vec<Section>, DecompileError> {
        if lo >= hi {
            return Ok(Vec::new());
        }
        let mut passes = 0;
        loop {
            let pending = self.graph.live_ids(lo, hi).into_iter().find(|&id| !self.is_processed(id));
            let Some(first_pending) = pending else {
                return self.collect(lo, hi, follow);
            };
            passes += 1;
            if passes > self.options.max_structuring_passes {
                return Err(DecompileError::PassLimit {
                    passes: self.options.max_structuring_passes,
                });
            }
            let mut progress = false;
            let mut id = lo;
            while id < hi {
                if !self.is_processed(id) && self.match_at(id, hi, follow)? {
                    progress = true;
                }
                id = self.graph.next_live(id);
            }
            if !progress {
                return Err(DecompileError::Unstructured {
                    offset: self.graph.offset(first_pending),
                });
            }
        }
    }

    fn match_at(&mut self, id: BlockId, hi: BlockId, follow: BlockId) -> Result<bool, DecompileError> {
        if self.match_loop(id, hi)? {
            trace!(offset = self.graph.offset(id), "loop");
            return Ok(true);
        }
        if self.match_try(id, hi, follow)? {
            trace!(offset = self.graph.offset(id), "try/catch");
            return Ok(true);
        }
        if self.match_switch(id, hi)? {
            trace!(offset = self.graph.offset(id), "switch");
            return Ok(true);
        }
        if self.match_conditional(id, hi, follow)? {
            trace!(offset = self.graph.offset(id), "conditional");
            return Ok(true);
        }
        self.match_straight_line(id)
    }

    /// A block that ends in fall-through, `goto`, return or throw becomes its
    /// statements. Its jump is resolved when the range is collected.
    fn match_straight_line(&mut self, id: BlockId) -> Result<bool, DecompileError> {
        let block = &self.graph.blocks[id];
        let linear = matches!(block.kind, BlockKind::Code | BlockKind::Prebuilt { .. }) && block.terminator.is_linear();
        if !linear {
            return Ok(false);
        }
        let simulated = self.sim.simulate(&self.graph, id)?;
        let block = &self.graph.blocks[id];
        let consumed_by_successor = block
            .terminator
            .target()
            .and_then(|t| self.graph.blocks.get(t))
            .is_some_and(|t| t.entry_stack.is_some());
        if !simulated.exit_stack.is_empty() && !consumed_by_successor {
            return Err(DecompileError::StackDepthMismatch {
                offset: block.end,
                expected: 0,
                found: simulated.exit_stack.len(),
            });
        }
        let terminator = block.terminator.clone();
        // a folded ternary head already spans its value arms
        let span_end = block.span_end;
        self.replace(id, span_end, vec![Section::Linear(simulated.statements)], terminator);
        Ok(true)
    }

    /// Concatenates the sections of a fully processed range.
    fn collect(&mut self, lo: BlockId, hi: BlockId, follow: BlockId) -> Result<Vec<Section>, DecompileError> {
        let ids = self.graph.live_ids(lo, hi);
        let mut sections: Vec<Section> = Vec::new();
        for (i, &id) in ids.iter().enumerate() {
            let at_end = i + 1 == ids.len();
            let next = ids.get(i + 1).copied().unwrap_or(hi);
            let block = &self.graph.blocks[id];
            let BlockKind::Processed { sections: own } = &block.kind else {
                return Err(DecompileError::Unstructured { offset: block.start });
            };
            for section in own.clone() {
                push_section(&mut sections, section);
            }
            let jump = match block.terminator {
                Terminator::FallThrough { target } | Terminator::Goto { target } => {
                    if !at_end && self.same_position(target, next) {
                        None
                    } else {
                        self.resolve_jump(id, target, follow, at_end)?
                    }
                }
                Terminator::Return | Terminator::Throw => None,
                Terminator::Conditional { .. } | Terminator::Switch { .. } => {
                    return Err(DecompileError::Unstructured { offset: block.start });
                }
            };
            if let Some(statement) = jump {
                push_section(&mut sections, Section::Linear(vec![statement]));
            }
        }
        Ok(sections)
    }
}

/// Appends `section`, merging adjacent straight-line runs.
pub(crate) fn push_section(sections: &mut Vec<Section>, section: Section) {
    match (sections.last_mut(), section) {
        (_, Section::Linear(statements)) if statements.is_empty() => {}
        (Some(Section::Linear(run)), Section::Linear(statements)) => run.extend(statements),
        (_, section) => sections.push(section),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_attribute::MethodCode;
    use crate::constant_info::MethodRef;
    use crate::decompile::cfg::build_graph;
    use crate::decompile::expr::Expr;
    use crate::decompile::registry::EmptyRegistry;

    fn call(name: &str) -> Instruction {
        Instruction::Invokestatic(MethodRef::new("Foo", name, "()V"))
    }

    fn structure(code: MethodCode) -> Result<StatementBlock, DecompileError> {
        let graph = build_graph(&code)?;
        let locals = Locals::new(&code, "Foo", &[crate::decompile::descriptor::JvmType::Int], true);
        let options = DecompileOptions::default();
        let structurer = Structurer::new(graph, BlockSimulator::new(&EmptyRegistry, locals), &options);
        structurer.run().map(|(body, _)| body)
    }

    #[test]
    fn test_jump_to_next_block_is_dropped() {
        let body = structure(MethodCode::sequential(vec![call("a"), Instruction::Goto(1), call("b"), Instruction::Return])).unwrap();
        assert_eq!(body.statements.len(), 3);
        assert!(body.statements.iter().all(|s| !matches!(s, Statement::Break { .. })));
    }

    #[test]
    fn test_forward_jump_over_code_is_unstructured() {
        let code = MethodCode::sequential(vec![Instruction::Goto(2), call("b"), call("c"), Instruction::Return]);
        assert_eq!(structure(code), Err(DecompileError::Unstructured { offset: 0 }));
    }

    #[test]
    fn test_leftover_stack_is_depth_mismatch() {
        let code = MethodCode::sequential(vec![Instruction::Iconst1, Instruction::Goto(1), Instruction::Return]);
        assert!(matches!(structure(code), Err(DecompileError::StackDepthMismatch { .. })));
    }

    #[test]
    fn test_folded_ternary_keeps_its_arms_covered() {
        // return c ? 1 : 2;
        let code = MethodCode::sequential(vec![
            Instruction::Iload(0),
            Instruction::Ifeq(3),
            Instruction::Iconst1,
            Instruction::Goto(2),
            Instruction::Iconst2,
            Instruction::Ireturn,
        ]);
        let body = structure(code).unwrap();
        assert_eq!(body.statements.len(), 1);
        assert!(matches!(&body.statements[0], Statement::Return(Some(Expr::Ternary { .. }))));
    }
}
