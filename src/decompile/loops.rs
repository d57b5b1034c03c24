use super::cfg_types::*;
use super::cond_builder::Chain;
use super::error::DecompileError;
use super::structured_types::*;
use super::structuring::{push_section, Frame, FrameKind, Structurer};

impl<'r, 'o> Structurer<'r, 'o> {
    /// True if `id` ends in an explicit jump to `offset`.
    pub(crate) fn jumps_to(&self, id: BlockId, offset: u32) -> bool {
        let block = &self.graph.blocks[id];
        if block.kind.is_marker() {
            return false;
        }
        match &block.terminator {
            Terminator::Goto { target } | Terminator::Conditional { target, .. } => self.graph.offset(*target) == offset,
            Terminator::Switch { default, cases } => std::iter::once(default)
                .chain(cases.iter().map(|(_, t)| t))
                .any(|t| self.graph.offset(*t) == offset),
            _ => false,
        }
    }

    /// The last block of `[head, hi)` that jumps back to `head`.
    fn find_latch(&self, head: BlockId, hi: BlockId) -> Option<BlockId> {
        let offset = self.graph.offset(head);
        self.graph
            .live_ids(head, hi)
            .into_iter()
            .filter(|&id| self.jumps_to(id, offset))
            .last()
    }

    fn with_frame<T>(
        &mut self,
        frame: Frame,
        f: impl FnOnce(&mut Self) -> Result<T, DecompileError>,
    ) -> Result<T, DecompileError> {
        self.frames.push(frame);
        let result = f(self);
        self.frames.pop();
        result
    }

    /// Matches a loop whose header is `head`: a do-while closed by a
    /// conditional chain, a top-tested while or for loop, or an infinite loop.
    pub(crate) fn match_loop(&mut self, head: BlockId, hi: BlockId) -> Result<bool, DecompileError> {
        if self.loop_heads.contains(&head) || self.is_processed(head) {
            return Ok(false);
        }
        match self.graph.blocks[head].kind {
            BlockKind::Code | BlockKind::Prebuilt { .. } => {}
            BlockKind::TryStart { .. } => {}
            _ => return Ok(false),
        }
        let Some(latch) = self.find_latch(head, hi) else {
            return Ok(false);
        };
        if let BlockKind::TryStart { region } = self.graph.blocks[head].kind {
            if self.graph.offset(latch) < self.graph.regions[region].end {
                return Ok(false);
            }
        }
        let exit = self.graph.next_live(latch);
        let label = self.fresh_label();

        let latch_is_test = self.graph.blocks[latch].is_code()
            && matches!(self.graph.blocks[latch].terminator, Terminator::Conditional { .. });
        let (statement, loop_exit) = if latch_is_test {
            (self.do_while(head, latch, exit, label)?, exit)
        } else if let Some(chain) = self.top_test(head, latch, exit)? {
            let loop_exit = chain.join;
            (self.top_tested(head, latch, chain, label)?, loop_exit)
        } else {
            (self.infinite(head, exit, label)?, exit)
        };

        let terminator = if self.same_position(loop_exit, exit) {
            Terminator::FallThrough { target: exit }
        } else {
            Terminator::Goto { target: loop_exit }
        };
        self.replace(head, exit - 1, vec![Section::Construct(statement)], terminator);
        Ok(true)
    }

    fn do_while(&mut self, head: BlockId, latch: BlockId, exit: BlockId, label: LoopId) -> Result<Statement, DecompileError> {
        let chain = self
            .chain_ending_at(head, latch, head, exit)?
            .ok_or(DecompileError::Unstructured { offset: self.graph.offset(latch) })?;
        if !chain.prefix.is_empty() {
            return Err(DecompileError::StackDepthMismatch {
                offset: self.graph.offset(chain.head()),
                expected: 0,
                found: chain.prefix.len(),
            });
        }
        let condition = self.build_condition(&chain, head, exit)?;
        let test = chain.head();
        let frame = Frame {
            label,
            kind: FrameKind::Loop,
            continue_target: Some(test),
            break_target: exit,
        };
        self.loop_heads.insert(head);
        let sections = self.with_frame(frame, |s| s.structure_range(head, test, test));
        self.loop_heads.remove(&head);
        let mut sections = sections?;
        push_section(&mut sections, Section::Linear(chain.head_statements));
        Ok(Statement::DoWhile {
            label,
            body: StatementBlock::from_sections(BlockRole::LoopBody, sections),
            condition,
        })
    }

    /// The condition chain at the top of a loop closed by an unconditional
    /// jump, if the header holds nothing but tests.
    fn top_test(&mut self, head: BlockId, latch: BlockId, exit: BlockId) -> Result<Option<Chain>, DecompileError> {
        if !matches!(self.graph.blocks[latch].terminator, Terminator::Goto { .. }) {
            return Ok(None);
        }
        let Some(chain) = self.chain_at(head, latch)? else {
            return Ok(None);
        };
        let leaves_loop = self.graph.offset(chain.join) >= self.graph.offset(exit);
        let pure = chain.head_statements.is_empty() && chain.prefix.is_empty();
        if leaves_loop && pure && chain.body <= latch {
            Ok(Some(chain))
        } else {
            Ok(None)
        }
    }

    fn top_tested(&mut self, head: BlockId, latch: BlockId, chain: Chain, label: LoopId) -> Result<Statement, DecompileError> {
        let body_start = chain.body;
        let condition = self.build_condition(&chain, body_start, chain.join)?;
        let exit = self.graph.next_live(latch);

        // A separate update block entered by `continue` makes a for loop.
        let continued = latch != body_start
            && self.graph.blocks[latch].is_code()
            && self.continues_to_latch(head, body_start, latch);
        let update = if continued {
            let simulated = self.sim.simulate(&self.graph, latch)?;
            if !simulated.exit_stack.is_empty() {
                return Err(DecompileError::StackDepthMismatch {
                    offset: self.graph.blocks[latch].end,
                    expected: 0,
                    found: simulated.exit_stack.len(),
                });
            }
            Some(simulated.statements).filter(|s| !s.is_empty())
        } else {
            None
        };

        match update {
            Some(update) => {
                let frame = Frame {
                    label,
                    kind: FrameKind::Loop,
                    continue_target: Some(latch),
                    break_target: chain.join,
                };
                let sections = self.with_frame(frame, |s| s.structure_range(body_start, latch, latch))?;
                Ok(Statement::For {
                    label,
                    init: Vec::new(),
                    condition: Some(condition),
                    update,
                    body: StatementBlock::from_sections(BlockRole::LoopBody, sections),
                })
            }
            None => {
                let frame = Frame {
                    label,
                    kind: FrameKind::Loop,
                    continue_target: Some(head),
                    break_target: chain.join,
                };
                let sections = self.with_frame(frame, |s| s.structure_range(body_start, exit, head))?;
                Ok(Statement::While {
                    label,
                    condition: Some(condition),
                    body: StatementBlock::from_sections(BlockRole::LoopBody, sections),
                })
            }
        }
    }

    /// True if some body block in `[body_start, latch)` continues through
    /// the latch with a plain `goto`, and none jumps straight to `head`.
    fn continues_to_latch(&self, head: BlockId, body_start: BlockId, latch: BlockId) -> bool {
        let body = self.graph.live_ids(body_start, latch);
        let head_offset = self.graph.offset(head);
        if body.iter().any(|&id| self.jumps_to(id, head_offset)) {
            return false;
        }
        let latch_offset = self.graph.offset(latch);
        body.iter().any(|&id| {
            let block = &self.graph.blocks[id];
            let to_latch = !block.kind.is_marker()
                && matches!(block.terminator, Terminator::Goto { target } if self.graph.offset(target) == latch_offset);
            to_latch && !self.inside_nested_loop(id, body_start, latch)
        })
    }

    /// True if a block of `[id, latch)` jumps back to a block of
    /// `[body_start, id]`, so `id` sits inside a loop nested in the body.
    fn inside_nested_loop(&self, id: BlockId, body_start: BlockId, latch: BlockId) -> bool {
        let low = self.graph.offset(body_start);
        let high = self.graph.offset(id);
        self.graph.live_ids(id, latch).into_iter().any(|j| {
            let block = &self.graph.blocks[j];
            !block.kind.is_marker()
                && block
                    .terminator
                    .successors()
                    .into_iter()
                    .any(|t| (low..=high).contains(&self.graph.offset(t)))
        })
    }

    fn infinite(&mut self, head: BlockId, exit: BlockId, label: LoopId) -> Result<Statement, DecompileError> {
        let frame = Frame {
            label,
            kind: FrameKind::Loop,
            continue_target: Some(head),
            break_target: exit,
        };
        self.loop_heads.insert(head);
        let sections = self.with_frame(frame, |s| s.structure_range(head, exit, head));
        self.loop_heads.remove(&head);
        Ok(Statement::While {
            label,
            condition: None,
            body: StatementBlock::from_sections(BlockRole::LoopBody, sections?),
        })
    }
}
