//! Folding of `?:` diamonds into single expressions before structuring.
//!
//! A ternary compiles to a conditional chain whose two arms only push one
//! value each and meet at a common join. The head block is overwritten with
//! a prebuilt block that pushes the folded expression, and the join learns
//! its entry stack. Heads are visited right to left so that inner ternaries
//! are folded before the ones containing them.

use tracing::trace;

use super::cfg_types::*;
use super::cond_builder::Chain;
use super::error::DecompileError;
use super::expr::Expr;
use super::structuring::Structurer;

/// How the value arm of a ternary reaches the join.
struct Arm {
    blocks: Vec<BlockId>,
    /// True if the last block jumps to the join rather than falling into it.
    jumps: bool,
}

impl<'r, 'o> Structurer<'r, 'o> {
    pub(crate) fn fold_ternaries(&mut self) -> Result<(), DecompileError> {
        let limit = self.options.max_structuring_passes;
        let mut passes = 0;
        loop {
            passes += 1;
            if passes > limit {
                return Err(DecompileError::PassLimit { passes: limit });
            }
            let mut changed = false;
            for head in self.graph.live_ids(0, self.graph.len()).into_iter().rev() {
                if self.fold_ternary_at(head) {
                    changed = true;
                }
            }
            if !changed {
                return Ok(());
            }
        }
    }

    /// Blocks from `start` that only move values to the block at `join`.
    fn value_arm(&self, start: BlockId, stop: BlockId, join: BlockId) -> Option<Arm> {
        let join_offset = self.graph.offset(join);
        let mut blocks = Vec::new();
        let mut id = start;
        while id < stop {
            let block = &self.graph.blocks[id];
            if !matches!(block.kind, BlockKind::Code | BlockKind::Prebuilt { .. }) {
                return None;
            }
            blocks.push(id);
            let next = self.graph.next_live(id);
            match block.terminator {
                Terminator::Goto { target } if self.graph.offset(target) == join_offset => {
                    return Some(Arm { blocks, jumps: true });
                }
                Terminator::FallThrough { .. } if self.graph.offset(next) == join_offset => {
                    return Some(Arm { blocks, jumps: false });
                }
                Terminator::FallThrough { .. } => id = next,
                _ => return None,
            }
        }
        None
    }

    /// Runs the arm from `entry` and returns the single value it pushes.
    fn arm_value(&mut self, arm: &Arm, entry: &[Expr]) -> Option<Expr> {
        let mut stack = entry.to_vec();
        for &id in &arm.blocks {
            let simulated = self.sim.simulate_with(&self.graph, id, stack).ok()?;
            if !simulated.statements.is_empty() {
                return None;
            }
            stack = simulated.exit_stack;
        }
        if stack.len() != entry.len() + 1 || stack[..entry.len()] != *entry {
            return None;
        }
        stack.pop()
    }

    fn fold_ternary_at(&mut self, head: BlockId) -> bool {
        // Stacks not known yet make simulation fail; those heads are retried
        // after the ternaries around them are folded.
        let Ok(Some(chain)) = self.chain_at(head, self.graph.len()) else {
            return false;
        };
        let Some((arm_a, arm_b, join)) = self.diamond(&chain) else {
            return false;
        };
        let Some(then_expr) = self.arm_value(&arm_a, &chain.prefix) else {
            return false;
        };
        let Some(else_expr) = self.arm_value(&arm_b, &chain.prefix) else {
            return false;
        };
        let Ok(condition) = self.build_condition(&chain, chain.body, chain.join) else {
            return false;
        };
        let ternary = Expr::Ternary {
            condition: Box::new(condition),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        };

        let natural = self.sim.entry_stack(&self.graph, head).len().min(chain.prefix.len());
        let mut pushed = chain.prefix[natural..].to_vec();
        pushed.push(ternary.clone());
        let mut join_stack = chain.prefix.clone();
        join_stack.push(ternary);

        let span_end = arm_b.blocks[arm_b.blocks.len() - 1];
        let terminator = if arm_b.jumps {
            Terminator::Goto { target: join }
        } else {
            Terminator::FallThrough { target: join }
        };
        let block = &mut self.graph.blocks[head];
        block.kind = BlockKind::Prebuilt {
            statements: chain.head_statements,
            exit_stack: pushed,
        };
        block.instructions.clear();
        block.span_end = span_end;
        block.terminator = terminator;
        self.graph.blocks[join].entry_stack = Some(join_stack);
        self.graph.recompute_predecessors();
        self.sim.invalidate(head);
        self.sim.invalidate(join);
        trace!(offset = self.graph.offset(head), join = self.graph.offset(join), "folded ternary");
        true
    }

    /// The two value arms of a chain and the code block they meet at.
    fn diamond(&self, chain: &Chain) -> Option<(Arm, Arm, BlockId)> {
        let len = self.graph.len();
        let else_start = self.boundary(chain.join, chain.body, len);
        if else_start <= chain.body || else_start >= len {
            return None;
        }
        let last_a = *self.graph.live_ids(chain.body, else_start).last()?;
        let Terminator::Goto { target } = self.graph.blocks[last_a].terminator else {
            return None;
        };
        if self.graph.offset(target) <= self.graph.offset(else_start) {
            return None;
        }
        let join = self.graph.code_block_at(self.graph.offset(target))?;
        let arm_a = self.value_arm(chain.body, else_start, join)?;
        if !arm_a.jumps || arm_a.blocks.last() != Some(&last_a) {
            return None;
        }
        let arm_b = self.value_arm(else_start, join, join)?;
        Some((arm_a, arm_b, join))
    }
}
