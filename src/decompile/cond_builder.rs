//! Detection of conditional chains and folding of their paths into one
//! guarding condition.
//!
//! A chain is a run of consecutive conditional blocks where every edge leads
//! to a later block of the chain, to the body, or to the join. The guarding
//! condition is the disjunction, over every path from the head that reaches
//! the body, of the conjunction of the edge conditions along that path.

use tracing::trace;

use super::cfg_types::*;
use super::condition::Condition;
use super::error::DecompileError;
use super::expr::Expr;
use super::simplify::{simplify, SimplifyLimits};
use super::structured_types::Statement;
use super::structuring::Structurer;

/// A run of conditional blocks guarding one region.
#[derive(Clone, Debug)]
pub(crate) struct Chain {
    pub blocks: Vec<BlockId>,
    /// Condition under which each block's jump is taken.
    pub conditions: Vec<Condition>,
    /// Statements of the head block, evaluated before the first test.
    pub head_statements: Vec<Statement>,
    /// Operand stack left by the head block below its tested values.
    pub prefix: Vec<Expr>,
    pub body: BlockId,
    pub join: BlockId,
}

impl Chain {
    pub fn head(&self) -> BlockId {
        self.blocks[0]
    }

    pub fn last(&self) -> BlockId {
        self.blocks[self.blocks.len() - 1]
    }
}

/// Caps for condition construction.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ConditionLimits {
    pub simplify: bool,
    pub max_paths: usize,
    pub simplify_limits: SimplifyLimits,
}

enum Edge {
    Chain(usize),
    Body,
    Join,
}

/// Folds every path from the chain head into the condition under which
/// control reaches `body`.
pub(crate) fn build_condition(
    graph: &BlockGraph,
    chain: &Chain,
    body: BlockId,
    join: BlockId,
    limits: ConditionLimits,
) -> Result<Condition, DecompileError> {
    let mut paths = Vec::new();
    let mut path = Vec::new();
    walk(graph, chain, 0, body, join, limits.max_paths, &mut path, &mut paths)?;
    if paths.is_empty() {
        return Err(DecompileError::ConditionGraph {
            offset: graph.offset(chain.head()),
        });
    }
    let condition = Condition::or(paths);
    if limits.simplify {
        Ok(simplify(&condition, limits.simplify_limits))
    } else {
        Ok(condition)
    }
}

#[allow(clippy::too_many_arguments)]
fn walk(
    graph: &BlockGraph,
    chain: &Chain,
    index: usize,
    body: BlockId,
    join: BlockId,
    max_paths: usize,
    path: &mut Vec<Condition>,
    paths: &mut Vec<Condition>,
) -> Result<(), DecompileError> {
    let id = chain.blocks[index];
    let Terminator::Conditional { target, else_target } = graph.blocks[id].terminator else {
        return Err(DecompileError::ConditionGraph { offset: graph.offset(id) });
    };
    let taken = chain.conditions[index].clone();
    let not_taken = taken.invert();
    for (successor, edge_condition) in [(target, taken), (else_target, not_taken)] {
        let edge = classify(graph, chain, index, successor, body, join)
            .ok_or(DecompileError::ConditionGraph { offset: graph.offset(id) })?;
        match edge {
            Edge::Join => {}
            Edge::Body => {
                let mut operands = path.clone();
                operands.push(edge_condition);
                paths.push(Condition::and(operands));
                if paths.len() > max_paths {
                    return Err(DecompileError::TooManyPaths {
                        offset: graph.offset(chain.head()),
                        limit: max_paths,
                    });
                }
            }
            Edge::Chain(next) => {
                path.push(edge_condition);
                walk(graph, chain, next, body, join, max_paths, path, paths)?;
                path.pop();
            }
        }
    }
    Ok(())
}

fn classify(
    graph: &BlockGraph,
    chain: &Chain,
    index: usize,
    successor: BlockId,
    body: BlockId,
    join: BlockId,
) -> Option<Edge> {
    let position = graph.offset(successor);
    if let Some(next) = (index + 1..chain.blocks.len()).find(|&j| graph.offset(chain.blocks[j]) == position) {
        return Some(Edge::Chain(next));
    }
    if position == graph.offset(body) {
        Some(Edge::Body)
    } else if position == graph.offset(join) {
        Some(Edge::Join)
    } else {
        None
    }
}

/// The single exit of `blocks` other than `body`, or `None` if the blocks do
/// not form a chain towards `body`.
pub(crate) fn chain_join(graph: &BlockGraph, blocks: &[BlockId], body: BlockId) -> Option<BlockId> {
    let mut join: Option<BlockId> = None;
    let mut reaches_body = false;
    for (i, &id) in blocks.iter().enumerate() {
        let Terminator::Conditional { target, else_target } = graph.blocks[id].terminator else {
            return None;
        };
        for successor in [target, else_target] {
            let position = graph.offset(successor);
            if blocks[i + 1..].iter().any(|&b| graph.offset(b) == position) {
                continue;
            }
            if position == graph.offset(body) {
                reaches_body = true;
                continue;
            }
            match join {
                None => join = Some(successor),
                Some(j) if graph.offset(j) == position => {}
                Some(_) => return None,
            }
        }
    }
    if reaches_body {
        join
    } else {
        None
    }
}

impl<'r, 'o> Structurer<'r, 'o> {
    pub(crate) fn condition_limits(&self) -> ConditionLimits {
        ConditionLimits {
            simplify: self.options.simplify_conditions,
            max_paths: self.options.max_condition_paths,
            simplify_limits: SimplifyLimits {
                max_terms: self.options.max_condition_terms,
                ..SimplifyLimits::default()
            },
        }
    }

    pub(crate) fn build_condition(&self, chain: &Chain, body: BlockId, join: BlockId) -> Result<Condition, DecompileError> {
        build_condition(&self.graph, chain, body, join, self.condition_limits())
    }

    fn is_conditional_code(&self, id: BlockId) -> bool {
        self.graph
            .blocks
            .get(id)
            .is_some_and(|b| b.is_code() && matches!(b.terminator, Terminator::Conditional { .. }))
    }

    /// Simulates `id` as a chain follower: it must only test values pushed on
    /// top of `prefix`, and only chain blocks may enter it.
    fn follower_condition(&mut self, id: BlockId, blocks: &[BlockId], prefix: &[Expr]) -> Option<Condition> {
        if !self.is_conditional_code(id) {
            return None;
        }
        if !self.graph.blocks[id].predecessors.iter().all(|p| blocks.contains(p)) {
            return None;
        }
        let simulated = self.sim.simulate_with(&self.graph, id, prefix.to_vec()).ok()?;
        if !simulated.statements.is_empty() || simulated.exit_stack != prefix {
            return None;
        }
        simulated.branch
    }

    /// The longest chain starting at `head` whose body is the block right
    /// after its last test.
    pub(crate) fn chain_at(&mut self, head: BlockId, hi: BlockId) -> Result<Option<Chain>, DecompileError> {
        if !self.is_conditional_code(head) {
            return Ok(None);
        }
        let simulated = self.sim.simulate(&self.graph, head)?;
        let Some(first) = simulated.branch else {
            return Err(DecompileError::ConditionGraph { offset: self.graph.offset(head) });
        };
        let prefix = simulated.exit_stack;
        let mut blocks = vec![head];
        let mut conditions = vec![first];
        let mut best: Option<(usize, BlockId, BlockId)> = None;
        loop {
            let next = self.graph.next_live(blocks[blocks.len() - 1]);
            if let Some(join) = chain_join(&self.graph, &blocks, next) {
                best = Some((blocks.len(), next, join));
            }
            if next >= hi {
                break;
            }
            match self.follower_condition(next, &blocks, &prefix) {
                Some(condition) => {
                    blocks.push(next);
                    conditions.push(condition);
                }
                None => break,
            }
        }
        let Some((len, body, join)) = best else {
            return Ok(None);
        };
        blocks.truncate(len);
        conditions.truncate(len);
        trace!(head = self.graph.offset(head), blocks = len, "conditional chain");
        Ok(Some(Chain {
            blocks,
            conditions,
            head_statements: simulated.statements,
            prefix,
            body,
            join,
        }))
    }

    /// The chain ending at `last` whose tests lead to `body` or `join`, with
    /// the earliest possible head no earlier than `lo`.
    pub(crate) fn chain_ending_at(
        &mut self,
        lo: BlockId,
        last: BlockId,
        body: BlockId,
        join: BlockId,
    ) -> Result<Option<Chain>, DecompileError> {
        let ids = self.graph.live_ids(lo, last + 1);
        let mut found = None;
        for start in (0..ids.len()).rev() {
            if !self.is_conditional_code(ids[start]) {
                break;
            }
            let candidate = &ids[start..];
            if let Some(chain) = self.chain_from(candidate, body, join)? {
                found = Some(chain);
            }
        }
        Ok(found)
    }

    fn chain_from(&mut self, blocks: &[BlockId], body: BlockId, join: BlockId) -> Result<Option<Chain>, DecompileError> {
        let Some(exit) = chain_join(&self.graph, blocks, body) else {
            return Ok(None);
        };
        if self.graph.offset(exit) != self.graph.offset(join) {
            return Ok(None);
        }
        let head = blocks[0];
        let simulated = self.sim.simulate(&self.graph, head)?;
        let Some(first) = simulated.branch else {
            return Ok(None);
        };
        let prefix = simulated.exit_stack;
        let mut conditions = vec![first];
        for (i, &id) in blocks.iter().enumerate().skip(1) {
            match self.follower_condition(id, &blocks[..i], &prefix) {
                Some(condition) => conditions.push(condition),
                None => return Ok(None),
            }
        }
        Ok(Some(Chain {
            blocks: blocks.to_vec(),
            conditions,
            head_statements: simulated.statements,
            prefix,
            body,
            join,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_attribute::{Instruction, MethodCode};
    use crate::decompile::cfg::build_graph;
    use crate::decompile::expr::CompareOp;
    use crate::decompile::locals::LocalId;

    fn chain_of(blocks: Vec<BlockId>, conditions: Vec<Condition>, body: BlockId, join: BlockId) -> Chain {
        Chain {
            blocks,
            conditions,
            head_statements: Vec::new(),
            prefix: Vec::new(),
            body,
            join,
        }
    }

    fn limits() -> ConditionLimits {
        ConditionLimits {
            simplify: false,
            max_paths: 256,
            simplify_limits: SimplifyLimits::default(),
        }
    }

    #[test]
    fn test_and_chain_paths() {
        // if (a && b) { x }  :  a; ifeq J; b; ifeq J; x; J: return
        let code = MethodCode::sequential(vec![
            Instruction::Iload(0),
            Instruction::Ifeq(4),
            Instruction::Iload(1),
            Instruction::Ifeq(2),
            Instruction::Nop,
            Instruction::Return,
        ]);
        let graph = build_graph(&code).unwrap();
        let a = Condition::test(Expr::Local(LocalId(0)));
        let b = Condition::test(Expr::Local(LocalId(1)));
        // taken conditions are the inverted tests
        let chain = chain_of(vec![0, 1], vec![a.invert(), b.invert()], 2, 3);
        assert_eq!(chain_join(&graph, &chain.blocks, 2), Some(3));
        let condition = build_condition(&graph, &chain, 2, 3, limits()).unwrap();
        assert_eq!(condition, Condition::and(vec![a, b]));
    }

    #[test]
    fn test_unexpected_exit_is_condition_graph_error() {
        let code = MethodCode::sequential(vec![
            Instruction::Iload(0),
            Instruction::Ifeq(2),
            Instruction::Nop,
            Instruction::Return,
        ]);
        let graph = build_graph(&code).unwrap();
        let lt = Condition::compare(CompareOp::Lt, Expr::Local(LocalId(0)), Expr::IntLiteral(0));
        // the taken edge leads to neither the body nor the join
        let chain = chain_of(vec![0], vec![lt], 1, 1);
        assert!(matches!(
            build_condition(&graph, &chain, 1, 1, limits()),
            Err(DecompileError::ConditionGraph { offset: 0 })
        ));
    }
}
