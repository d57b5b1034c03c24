use std::collections::BTreeSet;
use std::fmt::Write;

use crate::code_attribute::AddressedInstruction;

use super::expr::Expr;
use super::structured_types::{Section, Statement};

/// Index of a block in the graph arena. Ids follow address order.
pub type BlockId = usize;

/// How a basic block ends.
#[derive(Clone, Debug, PartialEq)]
pub enum Terminator {
    /// Control continues with the next block in address order.
    FallThrough { target: BlockId },
    Goto { target: BlockId },
    /// `target` is taken when the branch condition holds.
    Conditional { target: BlockId, else_target: BlockId },
    Switch { default: BlockId, cases: Vec<(i32, BlockId)> },
    Return,
    Throw,
}

impl Terminator {
    /// Where control goes unconditionally, or when a branch is taken.
    pub fn target(&self) -> Option<BlockId> {
        match self {
            Terminator::FallThrough { target }
            | Terminator::Goto { target }
            | Terminator::Conditional { target, .. } => Some(*target),
            Terminator::Switch { default, .. } => Some(*default),
            Terminator::Return | Terminator::Throw => None,
        }
    }

    pub fn else_target(&self) -> Option<BlockId> {
        match self {
            Terminator::Conditional { else_target, .. } => Some(*else_target),
            _ => None,
        }
    }

    /// Case value to target map of a switch.
    pub fn additional_targets(&self) -> &[(i32, BlockId)] {
        match self {
            Terminator::Switch { cases, .. } => cases,
            _ => &[],
        }
    }

    pub fn successors(&self) -> Vec<BlockId> {
        let mut successors: Vec<BlockId> = self.target().into_iter().chain(self.else_target()).collect();
        successors.extend(self.additional_targets().iter().map(|(_, t)| *t));
        successors.sort_unstable();
        successors.dedup();
        successors
    }

    /// True if the block's code can be emitted inline, with its exit
    /// expressed by a jump statement at most.
    pub fn is_linear(&self) -> bool {
        !matches!(self, Terminator::Conditional { .. } | Terminator::Switch { .. })
    }
}

/// One catch entry of a protected region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerEntry {
    pub handler_pc: u32,
    /// Internal class names caught by this handler; several for a multi-catch.
    pub catch_types: Vec<String>,
}

/// A protected address range `[start, end)` with its handlers in table order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TryRegion {
    pub start: u32,
    pub end: u32,
    pub handlers: Vec<HandlerEntry>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BlockKind {
    /// Raw instructions.
    Code,
    /// Entry of protected region `region`. Marker blocks hold no instructions.
    TryStart { region: usize },
    TryEnd { region: usize },
    /// Entry of handler `handler` of `region`.
    Handler { region: usize, handler: usize },
    /// Code already turned into statements, pushing `exit_stack` on top of
    /// its entry stack.
    Prebuilt { statements: Vec<Statement>, exit_stack: Vec<Expr> },
    /// A finished structured region covering blocks `id..=span_end`.
    Processed { sections: Vec<Section> },
}

impl BlockKind {
    pub fn is_marker(&self) -> bool {
        matches!(
            self,
            BlockKind::TryStart { .. } | BlockKind::TryEnd { .. } | BlockKind::Handler { .. }
        )
    }
}

#[derive(Clone, Debug)]
pub struct Block {
    pub id: BlockId,
    /// Address of the first instruction, or the marked address for markers.
    pub start: u32,
    /// Address one past the last instruction.
    pub end: u32,
    pub kind: BlockKind,
    pub instructions: Vec<AddressedInstruction>,
    pub terminator: Terminator,
    /// Live blocks with an edge to this one.
    pub predecessors: BTreeSet<BlockId>,
    /// Operand stack on entry when it is not empty and not a caught exception.
    pub entry_stack: Option<Vec<Expr>>,
    /// Last arena block covered by this one. Equal to `id` until a region
    /// absorbs later blocks.
    pub span_end: BlockId,
}

impl Block {
    pub fn is_code(&self) -> bool {
        matches!(self.kind, BlockKind::Code)
    }
}

/// The block graph of one method: an arena in address order.
#[derive(Clone, Debug)]
pub struct BlockGraph {
    pub blocks: Vec<Block>,
    pub regions: Vec<TryRegion>,
    pub code_length: u32,
}

impl BlockGraph {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Address of block `id`; the end of the code for ids past the arena.
    pub fn offset(&self, id: BlockId) -> u32 {
        self.blocks.get(id).map(|b| b.start).unwrap_or(self.code_length)
    }

    /// The live block after live block `id`.
    pub fn next_live(&self, id: BlockId) -> BlockId {
        self.blocks.get(id).map(|b| b.span_end + 1).unwrap_or(id + 1)
    }

    /// Live blocks in `[lo, hi)`, starting from live block `lo`.
    pub fn live_ids(&self, lo: BlockId, hi: BlockId) -> Vec<BlockId> {
        let mut ids = Vec::new();
        let mut id = lo;
        while id < hi && id < self.blocks.len() {
            ids.push(id);
            id = self.next_live(id);
        }
        ids
    }

    /// The code block starting at `address`.
    pub fn code_block_at(&self, address: u32) -> Option<BlockId> {
        self.blocks
            .iter()
            .position(|b| b.start == address && !b.kind.is_marker())
    }

    /// Rebuilds every predecessor set from the terminators of live blocks.
    pub fn recompute_predecessors(&mut self) {
        for block in &mut self.blocks {
            block.predecessors.clear();
        }
        for id in self.live_ids(0, self.blocks.len()) {
            for successor in self.blocks[id].terminator.successors() {
                if let Some(block) = self.blocks.get_mut(successor) {
                    block.predecessors.insert(id);
                }
            }
        }
    }

    /// Graphviz rendering of the live blocks, for debugging.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph blocks {\n    node [shape=box];\n");
        for id in self.live_ids(0, self.blocks.len()) {
            let block = &self.blocks[id];
            let label = match &block.kind {
                BlockKind::Code => format!("{}..{}", block.start, block.end),
                BlockKind::TryStart { region } => format!("try {} start", region),
                BlockKind::TryEnd { region } => format!("try {} end", region),
                BlockKind::Handler { region, handler } => format!("catch {}.{}", region, handler),
                BlockKind::Prebuilt { .. } => format!("{}..{} (prebuilt)", block.start, block.end),
                BlockKind::Processed { sections } => {
                    format!("{} (processed, {} sections)", block.start, sections.len())
                }
            };
            let _ = writeln!(out, "    b{} [label=\"b{}: {}\"];", id, id, label);
            let edges = match &block.terminator {
                Terminator::Conditional { target, else_target } => {
                    vec![(*target, "T".to_string()), (*else_target, "F".to_string())]
                }
                Terminator::Switch { default, cases } => std::iter::once((*default, "default".to_string()))
                    .chain(cases.iter().map(|(v, t)| (*t, v.to_string())))
                    .collect(),
                other => other.target().map(|t| (t, String::new())).into_iter().collect(),
            };
            for (target, label) in edges {
                let _ = writeln!(out, "    b{} -> b{} [label=\"{}\"];", id, target, label);
            }
        }
        out.push_str("}\n");
        out
    }
}
