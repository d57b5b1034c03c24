use tracing::trace;

use super::cfg_types::*;
use super::error::DecompileError;
use super::expr::Expr;
use super::structured_types::*;
use super::structuring::Structurer;

impl<'r, 'o> Structurer<'r, 'o> {
    fn is_lone_goto(&self, id: BlockId) -> Option<BlockId> {
        let block = &self.graph.blocks[id];
        match (&block.kind, &block.terminator) {
            (BlockKind::Code, Terminator::Goto { target })
                if block.instructions.len() == 1 && block.instructions[0].instruction.is_unconditional_transfer() =>
            {
                Some(*target)
            }
            _ => None,
        }
    }

    /// Matches a protected region and its handlers. The region's end is the
    /// `goto` after the protected code, or the one closing a handler.
    pub(crate) fn match_try(&mut self, head: BlockId, hi: BlockId, follow: BlockId) -> Result<bool, DecompileError> {
        let BlockKind::TryStart { region } = self.graph.blocks[head].kind else {
            return Ok(false);
        };
        let head_offset = self.graph.offset(head);
        let unstructured = DecompileError::Unstructured { offset: head_offset };
        let try_end = self
            .graph
            .live_ids(head + 1, hi)
            .into_iter()
            .find(|&id| matches!(self.graph.blocks[id].kind, BlockKind::TryEnd { region: r } if r == region))
            .ok_or(unstructured.clone())?;

        let mut markers: Vec<(BlockId, usize)> = self
            .graph
            .live_ids(try_end + 1, hi)
            .into_iter()
            .filter_map(|id| match self.graph.blocks[id].kind {
                BlockKind::Handler { region: r, handler } if r == region => Some((id, handler)),
                _ => None,
            })
            .collect();
        markers.sort_by_key(|&(id, _)| self.graph.offset(id));
        let expected = self.graph.regions[region].handlers.len();
        let Some(&(first_marker, _)) = markers.first() else {
            return Err(unstructured);
        };
        if markers.len() != expected {
            return Err(unstructured);
        }
        let last_marker = markers[markers.len() - 1].0;

        // Only the jump over the handlers may sit between the protected code
        // and the first handler.
        let between: Vec<BlockId> = self
            .graph
            .live_ids(try_end + 1, first_marker)
            .into_iter()
            .filter(|&id| !self.graph.blocks[id].kind.is_marker())
            .collect();
        let end = match between.as_slice() {
            [] => None,
            [only] => Some(self.is_lone_goto(*only).ok_or(unstructured.clone())?),
            _ => return Err(unstructured),
        };
        let end = end.or_else(|| {
            markers.iter().enumerate().find_map(|(i, &(marker, _))| {
                let stop = markers.get(i + 1).map(|&(m, _)| m)?;
                let last = *self.graph.live_ids(marker, stop).last()?;
                match self.graph.blocks[last].terminator {
                    Terminator::Goto { target } if self.graph.offset(target) > self.graph.offset(last_marker) => Some(target),
                    _ => None,
                }
            })
        });
        let end_inside = end.filter(|&e| {
            let offset = self.graph.offset(e);
            offset > self.graph.offset(last_marker) && offset < self.graph.offset(hi)
        });
        let end_block = end_inside.map(|e| self.boundary(e, last_marker, hi)).unwrap_or(hi);
        let handler_follow = end.unwrap_or(follow);

        let body = self.structure_range(head + 1, try_end, try_end)?;
        let mut catches = Vec::with_capacity(markers.len());
        for (i, &(marker, handler)) in markers.iter().enumerate() {
            let stop = markers.get(i + 1).map(|&(m, _)| m).unwrap_or(end_block);
            let start = self.graph.next_live(marker);
            let catch_types = self.graph.regions[region].handlers[handler].catch_types.clone();
            let sections = self.structure_range(start, stop, handler_follow)?;
            let mut statements = StatementBlock::from_sections(BlockRole::CatchBody, sections);
            let local = match statements.statements.first() {
                Some(Statement::LocalStore { local, value: Expr::CaughtException(_) }) => {
                    let local = *local;
                    statements.statements.remove(0);
                    local
                }
                _ => {
                    let class_name = match catch_types.as_slice() {
                        [only] => only.as_str(),
                        _ => "java/lang/Throwable",
                    };
                    self.sim.locals_mut().exception_temporary(class_name)
                }
            };
            catches.push(CatchClause {
                exception_types: catch_types,
                local,
                body: statements,
            });
        }
        trace!(offset = head_offset, handlers = catches.len(), "protected region");

        let statement = Statement::TryCatch {
            body: StatementBlock::from_sections(BlockRole::TryBody, body),
            catches,
        };
        let terminator = match end {
            Some(e) if end_block < self.graph.len() && self.same_position(e, end_block) => {
                Terminator::FallThrough { target: end_block }
            }
            Some(e) => Terminator::Goto { target: e },
            None => Terminator::FallThrough { target: follow },
        };
        self.replace(head, end_block - 1, vec![Section::Construct(statement)], terminator);
        Ok(true)
    }
}
