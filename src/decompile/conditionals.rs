use super::cfg_types::*;
use super::error::DecompileError;
use super::structured_types::*;
use super::structuring::Structurer;

impl<'r, 'o> Structurer<'r, 'o> {
    /// Matches `if`, `if/else` and, when the chain leaves the range, a
    /// single-jump `if` such as `if (c) break;`.
    pub(crate) fn match_conditional(&mut self, head: BlockId, hi: BlockId, follow: BlockId) -> Result<bool, DecompileError> {
        let Some(chain) = self.chain_at(head, hi)? else {
            return Ok(false);
        };
        if !chain.prefix.is_empty() {
            return Err(DecompileError::StackDepthMismatch {
                offset: self.graph.blocks[chain.last()].end,
                expected: 0,
                found: chain.prefix.len(),
            });
        }
        let mut sections = vec![Section::Linear(chain.head_statements.clone())];
        let body = chain.body;
        let join = chain.join;
        let head_offset = self.graph.offset(head);
        let join_offset = self.graph.offset(join);
        let join_inside = join_offset > head_offset && (join_offset < self.graph.offset(hi) || self.lands_on(join, follow));

        if !join_inside {
            let condition = self.build_condition(&chain, join, body)?;
            let jump = self
                .resolve_jump(chain.last(), join, follow, false)?
                .ok_or(DecompileError::Unstructured { offset: self.graph.offset(chain.last()) })?;
            sections.push(Section::Construct(Statement::If {
                condition,
                then_block: StatementBlock::new(BlockRole::Then, vec![jump]),
                else_block: None,
            }));
            self.replace(head, chain.last(), sections, Terminator::FallThrough { target: body });
            return Ok(true);
        }

        let condition = self.build_condition(&chain, body, join)?;
        let join_block = self.boundary(join, body, hi);
        let else_jump = self.graph.live_ids(body, join_block).last().and_then(|&last| match self.graph.blocks[last].terminator {
            Terminator::Goto { target } if self.graph.offset(target) > join_offset => Some(target),
            _ => None,
        });
        let else_jump = else_jump.filter(|&end| self.graph.offset(end) < self.graph.offset(hi) || self.lands_on(end, follow));

        match else_jump {
            Some(end) => {
                let else_end = if self.graph.offset(end) < self.graph.offset(hi) {
                    self.boundary(end, join_block, hi)
                } else {
                    hi
                };
                let then_sections = self.structure_range(body, join_block, end)?;
                let else_sections = self.structure_range(join_block, else_end, end)?;
                let else_block = StatementBlock::from_sections(BlockRole::Else, else_sections);
                sections.push(Section::Construct(Statement::If {
                    condition,
                    then_block: StatementBlock::from_sections(BlockRole::Then, then_sections),
                    else_block: Some(else_block).filter(|b| !b.is_empty()),
                }));
                let terminator = if else_end < self.graph.len() && self.same_position(end, else_end) {
                    Terminator::FallThrough { target: else_end }
                } else {
                    Terminator::Goto { target: end }
                };
                self.replace(head, else_end - 1, sections, terminator);
            }
            None => {
                let then_sections = self.structure_range(body, join_block, join)?;
                sections.push(Section::Construct(Statement::If {
                    condition,
                    then_block: StatementBlock::from_sections(BlockRole::Then, then_sections),
                    else_block: None,
                }));
                let terminator = if self.same_position(join, join_block) {
                    Terminator::FallThrough { target: join_block }
                } else {
                    Terminator::Goto { target: join }
                };
                self.replace(head, join_block - 1, sections, terminator);
            }
        }
        Ok(true)
    }
}
