use super::cfg_types::*;
use super::error::DecompileError;
use super::structured_types::*;
use super::structuring::{push_section, Frame, FrameKind, Structurer};

impl<'r, 'o> Structurer<'r, 'o> {
    /// Matches a `tableswitch` or `lookupswitch` whose case bodies lie in
    /// address order after the switch block.
    pub(crate) fn match_switch(&mut self, head: BlockId, hi: BlockId) -> Result<bool, DecompileError> {
        let block = &self.graph.blocks[head];
        let Terminator::Switch { default, cases } = block.terminator.clone() else {
            return Ok(false);
        };
        if !block.is_code() {
            return Ok(false);
        }
        let head_offset = block.start;
        let simulated = self.sim.simulate(&self.graph, head)?;
        let key = simulated
            .switch_key
            .ok_or(DecompileError::Unstructured { offset: head_offset })?;
        if !simulated.exit_stack.is_empty() {
            return Err(DecompileError::StackDepthMismatch {
                offset: self.graph.blocks[head].end,
                expected: 0,
                found: simulated.exit_stack.len(),
            });
        }

        let targets: Vec<BlockId> = std::iter::once(default).chain(cases.iter().map(|(_, t)| *t)).collect();
        if targets.iter().any(|&t| self.graph.offset(t) <= head_offset) {
            return Err(DecompileError::Unstructured { offset: head_offset });
        }
        let first_case = self.graph.next_live(head);
        let mut exit = targets.iter().copied().max().unwrap_or(first_case);
        // Breaks out of the last case jump past its highest target.
        let mut id = first_case;
        while id < exit && id < hi {
            for successor in self.graph.blocks[id].terminator.successors() {
                if successor > exit && successor <= hi {
                    exit = successor;
                }
            }
            id = self.graph.next_live(id);
        }

        // Case arms grouped by target, in address order.
        let mut arms: Vec<(BlockId, Vec<SwitchLabel>)> = Vec::new();
        let labelled = cases
            .iter()
            .map(|&(value, target)| (target, SwitchLabel::Value(value)))
            .chain(std::iter::once((default, SwitchLabel::Default)));
        for (target, label) in labelled {
            if label == SwitchLabel::Default && self.same_position(target, exit) {
                continue;
            }
            match arms.iter_mut().find(|(t, _)| self.graph.offset(*t) == self.graph.offset(target)) {
                Some((_, labels)) => labels.push(label),
                None => arms.push((target, vec![label])),
            }
        }
        arms.sort_by_key(|(t, _)| self.graph.offset(*t));

        let exit_block = self.boundary(exit, first_case, hi);
        let starts: Vec<BlockId> = arms.iter().map(|(t, _)| self.boundary(*t, first_case, hi)).collect();
        if let Some(&first) = starts.first() {
            if first != first_case {
                return Err(DecompileError::Unstructured { offset: head_offset });
            }
        }

        let label = self.fresh_label();
        self.frames.push(Frame {
            label,
            kind: FrameKind::Switch,
            continue_target: None,
            break_target: exit,
        });
        let arm_count = arms.len();
        let mut switch_cases = Vec::with_capacity(arm_count);
        for (i, (_, labels)) in arms.into_iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(exit_block);
            let follow = starts.get(i + 1).copied().unwrap_or(exit);
            let sections = match self.structure_range(starts[i], end, follow) {
                Ok(sections) => sections,
                Err(e) => {
                    self.frames.pop();
                    return Err(e);
                }
            };
            let mut body = StatementBlock::from_sections(BlockRole::CaseBody, sections);
            let breaks = match body.statements.last() {
                Some(Statement::Break { target, .. }) if *target == label => {
                    body.statements.pop();
                    true
                }
                Some(last) => last.is_jump() || i + 1 == arm_count,
                None => i + 1 == arm_count,
            };
            switch_cases.push(SwitchCase { labels, body, breaks });
        }
        self.frames.pop();

        let mut sections = Vec::new();
        push_section(&mut sections, Section::Linear(simulated.statements));
        sections.push(Section::Construct(Statement::Switch {
            label,
            key,
            cases: switch_cases,
        }));
        self.replace(head, exit_block - 1, sections, Terminator::FallThrough { target: exit });
        Ok(true)
    }
}
