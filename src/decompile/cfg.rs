use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::code_attribute::{Instruction, MethodCode};

use super::cfg_types::*;
use super::error::DecompileError;

const THROWABLE: &str = "java/lang/Throwable";

/// Build the block graph of a method.
///
/// Blocks are cut at every branch target, after every control transfer and at
/// every exception range boundary and handler. Protected ranges are
/// represented by marker blocks placed in address order: at one address the
/// ends of ranges come first (innermost first), then handler entries, then the
/// starts of ranges (outermost first), then the code block.
pub fn build_graph(code: &MethodCode) -> Result<BlockGraph, DecompileError> {
    let addr_to_idx: BTreeMap<u32, usize> = code
        .instructions
        .iter()
        .enumerate()
        .map(|(i, instr)| (instr.address, i))
        .collect();
    let is_boundary = |address: u32| addr_to_idx.contains_key(&address);
    let resolve = |from: u32, offset: i32| -> Result<u32, DecompileError> {
        let target = from as i64 + offset as i64;
        if target >= 0 && target <= u32::MAX as i64 && is_boundary(target as u32) {
            Ok(target as u32)
        } else {
            Err(DecompileError::MissingBlock {
                from,
                target: target.clamp(0, u32::MAX as i64) as u32,
            })
        }
    };

    // Step 1: block leaders
    let mut leaders = BTreeSet::new();
    if let Some(first) = code.instructions.first() {
        leaders.insert(first.address);
    }
    for (i, addressed) in code.instructions.iter().enumerate() {
        let instr = &addressed.instruction;
        if let Instruction::Jsr(_) | Instruction::JsrW(_) | Instruction::Ret(_) = instr {
            return Err(DecompileError::UnsupportedInstruction {
                offset: addressed.address,
                mnemonic: mnemonic(instr).into(),
            });
        }
        for offset in instr.jump_offsets() {
            leaders.insert(resolve(addressed.address, offset)?);
        }
        if instr.ends_block() {
            let next = code.next_address(i);
            if next < code.code_length {
                leaders.insert(next);
            }
        }
    }

    // Step 2: protected regions
    let regions = build_regions(code, &is_boundary)?;
    for region in &regions {
        leaders.insert(region.start);
        if region.end < code.code_length {
            leaders.insert(region.end);
        }
        for handler in &region.handlers {
            leaders.insert(handler.handler_pc);
        }
    }

    // Step 3: arena in address order
    let mut points: BTreeSet<u32> = leaders.clone();
    points.extend(regions.iter().map(|r| r.end));
    let mut blocks: Vec<Block> = Vec::new();
    let mut code_ids: BTreeMap<u32, BlockId> = BTreeMap::new();

    for &address in &points {
        let mut ends: Vec<usize> = (0..regions.len()).filter(|&r| regions[r].end == address).collect();
        ends.sort_by(|&a, &b| regions[b].start.cmp(&regions[a].start));
        for region in ends {
            push_marker(&mut blocks, address, BlockKind::TryEnd { region });
        }
        for (region, r) in regions.iter().enumerate() {
            for (handler, h) in r.handlers.iter().enumerate() {
                if h.handler_pc == address {
                    push_marker(&mut blocks, address, BlockKind::Handler { region, handler });
                }
            }
        }
        let mut starts: Vec<usize> = (0..regions.len()).filter(|&r| regions[r].start == address).collect();
        starts.sort_by(|&a, &b| regions[b].end.cmp(&regions[a].end));
        for region in starts {
            push_marker(&mut blocks, address, BlockKind::TryStart { region });
        }

        if !leaders.contains(&address) {
            continue;
        }
        let Some(&start_idx) = addr_to_idx.get(&address) else {
            continue;
        };
        let end_idx = leaders
            .range(address + 1..)
            .next()
            .and_then(|next| addr_to_idx.get(next).copied())
            .unwrap_or(code.instructions.len());
        let id = blocks.len();
        code_ids.insert(address, id);
        blocks.push(Block {
            id,
            start: address,
            end: code.next_address(end_idx - 1),
            kind: BlockKind::Code,
            instructions: code.instructions[start_idx..end_idx].to_vec(),
            terminator: Terminator::Return,
            predecessors: BTreeSet::new(),
            entry_stack: None,
            span_end: id,
        });
    }

    // Step 4: edges
    let jump = |from: u32, offset: i32| -> Result<BlockId, DecompileError> {
        let target = resolve(from, offset)?;
        code_ids
            .get(&target)
            .copied()
            .ok_or(DecompileError::MissingBlock { from, target })
    };
    for id in 0..blocks.len() {
        let terminator = match blocks[id].instructions.last() {
            Some(last) if blocks[id].is_code() => build_terminator(id, last.address, &last.instruction, &jump)?,
            _ => Terminator::FallThrough { target: id + 1 },
        };
        blocks[id].terminator = terminator;
    }

    let mut graph = BlockGraph {
        blocks,
        regions,
        code_length: code.code_length,
    };
    graph.recompute_predecessors();
    debug!(blocks = graph.len(), regions = graph.regions.len(), "built block graph");
    Ok(graph)
}

fn push_marker(blocks: &mut Vec<Block>, address: u32, kind: BlockKind) {
    let id = blocks.len();
    blocks.push(Block {
        id,
        start: address,
        end: address,
        kind,
        instructions: Vec::new(),
        terminator: Terminator::FallThrough { target: id + 1 },
        predecessors: BTreeSet::new(),
        entry_stack: None,
        span_end: id,
    });
}

/// Groups exception table entries by protected range; entries of one range
/// sharing a handler become one multi-type handler.
fn build_regions(code: &MethodCode, is_boundary: &dyn Fn(u32) -> bool) -> Result<Vec<TryRegion>, DecompileError> {
    let mut regions: Vec<TryRegion> = Vec::new();
    for entry in &code.exception_table {
        let malformed = DecompileError::MalformedExceptionTable {
            start: entry.start_pc,
            end: entry.end_pc,
            handler: entry.handler_pc,
        };
        let end_ok = entry.end_pc == code.code_length || is_boundary(entry.end_pc);
        if entry.start_pc >= entry.end_pc || !is_boundary(entry.start_pc) || !end_ok || !is_boundary(entry.handler_pc) {
            return Err(malformed);
        }
        let catch_type = entry.catch_type.clone().unwrap_or_else(|| THROWABLE.to_string());
        if entry.catch_type.is_none()
            && code
                .exception_table
                .iter()
                .any(|other| other.handler_pc == entry.handler_pc && (other.start_pc, other.end_pc) != (entry.start_pc, entry.end_pc))
        {
            // finally and synchronized blocks
            return Err(DecompileError::Unstructured { offset: entry.handler_pc });
        }

        let index = match regions
            .iter()
            .position(|r| r.start == entry.start_pc && r.end == entry.end_pc)
        {
            Some(index) => index,
            None => {
                regions.push(TryRegion {
                    start: entry.start_pc,
                    end: entry.end_pc,
                    handlers: Vec::new(),
                });
                regions.len() - 1
            }
        };
        let region = &mut regions[index];
        match region.handlers.iter_mut().find(|h| h.handler_pc == entry.handler_pc) {
            Some(handler) => handler.catch_types.push(catch_type),
            None => region.handlers.push(HandlerEntry {
                handler_pc: entry.handler_pc,
                catch_types: vec![catch_type],
            }),
        }
    }

    for a in &regions {
        for b in &regions {
            let overlapping = a.start < b.start && b.start < a.end && a.end < b.end;
            if overlapping {
                return Err(DecompileError::Unstructured { offset: b.start });
            }
        }
    }
    regions.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
    Ok(regions)
}

fn build_terminator(
    id: BlockId,
    addr: u32,
    instr: &Instruction,
    jump: &dyn Fn(u32, i32) -> Result<BlockId, DecompileError>,
) -> Result<Terminator, DecompileError> {
    if let Some(offset) = instr.conditional_offset() {
        return Ok(Terminator::Conditional {
            target: jump(addr, offset)?,
            else_target: id + 1,
        });
    }
    let terminator = match instr {
        Instruction::Goto(offset) | Instruction::GotoW(offset) => Terminator::Goto {
            target: jump(addr, *offset)?,
        },
        Instruction::Tableswitch { default, low, offsets, .. } => Terminator::Switch {
            default: jump(addr, *default)?,
            cases: offsets
                .iter()
                .enumerate()
                .map(|(i, offset)| Ok((low.wrapping_add(i as i32), jump(addr, *offset)?)))
                .collect::<Result<_, DecompileError>>()?,
        },
        Instruction::Lookupswitch { default, pairs } => Terminator::Switch {
            default: jump(addr, *default)?,
            cases: pairs
                .iter()
                .map(|(key, offset)| Ok((*key, jump(addr, *offset)?)))
                .collect::<Result<_, DecompileError>>()?,
        },
        Instruction::Return
        | Instruction::Ireturn
        | Instruction::Lreturn
        | Instruction::Freturn
        | Instruction::Dreturn
        | Instruction::Areturn => Terminator::Return,
        Instruction::Athrow => Terminator::Throw,
        _ => Terminator::FallThrough { target: id + 1 },
    };
    Ok(terminator)
}

/// Lower-case opcode name for diagnostics.
pub fn mnemonic(instr: &Instruction) -> String {
    let debug = format!("{:?}", instr);
    let name = debug
        .split(|c: char| !c.is_ascii_alphanumeric())
        .next()
        .unwrap_or_default();
    name.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_attribute::{ExceptionEntry, MethodCode};
    use crate::constant_info::MethodRef;

    fn call(name: &str) -> Instruction {
        Instruction::Invokestatic(MethodRef::new("Foo", name, "()V"))
    }

    #[test]
    fn test_conditional_edges() {
        // if (a) { x(); }
        let code = MethodCode::sequential(vec![
            Instruction::Iload(0),
            Instruction::Ifeq(2),
            call("x"),
            Instruction::Return,
        ]);
        let graph = build_graph(&code).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.blocks[0].terminator, Terminator::Conditional { target: 2, else_target: 1 });
        assert_eq!(graph.blocks[1].terminator, Terminator::FallThrough { target: 2 });
        assert_eq!(graph.blocks[2].predecessors, BTreeSet::from([0, 1]));
        assert_eq!(graph.offset(3), 4);
    }

    #[test]
    fn test_jump_outside_code_is_missing_block() {
        let code = MethodCode::sequential(vec![Instruction::Goto(7), Instruction::Return]);
        assert_eq!(
            build_graph(&code).unwrap_err(),
            DecompileError::MissingBlock { from: 0, target: 7 }
        );
    }

    #[test]
    fn test_exception_markers_in_address_order() {
        let code = MethodCode::sequential(vec![
            call("a"),
            Instruction::Goto(2),
            Instruction::Astore(0),
            Instruction::Return,
        ])
        .with_exception_table(vec![ExceptionEntry {
            start_pc: 0,
            end_pc: 1,
            handler_pc: 2,
            catch_type: Some("java/io/IOException".into()),
        }]);
        let graph = build_graph(&code).unwrap();
        let kinds: Vec<&BlockKind> = graph.blocks.iter().map(|b| &b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                &BlockKind::TryStart { region: 0 },
                &BlockKind::Code,
                &BlockKind::TryEnd { region: 0 },
                &BlockKind::Code,
                &BlockKind::Handler { region: 0, handler: 0 },
                &BlockKind::Code,
                &BlockKind::Code,
            ]
        );
        assert_eq!(graph.blocks[3].terminator, Terminator::Goto { target: 6 });
    }

    #[test]
    fn test_finally_handler_is_rejected() {
        let code = MethodCode::sequential(vec![call("a"), Instruction::Return, Instruction::Athrow])
            .with_exception_table(vec![
                ExceptionEntry { start_pc: 0, end_pc: 1, handler_pc: 2, catch_type: None },
                ExceptionEntry { start_pc: 1, end_pc: 2, handler_pc: 2, catch_type: None },
            ]);
        assert!(matches!(build_graph(&code), Err(DecompileError::Unstructured { .. })));
    }

    #[test]
    fn test_jsr_is_unsupported() {
        let code = MethodCode::sequential(vec![Instruction::Jsr(1), Instruction::Return]);
        assert_eq!(
            build_graph(&code).unwrap_err(),
            DecompileError::UnsupportedInstruction { offset: 0, mnemonic: "jsr".into() }
        );
    }

    #[test]
    fn test_dot_lists_branch_edges() {
        let code = MethodCode::sequential(vec![Instruction::Iload(0), Instruction::Ifeq(2), call("a"), Instruction::Return]);
        let dot = build_graph(&code).unwrap().to_dot();
        assert!(dot.starts_with("digraph blocks {"));
        assert!(dot.contains("b0 -> b2 [label=\"T\"]"));
        assert!(dot.contains("b0 -> b1 [label=\"F\"]"));
    }
}
