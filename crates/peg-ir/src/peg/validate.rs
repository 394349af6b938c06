//! PEG validation.
//!
//! Checks that a built PEG is well-formed against its source function:
//! - The block-level successor graph is acyclic
//! - Every loop header has exactly one virtual forward twin, outside all loops
//! - Latch edges target twins; all other edges target concrete blocks
//! - Every concrete block has exactly one condition node, twins have none
//! - Every non-entry concrete block has a child value; the entry and the
//!   twins have none
//! - No φ selects between equal arms

use std::collections::HashSet;

use indexmap::IndexMap;

use super::types::{PegFunction, PegNode, PegNodeId};
use crate::cfg::{BlockId, Function, LoopInfo};

/// A structural defect found in a built PEG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PegValidationError {
    /// The block graph contains a cycle through this block.
    CyclicBlockGraph { block: String },
    /// A loop header has no virtual forward twin.
    MissingVirtualTwin { header: String },
    /// A loop header has more than one virtual forward twin.
    DuplicateVirtualTwin { header: String },
    /// A virtual forward block mirrors a source block that is not a loop
    /// header.
    OrphanVirtualBlock { block: String },
    /// A virtual forward block carries a surrounding loop.
    TwinInsideLoop { block: String },
    /// A latch still has an edge to the concrete loop header.
    LatchEdgeToConcreteHeader { latch: String, header: String },
    /// A non-latch predecessor has an edge to the virtual forward twin.
    NonLatchEdgeToTwin { pred: String, twin: String },
    /// A concrete block has no condition node.
    MissingCondition { block: String },
    /// A block has more than one condition node.
    DuplicateCondition { block: String },
    /// A virtual forward block has a condition node.
    ConditionOnVirtualBlock { block: String },
    /// A non-entry concrete block has no child value.
    MissingChild { block: String },
    /// The entry block or a virtual twin has a child value.
    UnexpectedChild { block: String },
    /// A φ node selects between two identical arms.
    PhiWithEqualArms { phi: String },
}

/// Validate `peg` against the source function and loop forest it was built
/// from. Returns all defects found.
pub fn validate(
    peg: &PegFunction,
    src: &Function,
    loops: &LoopInfo,
) -> Result<(), Vec<PegValidationError>> {
    let mut errors = Vec::new();

    check_acyclic(peg, &mut errors);
    check_twins(peg, loops, &mut errors);
    check_edges(peg, src, loops, &mut errors);
    check_conditions(peg, &mut errors);
    check_children(peg, &mut errors);
    check_phis(peg, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Depth-first cycle check over the block successor graph.
fn check_acyclic(peg: &PegFunction, errors: &mut Vec<PegValidationError>) {
    let mut visited = HashSet::new();
    let mut on_stack = HashSet::new();

    for block in peg.blocks() {
        if !visited.contains(&block) {
            cycle_dfs(peg, block, &mut visited, &mut on_stack, errors);
        }
    }
}

fn cycle_dfs(
    peg: &PegFunction,
    block: PegNodeId,
    visited: &mut HashSet<PegNodeId>,
    on_stack: &mut HashSet<PegNodeId>,
    errors: &mut Vec<PegValidationError>,
) {
    visited.insert(block);
    on_stack.insert(block);

    for &succ in &peg.block(block).successors {
        if on_stack.contains(&succ) {
            errors.push(PegValidationError::CyclicBlockGraph {
                block: peg.block(succ).name.clone(),
            });
        } else if !visited.contains(&succ) {
            cycle_dfs(peg, succ, visited, on_stack, errors);
        }
    }

    on_stack.remove(&block);
}

fn check_twins(peg: &PegFunction, loops: &LoopInfo, errors: &mut Vec<PegValidationError>) {
    let mut twins_per_source: IndexMap<BlockId, Vec<PegNodeId>> = IndexMap::new();
    for block in peg.blocks() {
        let data = peg.block(block);
        if data.is_virtual_forward {
            twins_per_source.entry(data.source).or_default().push(block);
            if !loops.is_loop_header(data.source) {
                errors.push(PegValidationError::OrphanVirtualBlock {
                    block: data.name.clone(),
                });
            }
            if data.surrounding_loop.is_some() {
                errors.push(PegValidationError::TwinInsideLoop {
                    block: data.name.clone(),
                });
            }
        }
    }

    for block in peg.blocks() {
        let data = peg.block(block);
        if data.is_virtual_forward || !loops.is_loop_header(data.source) {
            continue;
        }
        match twins_per_source.get(&data.source).map(Vec::len).unwrap_or(0) {
            0 => errors.push(PegValidationError::MissingVirtualTwin {
                header: data.name.clone(),
            }),
            1 => {}
            _ => errors.push(PegValidationError::DuplicateVirtualTwin {
                header: data.name.clone(),
            }),
        }
    }
}

fn check_edges(
    peg: &PegFunction,
    src: &Function,
    loops: &LoopInfo,
    errors: &mut Vec<PegValidationError>,
) {
    // Source block -> concrete PEG block.
    let mut concrete: IndexMap<BlockId, PegNodeId> = IndexMap::new();
    for block in peg.blocks() {
        let data = peg.block(block);
        if !data.is_virtual_forward {
            concrete.insert(data.source, block);
        }
    }

    let preds = src.predecessor_map();
    for (l, lp) in loops.iter() {
        let Some(&header) = concrete.get(&lp.header) else {
            continue;
        };
        let Some(twin) = peg.block(header).virtual_forward else {
            continue;
        };
        for &pred in &preds[lp.header.index()] {
            let Some(&pred_block) = concrete.get(&pred) else {
                continue;
            };
            let succs = &peg.block(pred_block).successors;
            if loops.is_latch(l, pred) {
                if succs.contains(&header) {
                    errors.push(PegValidationError::LatchEdgeToConcreteHeader {
                        latch: peg.block(pred_block).name.clone(),
                        header: peg.block(header).name.clone(),
                    });
                }
            } else if succs.contains(&twin) {
                errors.push(PegValidationError::NonLatchEdgeToTwin {
                    pred: peg.block(pred_block).name.clone(),
                    twin: peg.block(twin).name.clone(),
                });
            }
        }
    }
}

fn check_conditions(peg: &PegFunction, errors: &mut Vec<PegValidationError>) {
    let mut count: IndexMap<PegNodeId, usize> = IndexMap::new();
    for (_, node) in peg.nodes() {
        if let PegNode::Condition(cond) = node {
            *count.entry(cond.block).or_default() += 1;
        }
    }

    for block in peg.blocks() {
        let data = peg.block(block);
        let n = count.get(&block).copied().unwrap_or(0);
        if data.is_virtual_forward {
            if n > 0 {
                errors.push(PegValidationError::ConditionOnVirtualBlock {
                    block: data.name.clone(),
                });
            }
        } else {
            match n {
                0 => errors.push(PegValidationError::MissingCondition {
                    block: data.name.clone(),
                }),
                1 => {}
                _ => errors.push(PegValidationError::DuplicateCondition {
                    block: data.name.clone(),
                }),
            }
        }
    }
}

fn check_children(peg: &PegFunction, errors: &mut Vec<PegValidationError>) {
    for block in peg.blocks() {
        let data = peg.block(block);
        let expects_child = !data.is_entry && !data.is_virtual_forward;
        match (&data.child, expects_child) {
            (None, true) => errors.push(PegValidationError::MissingChild {
                block: data.name.clone(),
            }),
            (Some(_), false) => errors.push(PegValidationError::UnexpectedChild {
                block: data.name.clone(),
            }),
            _ => {}
        }
    }
}

fn check_phis(peg: &PegFunction, errors: &mut Vec<PegValidationError>) {
    for (_, node) in peg.nodes() {
        if let PegNode::Phi(phi) = node {
            if phi.then_node == phi.else_node {
                errors.push(PegValidationError::PhiWithEqualArms {
                    phi: phi.name.clone(),
                });
            }
        }
    }
}
