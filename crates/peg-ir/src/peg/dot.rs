//! Graphviz rendering of PEG functions.
//!
//! Two views exist per function: the value graph (φ/θ/condition nodes and
//! the block child edges) and the block-level APEG. Rendering is plain
//! string building; file emission is a thin convenience on top.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use super::types::{PegFunction, PegNode, PegNodeId};

/// Rendering toggles.
///
/// The builder itself ignores these; they only shape the debug output.
#[derive(Debug, Clone, Default)]
pub struct DotConfig {
    /// Also draw condition nodes that no φ selects on. Off by default:
    /// every block owns a condition node, and the unused ones drown the
    /// graph.
    pub draw_all_condition_nodes: bool,
}

/// Render the PEG value graph in Graphviz format.
pub fn render_value_graph(func: &PegFunction, config: &DotConfig) -> String {
    let mut used = vec![false; func.node_count()];
    for (_, node) in func.nodes() {
        if let PegNode::Phi(phi) = node {
            used[phi.condition.0 as usize] = true;
        }
    }
    let hidden = |id: PegNodeId, node: &PegNode| {
        matches!(node, PegNode::Condition(_))
            && !used[id.0 as usize]
            && !config.draw_all_condition_nodes
    };

    let mut out = String::new();
    let _ = writeln!(out, "digraph \"PEGs for '{}' function\" {{", func.name());
    for (id, node) in func.nodes() {
        if hidden(id, node) {
            continue;
        }
        let shape = match node {
            PegNode::Condition(_) => ",shape=ellipse",
            PegNode::Theta(_) => ",shape=doublecircle",
            _ => "",
        };
        let _ = writeln!(
            out,
            "\t{} [label=\"{}\",fontname=menlo,color=\"#707070\"{}];",
            id,
            node.name(),
            shape
        );
    }
    for (id, node) in func.nodes() {
        if hidden(id, node) {
            continue;
        }
        let arrow = if matches!(node, PegNode::Condition(_)) {
            "arrowhead=none,weight=2"
        } else {
            "arrowhead=empty"
        };
        for operand in node.operands() {
            if hidden(operand, func.node(operand)) {
                continue;
            }
            let _ = writeln!(
                out,
                "\t{} -> {} [splines=true,color=\"#707070\",{}];",
                id, operand, arrow
            );
        }
    }
    out.push_str("}\n");
    out
}

/// Render the block-level APEG in Graphviz format.
pub fn render_block_graph(func: &PegFunction) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph \"PEGBBs for '{}' function\" {{", func.name());
    for block in func.blocks() {
        let _ = writeln!(
            out,
            "\t{} [label=\"{}\",fontname=menlo];",
            block,
            func.block(block).name
        );
    }
    for block in func.blocks() {
        for &succ in &func.block(block).successors {
            let _ = writeln!(
                out,
                "\t{} -> {} [splines=true,color=\"#707070\"];",
                block, succ
            );
        }
    }
    out.push_str("}\n");
    out
}

/// Write both views of `func` into `dir`, as `peg.<name>.dot` and
/// `pegbbs.<name>.dot`.
pub fn write_dot_files(func: &PegFunction, config: &DotConfig, dir: &Path) -> io::Result<()> {
    fs::write(
        dir.join(format!("peg.{}.dot", func.name())),
        render_value_graph(func, config),
    )?;
    fs::write(
        dir.join(format!("pegbbs.{}.dot", func.name())),
        render_block_graph(func),
    )
}
