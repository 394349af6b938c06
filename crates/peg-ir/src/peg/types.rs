//! The PEG node universe.
//!
//! Every node of a program expression graph lives in a single arena owned by
//! its [`PegFunction`]; nodes refer to one another by [`PegNodeId`]. Id-based
//! references are what make the θ back-link legal: the step of a loop
//! recurrence transitively refers to the recurrence itself, so ownership must
//! not follow the value edges.

use std::fmt;

use crate::cfg::{BlockId, LoopId};

/// PEG node identifier, dense per [`PegFunction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PegNodeId(pub u32);

impl PegNodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PegNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A basic block of the augmented PEG.
///
/// Concrete blocks mirror source blocks one-to-one. Loop headers
/// additionally get a virtual forward twin: a second block with the same
/// source reference that absorbs the back edges, leaving the block graph
/// acyclic. The twin sits outside every loop.
#[derive(Debug, Clone)]
pub struct PegBlock {
    pub name: String,
    /// The mirrored source block. Twins share this with their concrete
    /// counterpart, so blocks are told apart by identity, not by source.
    pub source: BlockId,
    /// Innermost surrounding loop. Always `None` on virtual forward blocks.
    pub surrounding_loop: Option<LoopId>,
    pub is_entry: bool,
    pub is_virtual_forward: bool,
    /// The virtual forward twin. Set at construction on concrete loop
    /// headers, never afterwards.
    pub virtual_forward: Option<PegNodeId>,
    pub predecessors: Vec<PegNodeId>,
    pub successors: Vec<PegNodeId>,
    /// The value this block carries when live: installed once by input
    /// synthesis on every non-entry concrete block.
    pub child: Option<PegNodeId>,
}

impl PegBlock {
    /// Whether this block plays the loop-header role during synthesis.
    /// Virtual forward twins never do, even though they share the header's
    /// source block.
    pub fn is_loop_header(&self, loops: &crate::cfg::LoopInfo) -> bool {
        !self.is_virtual_forward && loops.is_loop_header(self.source)
    }
}

/// The branch predicate of a two-way conditional block.
#[derive(Debug, Clone)]
pub struct PegCondition {
    pub name: String,
    /// The block whose terminator this condition abstracts.
    pub block: PegNodeId,
}

/// Selects `then_node` when `condition` holds, `else_node` otherwise.
///
/// The builder never constructs a φ whose arms are equal; the common value
/// is returned directly instead.
#[derive(Debug, Clone)]
pub struct PegPhi {
    pub name: String,
    pub condition: PegNodeId,
    pub then_node: PegNodeId,
    pub else_node: PegNodeId,
}

/// A loop recurrence: iteration 0 evaluates to `initial`, iteration n+1 to
/// `step` after one traversal of the back edge.
#[derive(Debug, Clone)]
pub struct PegTheta {
    pub name: String,
    pub initial: PegNodeId,
    pub step: PegNodeId,
}

/// A node of the program expression graph.
#[derive(Debug, Clone)]
pub enum PegNode {
    Block(PegBlock),
    Condition(PegCondition),
    Phi(PegPhi),
    Theta(PegTheta),
}

impl PegNode {
    pub fn name(&self) -> &str {
        match self {
            PegNode::Block(b) => &b.name,
            PegNode::Condition(c) => &c.name,
            PegNode::Phi(p) => &p.name,
            PegNode::Theta(t) => &t.name,
        }
    }

    pub fn as_block(&self) -> Option<&PegBlock> {
        match self {
            PegNode::Block(b) => Some(b),
            _ => None,
        }
    }

    /// The kind-specific value edges of this node, in a fixed order.
    pub fn operands(&self) -> Vec<PegNodeId> {
        match self {
            PegNode::Block(b) => b.child.into_iter().collect(),
            PegNode::Condition(c) => vec![c.block],
            PegNode::Phi(p) => vec![p.condition, p.then_node, p.else_node],
            PegNode::Theta(t) => vec![t.initial, t.step],
        }
    }
}

/// An owning container for one function's PEG.
///
/// Holds two ordered sequences: the node arena (blocks included) and the
/// block list. Dropping the function releases every node; nothing is removed
/// earlier.
#[derive(Debug, Clone)]
pub struct PegFunction {
    name: String,
    nodes: Vec<PegNode>,
    blocks: Vec<PegNodeId>,
}

impl PegFunction {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn add_node(&mut self, node: PegNode) -> PegNodeId {
        let id = PegNodeId(self.nodes.len() as u32);
        if matches!(node, PegNode::Block(_)) {
            self.blocks.push(id);
        }
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: PegNodeId) -> &PegNode {
        &self.nodes[id.index()]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All nodes in allocation order.
    pub fn nodes(&self) -> impl Iterator<Item = (PegNodeId, &PegNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (PegNodeId(i as u32), n))
    }

    /// All blocks (concrete and virtual) in allocation order.
    pub fn blocks(&self) -> impl Iterator<Item = PegNodeId> + '_ {
        self.blocks.iter().copied()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// The block data of `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not refer to a block node.
    pub fn block(&self, id: PegNodeId) -> &PegBlock {
        match &self.nodes[id.index()] {
            PegNode::Block(b) => b,
            other => panic!("node {} ({}) is not a basic block", id, other.name()),
        }
    }

    pub(crate) fn block_mut(&mut self, id: PegNodeId) -> &mut PegBlock {
        match &mut self.nodes[id.index()] {
            PegNode::Block(b) => b,
            other => panic!("node {} ({}) is not a basic block", id, other.name()),
        }
    }

    /// The concrete entry block.
    pub fn entry_block(&self) -> Option<PegNodeId> {
        self.blocks
            .iter()
            .copied()
            .find(|&id| self.block(id).is_entry)
    }

    /// The synthesized value of `block`, if installed.
    pub fn child_of(&self, block: PegNodeId) -> Option<PegNodeId> {
        self.block(block).child
    }

    /// All condition nodes, in allocation order.
    pub fn condition_nodes(&self) -> impl Iterator<Item = (PegNodeId, &PegCondition)> {
        self.nodes().filter_map(|(id, node)| match node {
            PegNode::Condition(c) => Some((id, c)),
            _ => None,
        })
    }

    pub(crate) fn add_edge(&mut self, from: PegNodeId, to: PegNodeId) {
        self.block_mut(from).successors.push(to);
        self.block_mut(to).predecessors.push(from);
    }
}
