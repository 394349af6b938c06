//! Source control-flow graphs.
//!
//! The input side of PEG construction: a function is an ordered arena of
//! basic blocks, each ending in a terminator. Blocks carry no instructions;
//! the construction only consumes the branching shape of the graph, so a
//! block is its name, its terminator and its position.
//!
//! The first block added to a [`Function`] is its entry.

pub mod loops;

pub use loops::{Loop, LoopId, LoopInfo};

use std::fmt;

/// Basic block identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// How control leaves a basic block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    /// Unconditional transfer to a single successor.
    Jump(BlockId),
    /// Two-way conditional branch. The true and false arms are
    /// distinguishable and stable across queries.
    Branch {
        then_dest: BlockId,
        else_dest: BlockId,
    },
    /// Leave the function; no successors.
    Return,
    /// Multi-way branch. Representable so callers can hand over arbitrary
    /// functions, but the PEG builder rejects it up front.
    Switch(Vec<BlockId>),
}

impl Terminator {
    /// Successor blocks, in arm order.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Jump(dest) => vec![*dest],
            Terminator::Branch {
                then_dest,
                else_dest,
            } => vec![*then_dest, *else_dest],
            Terminator::Return => Vec::new(),
            Terminator::Switch(dests) => dests.clone(),
        }
    }
}

/// A basic block: a name for diagnostics plus the terminator shape.
#[derive(Debug, Clone)]
pub struct Block {
    pub name: String,
    pub terminator: Option<Terminator>,
}

/// A function: an ordered collection of basic blocks.
///
/// Blocks are created with [`Function::add_block`] and wired up with
/// [`Function::terminate`]. The first block added is the entry.
#[derive(Debug, Clone)]
pub struct Function {
    name: String,
    blocks: Vec<Block>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a new block with no terminator yet.
    pub fn add_block(&mut self, name: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block {
            name: name.into(),
            terminator: None,
        });
        id
    }

    /// Install the terminator of `block`, replacing any previous one.
    pub fn terminate(&mut self, block: BlockId, terminator: Terminator) {
        self.blocks[block.index()].terminator = Some(terminator);
    }

    /// The entry block. The first block added plays this role.
    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Iterate over all blocks in creation order.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (BlockId(i as u32), b))
    }

    /// Successors of `block`, in terminator arm order. Empty for blocks
    /// without a terminator.
    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        match &self.blocks[block.index()].terminator {
            Some(t) => t.successors(),
            None => Vec::new(),
        }
    }

    /// Predecessor lists for every block, in a stable order: predecessors
    /// appear in the order their blocks were created.
    pub fn predecessor_map(&self) -> Vec<Vec<BlockId>> {
        let mut preds: Vec<Vec<BlockId>> = vec![Vec::new(); self.blocks.len()];
        for (id, _) in self.blocks() {
            for succ in self.successors(id) {
                preds[succ.index()].push(id);
            }
        }
        preds
    }

    /// Dense successor adjacency, for the dominance core.
    pub(crate) fn successor_indices(&self) -> Vec<Vec<usize>> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, _)| {
                self.successors(BlockId(i as u32))
                    .into_iter()
                    .map(BlockId::index)
                    .collect()
            })
            .collect()
    }
}
