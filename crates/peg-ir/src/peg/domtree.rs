//! Dominance over the augmented PEG block graph.
//!
//! Computed once, after every block edge has been installed and before any
//! input is synthesized. This tree, not the source function's, answers every
//! dominance and reachability question during synthesis; the two graphs
//! disagree around loop headers, where the APEG reroutes back edges into
//! virtual forward twins.

use indexmap::IndexMap;

use super::types::{PegFunction, PegNodeId};
use crate::domtree::DomTree;

/// The dominator tree of a frozen APEG, rooted at the concrete entry block.
pub struct PegDomTree {
    core: DomTree,
    index_of: IndexMap<PegNodeId, usize>,
    blocks: Vec<PegNodeId>,
}

impl PegDomTree {
    /// Compute dominance for `func`.
    ///
    /// # Panics
    ///
    /// Panics if `func` has no entry block.
    pub fn compute(func: &PegFunction) -> Self {
        let blocks: Vec<PegNodeId> = func.blocks().collect();
        let index_of: IndexMap<PegNodeId, usize> =
            blocks.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        let succs: Vec<Vec<usize>> = blocks
            .iter()
            .map(|&id| {
                func.block(id)
                    .successors
                    .iter()
                    .map(|s| index_of[s])
                    .collect()
            })
            .collect();

        let entry = func.entry_block().expect("function has no entry block");
        let core = DomTree::compute(&succs, index_of[&entry]);

        Self {
            core,
            index_of,
            blocks,
        }
    }

    pub fn entry(&self) -> PegNodeId {
        self.blocks[self.core.entry()]
    }

    /// The immediate dominator of `block`, or `None` for the entry.
    pub fn idom(&self, block: PegNodeId) -> Option<PegNodeId> {
        self.core.idom(self.index_of[&block]).map(|i| self.blocks[i])
    }

    /// Whether `a` dominates `b` in the APEG. Reflexive.
    pub fn dominates(&self, a: PegNodeId, b: PegNodeId) -> bool {
        self.core.dominates(self.index_of[&a], self.index_of[&b])
    }

    /// The nearest common dominator of two blocks.
    pub fn nearest_common_dominator(&self, a: PegNodeId, b: PegNodeId) -> PegNodeId {
        let ncd = self
            .core
            .nearest_common_dominator(self.index_of[&a], self.index_of[&b]);
        self.blocks[ncd]
    }
}
