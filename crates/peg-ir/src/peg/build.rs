//! APEG construction and the build driver.
//!
//! Building a PEG from a source function runs three phases in a fixed
//! order:
//!
//! 1. Allocate one concrete block per source block, a virtual forward twin
//!    per loop header and a condition node per concrete block, then wire
//!    predecessor edges so that latches point at the twins. The result is an
//!    acyclic shadow of the source graph.
//! 2. Recompute dominance over the frozen block graph.
//! 3. Synthesize the live-in value of every non-entry concrete block (see
//!    [`super::decide`]).
//!
//! Any structural violation aborts the whole build; callers get either a
//! complete [`PegFunction`] or a [`BuildError`], never something partial.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

use super::domtree::PegDomTree;
use super::types::{PegBlock, PegCondition, PegFunction, PegNode, PegNodeId};
use crate::cfg::{BlockId, Function, LoopInfo, Terminator};

/// An edge between APEG blocks.
///
/// The source is absent only on the synthetic root edge into the entry
/// block. Equality and ordering are structural, so edge sets are ordinary
/// ordered sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(super) struct BbEdge {
    pub source: Option<PegNodeId>,
    pub dest: PegNodeId,
}

impl BbEdge {
    pub fn new(source: PegNodeId, dest: PegNodeId) -> Self {
        Self {
            source: Some(source),
            dest,
        }
    }

    pub fn entry(dest: PegNodeId) -> Self {
        Self { source: None, dest }
    }

    /// The block this edge contributes to dominance and valuation queries:
    /// the source, or the destination for the sourceless root edge.
    pub fn source_block(&self) -> PegNodeId {
        self.source.unwrap_or(self.dest)
    }
}

/// Ordered edge set used throughout input synthesis.
pub(super) type BbEdgeSet = BTreeSet<BbEdge>;

/// Fatal errors raised while building a PEG.
///
/// Every variant names the offending source construct. The partially built
/// function is discarded; there are no recoverable cases and no retries.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The source function has no blocks at all.
    #[error("function '{0}' has no basic blocks")]
    EmptyFunction(String),

    /// A block has no terminator installed.
    #[error("block '{0}' has no terminator")]
    MissingTerminator(String),

    /// A block ends in a multi-way branch. Only unconditional jumps,
    /// two-way conditional branches and returns are supported.
    #[error("block '{0}' ends in a multi-way branch, which is not supported")]
    UnsupportedTerminator(String),

    /// Synthesis reached a block with no incoming edges.
    #[error("block '{0}' is unreachable from the entry")]
    UnreachableBlock(String),

    /// A common dominator was expected to end in a two-way conditional
    /// branch but does not.
    #[error("block '{0}' was expected to end in a two-way conditional branch")]
    NotTwoWayBranch(String),

    /// No condition node was recorded for a block that became a common
    /// dominator. Internal invariant violation.
    #[error("no condition node exists for block '{0}'")]
    MissingCondition(String),

    /// Splitting an in-edge set by branch direction left one side empty,
    /// which contradicts the common dominator being a conditional branch.
    #[error("the {arm} arm of the branch in block '{block}' selects no incoming edges")]
    EmptyBranchPartition { block: String, arm: &'static str },

    /// An incoming edge of `block` was reachable from both arms of the
    /// branch in `dom`, so the split is not a partition and the fold cannot
    /// make progress.
    #[error("an incoming edge of block '{block}' is reachable from both arms of '{dom}'")]
    AmbiguousBranchPartition { block: String, dom: String },

    /// The common dominator's loop chain escaped the loops under
    /// consideration, but no outermost escaping loop could be identified.
    /// Internal invariant violation.
    #[error("dominator '{0}' escapes its surrounding loops inconsistently")]
    InvalidLoopNesting(String),

    /// The value of a block depends on a loop it does not belong to, which
    /// requires the loop-break construct. That construct is not
    /// implemented; the build is rejected rather than guessed at.
    #[error("value of block '{0}' requires the unimplemented loop-break construct")]
    LoopBreakUnsupported(String),
}

/// Build the PEG of `func`, using `loops` as the loop oracle.
pub fn build(func: &Function, loops: &LoopInfo) -> Result<PegFunction, BuildError> {
    Builder::new(func, loops).run()
}

pub(super) struct Builder<'a> {
    pub(super) src: &'a Function,
    pub(super) loops: &'a LoopInfo,
    pub(super) peg: PegFunction,
    /// Source block index -> concrete PEG block. Virtual twins are reached
    /// through their concrete counterpart only.
    pub(super) bb_map: Vec<PegNodeId>,
    /// Concrete PEG block -> its condition node.
    pub(super) cond_map: IndexMap<PegNodeId, PegNodeId>,
    pub(super) root_edge: Option<BbEdge>,
    pub(super) domtree: Option<PegDomTree>,
    phi_counter: u32,
    theta_counter: u32,
}

impl<'a> Builder<'a> {
    fn new(src: &'a Function, loops: &'a LoopInfo) -> Self {
        Self {
            src,
            loops,
            peg: PegFunction::new(src.name()),
            bb_map: Vec::with_capacity(src.block_count()),
            cond_map: IndexMap::new(),
            root_edge: None,
            domtree: None,
            phi_counter: 0,
            theta_counter: 0,
        }
    }

    fn run(mut self) -> Result<PegFunction, BuildError> {
        if self.src.block_count() == 0 {
            return Err(BuildError::EmptyFunction(self.src.name().to_string()));
        }

        self.check_terminators()?;
        self.create_blocks();
        self.wire_edges();
        debug!(
            function = self.src.name(),
            blocks = self.peg.block_count(),
            "augmented block graph frozen, recomputing dominators"
        );
        self.domtree = Some(PegDomTree::compute(&self.peg));
        self.synthesize()?;
        Ok(self.peg)
    }

    /// Reject unsupported terminator shapes before allocating anything.
    fn check_terminators(&self) -> Result<(), BuildError> {
        for (_, block) in self.src.blocks() {
            match &block.terminator {
                None => return Err(BuildError::MissingTerminator(block.name.clone())),
                Some(Terminator::Switch(_)) => {
                    return Err(BuildError::UnsupportedTerminator(block.name.clone()));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Phase 1a: concrete blocks, virtual forward twins, condition nodes
    /// and the root edge.
    fn create_blocks(&mut self) {
        for (id, block) in self.src.blocks() {
            let is_entry = id == self.src.entry();
            let surrounding_loop = self.loops.loop_of(id);

            let twin = if self.loops.is_loop_header(id) {
                let twin = self.peg.add_node(PegNode::Block(PegBlock {
                    name: format!("{}-virtual", block.name),
                    source: id,
                    surrounding_loop: None,
                    is_entry: false,
                    is_virtual_forward: true,
                    virtual_forward: None,
                    predecessors: Vec::new(),
                    successors: Vec::new(),
                    child: None,
                }));
                debug!(block = %block.name, twin = %twin, "created virtual forward twin");
                Some(twin)
            } else {
                None
            };

            let name = if twin.is_some() {
                format!("{}-concrete", block.name)
            } else {
                block.name.clone()
            };
            let concrete = self.peg.add_node(PegNode::Block(PegBlock {
                name,
                source: id,
                surrounding_loop,
                is_entry,
                is_virtual_forward: false,
                virtual_forward: twin,
                predecessors: Vec::new(),
                successors: Vec::new(),
                child: None,
            }));

            let cond = self.peg.add_node(PegNode::Condition(PegCondition {
                name: format!("cond-{}", block.name),
                block: concrete,
            }));
            self.cond_map.insert(concrete, cond);
            self.bb_map.push(concrete);

            if is_entry {
                self.root_edge = Some(BbEdge::entry(concrete));
            }
        }
    }

    /// Phase 1b: predecessor edges, with latch edges redirected into the
    /// virtual forward twins.
    fn wire_edges(&mut self) {
        let preds = self.src.predecessor_map();
        for (id, _) in self.src.blocks() {
            for &pred in &preds[id.index()] {
                let from = self.bb_map[pred.index()];
                let to = self.apeg_target(pred, id);
                self.peg.add_edge(from, to);
            }
        }
    }

    /// The APEG block an edge from `pred` to `dest` lands on: the virtual
    /// forward twin when the edge is a back edge of `dest`'s loop, the
    /// concrete block otherwise.
    pub(super) fn apeg_target(&self, pred: BlockId, dest: BlockId) -> PegNodeId {
        let concrete = self.bb_map[dest.index()];
        if let Some(l) = self.loops.header_loop(dest) {
            if self.loops.is_latch(l, pred) {
                return self
                    .peg
                    .block(concrete)
                    .virtual_forward
                    .expect("loop header without a virtual forward twin");
            }
        }
        concrete
    }

    /// Phase 3: install the child value of every non-entry concrete block.
    fn synthesize(&mut self) -> Result<(), BuildError> {
        for i in 0..self.bb_map.len() {
            let block = self.bb_map[i];
            if self.peg.block(block).is_entry {
                continue;
            }
            let child = self.compute_inputs(block)?;
            self.peg.block_mut(block).child = Some(child);
        }
        Ok(())
    }

    /// The in-edge set of `block`; the entry block's only in-edge is the
    /// synthetic root edge.
    pub(super) fn in_edges(&self, block: PegNodeId) -> BbEdgeSet {
        let data = self.peg.block(block);
        if data.is_entry {
            return BbEdgeSet::from([self.root()]);
        }
        data.predecessors
            .iter()
            .map(|&p| BbEdge::new(p, block))
            .collect()
    }

    pub(super) fn root(&self) -> BbEdge {
        self.root_edge.expect("root edge not yet recorded")
    }

    pub(super) fn condition_of(&self, block: PegNodeId) -> Result<PegNodeId, BuildError> {
        self.cond_map.get(&block).copied().ok_or_else(|| {
            BuildError::MissingCondition(self.peg.block(block).name.clone())
        })
    }

    pub(super) fn fresh_phi_name(&mut self) -> String {
        let name = format!("phi-{}", self.phi_counter);
        self.phi_counter += 1;
        name
    }

    pub(super) fn fresh_theta_name(&mut self) -> String {
        let name = format!("theta-{}", self.theta_counter);
        self.theta_counter += 1;
        name
    }
}
