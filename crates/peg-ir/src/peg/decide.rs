//! Input synthesis: folding in-edge sets into PEG values.
//!
//! Every non-entry block's live-in value is the fold of its incoming edges
//! into a tree of φ nodes keyed by nearest common dominators, wrapped in a θ
//! node at loop headers. The recursion walks down the dominator spine of the
//! acyclic APEG: each step either collapses a uniform edge set to its single
//! value or splits the set by which branch arm of the common dominator the
//! edges are reachable from.

use std::collections::{BTreeSet, HashSet, VecDeque};

use tracing::{trace, warn};

use super::build::{BbEdge, BbEdgeSet, BuildError, Builder};
use super::types::{PegNode, PegNodeId, PegPhi, PegTheta};
use crate::cfg::{LoopId, Terminator};

impl Builder<'_> {
    /// Synthesize the live-in value of `block`.
    ///
    /// For loop headers the result is a θ node: iteration 0 folds the entry
    /// edges (everything still attached to the concrete header after latch
    /// redirection), the step folds the latch edges by recursing on the
    /// virtual forward twin.
    pub(super) fn compute_inputs(&mut self, block: PegNodeId) -> Result<PegNodeId, BuildError> {
        let data = self.peg.block(block);
        debug_assert!(!data.is_entry, "compute_inputs called on the entry block");

        let name = data.name.clone();
        let is_header = data.is_loop_header(self.loops);
        let twin = data.virtual_forward;
        let outer = self.loops.enclosing_loops(data.surrounding_loop);

        let in_edges = self.in_edges(block);
        if in_edges.is_empty() {
            return Err(BuildError::UnreachableBlock(name));
        }
        trace!(block = %name, edges = in_edges.len(), "computing inputs");

        let decider = self.make_decide(self.root(), &in_edges, &outer)?;
        if is_header {
            let twin = twin.expect("loop header without a virtual forward twin");
            let step = self.compute_inputs(twin)?;
            let name = self.fresh_theta_name();
            Ok(self.peg.add_node(PegNode::Theta(PegTheta {
                name,
                initial: decider,
                step,
            })))
        } else {
            Ok(decider)
        }
    }

    /// Fold `in_edges` into a single PEG value, selecting along branch
    /// conditions at each nearest common dominator.
    pub(super) fn make_decide(
        &mut self,
        source: BbEdge,
        in_edges: &BbEdgeSet,
        outer: &BTreeSet<LoopId>,
    ) -> Result<PegNodeId, BuildError> {
        trace!(?source, edges = in_edges.len(), "folding in-edge set");

        let common_dom = self.common_dominator(in_edges);
        let cd_loops = self
            .loops
            .enclosing_loops(self.peg.block(common_dom).surrounding_loop);

        if !cd_loops.is_subset(outer) {
            return self.reject_loop_escape(common_dom, in_edges, &cd_loops, outer);
        }

        // A uniform edge set collapses to its single value. This is also
        // what keeps the two arms of every emitted φ distinct.
        let mut values = in_edges.iter().map(BbEdge::source_block);
        let first = values.next().expect("in-edge set is never empty here");
        if values.all(|v| v == first) {
            return Ok(first);
        }
        debug_assert!(in_edges.len() > 1);

        let (then_bb, else_bb) = self.true_false_successors(common_dom)?;
        let then_edge = BbEdge::new(common_dom, then_bb);
        let else_edge = BbEdge::new(common_dom, else_bb);

        let then_edges: BbEdgeSet = in_edges
            .iter()
            .copied()
            .filter(|&e| self.edge_reaches(then_edge, e))
            .collect();
        let else_edges: BbEdgeSet = in_edges
            .iter()
            .copied()
            .filter(|&e| self.edge_reaches(else_edge, e))
            .collect();

        if then_edges.is_empty() {
            return Err(BuildError::EmptyBranchPartition {
                block: self.peg.block(common_dom).name.clone(),
                arm: "true",
            });
        }
        if else_edges.is_empty() {
            return Err(BuildError::EmptyBranchPartition {
                block: self.peg.block(common_dom).name.clone(),
                arm: "false",
            });
        }
        // Disjointness is what makes both subsets strictly smaller than the
        // set being folded; an edge reachable from both arms would recurse
        // on the same set forever.
        if let Some(shared) = then_edges.intersection(&else_edges).next() {
            return Err(BuildError::AmbiguousBranchPartition {
                block: self.peg.block(shared.dest).name.clone(),
                dom: self.peg.block(common_dom).name.clone(),
            });
        }

        let then_node = self.make_decide(then_edge, &then_edges, outer)?;
        let else_node = self.make_decide(else_edge, &else_edges, outer)?;
        if then_node == else_node {
            return Ok(then_node);
        }

        let condition = self.condition_of(common_dom)?;
        let name = self.fresh_phi_name();
        Ok(self.peg.add_node(PegNode::Phi(PegPhi {
            name,
            condition,
            then_node,
            else_node,
        })))
    }

    /// Nearest common dominator of the edge sources, with the root edge
    /// contributing its destination.
    fn common_dominator(&self, in_edges: &BbEdgeSet) -> PegNodeId {
        let domtree = self
            .domtree
            .as_ref()
            .expect("dominator tree not yet computed");
        let mut dom: Option<PegNodeId> = None;
        for edge in in_edges {
            let src = edge.source_block();
            dom = Some(match dom {
                None => src,
                Some(d) => domtree.nearest_common_dominator(d, src),
            });
        }
        dom.expect("in-edge set is never empty here")
    }

    /// The APEG blocks reached by the true and false arms of `block`'s
    /// terminator.
    fn true_false_successors(
        &self,
        block: PegNodeId,
    ) -> Result<(PegNodeId, PegNodeId), BuildError> {
        let data = self.peg.block(block);
        match &self.src.block(data.source).terminator {
            Some(Terminator::Branch {
                then_dest,
                else_dest,
            }) if then_dest != else_dest => Ok((
                self.apeg_target(data.source, *then_dest),
                self.apeg_target(data.source, *else_dest),
            )),
            _ => Err(BuildError::NotTwoWayBranch(data.name.clone())),
        }
    }

    /// Whether `from` reaches `to`: the edges are equal, adjacent, or
    /// `to`'s source is reachable from `from`'s destination along APEG
    /// successor edges. The APEG is acyclic, so the walk terminates.
    fn edge_reaches(&self, from: BbEdge, to: BbEdge) -> bool {
        if from == to {
            return true;
        }
        let Some(to_source) = to.source else {
            return false;
        };
        if from.dest == to_source {
            return true;
        }

        let mut queue = VecDeque::from([from.dest]);
        let mut visited = HashSet::from([from.dest]);
        while let Some(block) = queue.pop_front() {
            if block == to_source {
                return true;
            }
            for &succ in &self.peg.block(block).successors {
                if visited.insert(succ) {
                    queue.push_back(succ);
                }
            }
        }
        false
    }

    /// The common dominator sits inside a loop that is not under
    /// consideration: folding the set would need the loop-break construct.
    /// Identify the outermost escaping loop, then refuse.
    fn reject_loop_escape(
        &self,
        common_dom: PegNodeId,
        in_edges: &BbEdgeSet,
        cd_loops: &BTreeSet<LoopId>,
        outer: &BTreeSet<LoopId>,
    ) -> Result<PegNodeId, BuildError> {
        let escaped: Vec<LoopId> = cd_loops.difference(outer).copied().collect();
        let outermost = escaped
            .iter()
            .copied()
            .find(|&l| escaped.iter().all(|&m| self.loops.contains_loop(l, m)));
        let Some(outermost) = outermost else {
            return Err(BuildError::InvalidLoopNesting(
                self.peg.block(common_dom).name.clone(),
            ));
        };

        let dest = in_edges
            .first()
            .expect("in-edge set is never empty here")
            .dest;
        let block_name = self.peg.block(dest).name.clone();
        warn!(
            block = %block_name,
            escaping_loop = %outermost,
            "loop-break construct required but not implemented"
        );
        Err(BuildError::LoopBreakUnsupported(block_name))
    }
}
