//! Dominator tree computation over dense node indices.
//!
//! Implements the iterative algorithm from "A Simple, Fast Dominance
//! Algorithm" (Cooper, Harvey and Kennedy): a DFS postorder numbering
//! followed by a reverse-postorder fixpoint over immediate dominators.
//!
//! Both graph sides of the crate share this core: the loop analysis runs it
//! over the source CFG, and [`crate::peg::PegDomTree`] runs it over the
//! augmented PEG block graph.

/// Dominance information for a rooted directed graph.
///
/// Nodes are dense `usize` indices; the adjacency is supplied to
/// [`DomTree::compute`] as one successor list per node. Nodes that are not
/// reachable from the entry have no dominance information.
pub(crate) struct DomTree {
    /// `idom[n]` for reachable `n`; the entry maps to itself.
    idom: Vec<Option<usize>>,
    /// Postorder number per reachable node.
    po_number: Vec<Option<usize>>,
    entry: usize,
}

impl DomTree {
    /// Compute dominance for the graph described by `succs`, rooted at
    /// `entry`.
    pub fn compute(succs: &[Vec<usize>], entry: usize) -> Self {
        let (postorder, po_number) = compute_postorder(succs, entry);
        let idom = compute_idoms(succs, entry, &postorder, &po_number);
        Self {
            idom,
            po_number,
            entry,
        }
    }

    pub fn entry(&self) -> usize {
        self.entry
    }

    pub fn is_reachable(&self, node: usize) -> bool {
        self.po_number[node].is_some()
    }

    /// The immediate dominator of `node`, or `None` for the entry and for
    /// unreachable nodes.
    pub fn idom(&self, node: usize) -> Option<usize> {
        match self.idom[node] {
            Some(d) if d != node => Some(d),
            _ => None,
        }
    }

    /// Whether `a` dominates `b`. Reflexive: every node dominates itself.
    pub fn dominates(&self, a: usize, b: usize) -> bool {
        if a == b {
            return true;
        }
        let mut cur = b;
        while let Some(d) = self.idom(cur) {
            if d == a {
                return true;
            }
            cur = d;
        }
        false
    }

    /// The nearest common dominator of two reachable nodes.
    ///
    /// Reflexive, commutative, associative and idempotent; the result
    /// dominates both arguments.
    pub fn nearest_common_dominator(&self, a: usize, b: usize) -> usize {
        debug_assert!(self.is_reachable(a) && self.is_reachable(b));
        intersect(&self.po_number, &self.idom, a, b)
    }
}

/// DFS postorder of the reachable nodes, with an explicit stack so that deep
/// graphs cannot overflow the call stack.
fn compute_postorder(succs: &[Vec<usize>], entry: usize) -> (Vec<usize>, Vec<Option<usize>>) {
    let n = succs.len();
    let mut postorder = Vec::with_capacity(n);
    let mut po_number = vec![None; n];
    let mut visited = vec![false; n];
    let mut stack: Vec<(usize, usize)> = vec![(entry, 0)];
    visited[entry] = true;

    while let Some((node, next_child)) = stack.last_mut() {
        if let Some(&succ) = succs[*node].get(*next_child) {
            *next_child += 1;
            if !visited[succ] {
                visited[succ] = true;
                stack.push((succ, 0));
            }
        } else {
            po_number[*node] = Some(postorder.len());
            postorder.push(*node);
            stack.pop();
        }
    }

    (postorder, po_number)
}

fn compute_idoms(
    succs: &[Vec<usize>],
    entry: usize,
    postorder: &[usize],
    po_number: &[Option<usize>],
) -> Vec<Option<usize>> {
    let n = succs.len();
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (node, ss) in succs.iter().enumerate() {
        for &s in ss {
            preds[s].push(node);
        }
    }

    let mut idom: Vec<Option<usize>> = vec![None; n];
    idom[entry] = Some(entry);

    let mut changed = true;
    while changed {
        changed = false;
        // Reverse postorder, skipping the entry.
        for &node in postorder.iter().rev() {
            if node == entry {
                continue;
            }
            let mut new_idom: Option<usize> = None;
            for &pred in &preds[node] {
                if idom[pred].is_none() {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => pred,
                    Some(cur) => intersect(po_number, &idom, cur, pred),
                });
            }
            // In reverse postorder every reachable non-entry node has at
            // least one already-processed predecessor.
            if new_idom.is_some() && idom[node] != new_idom {
                idom[node] = new_idom;
                changed = true;
            }
        }
    }

    idom
}

/// Walk two nodes up the (partially computed) dominator tree until they
/// meet. Postorder numbers order the walk.
fn intersect(
    po_number: &[Option<usize>],
    idom: &[Option<usize>],
    a: usize,
    b: usize,
) -> usize {
    let number = |n: usize| po_number[n].expect("intersect called on unreachable node");
    let up = |n: usize| idom[n].expect("intersect walked past a computed region");

    let mut f1 = a;
    let mut f2 = b;
    while f1 != f2 {
        while number(f1) < number(f2) {
            f1 = up(f1);
        }
        while number(f2) < number(f1) {
            f2 = up(f2);
        }
    }
    f1
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Diamond: 0 -> {1, 2} -> 3.
    fn diamond() -> Vec<Vec<usize>> {
        vec![vec![1, 2], vec![3], vec![3], vec![]]
    }

    #[test]
    fn test_diamond_idoms() {
        let dt = DomTree::compute(&diamond(), 0);
        assert_eq!(dt.idom(0), None);
        assert_eq!(dt.idom(1), Some(0));
        assert_eq!(dt.idom(2), Some(0));
        assert_eq!(dt.idom(3), Some(0));
    }

    #[test]
    fn test_diamond_dominates() {
        let dt = DomTree::compute(&diamond(), 0);
        assert!(dt.dominates(0, 3));
        assert!(dt.dominates(3, 3));
        assert!(!dt.dominates(1, 3));
        assert!(!dt.dominates(3, 0));
    }

    #[test]
    fn test_nearest_common_dominator() {
        let dt = DomTree::compute(&diamond(), 0);
        assert_eq!(dt.nearest_common_dominator(1, 2), 0);
        assert_eq!(dt.nearest_common_dominator(2, 1), 0);
        assert_eq!(dt.nearest_common_dominator(1, 3), 0);
        assert_eq!(dt.nearest_common_dominator(3, 3), 3);
        assert_eq!(dt.nearest_common_dominator(0, 2), 0);
    }

    #[test]
    fn test_chain_with_back_edge() {
        // 0 -> 1 -> 2 -> 1, 2 -> 3
        let succs = vec![vec![1], vec![2], vec![1, 3], vec![]];
        let dt = DomTree::compute(&succs, 0);
        assert_eq!(dt.idom(1), Some(0));
        assert_eq!(dt.idom(2), Some(1));
        assert_eq!(dt.idom(3), Some(2));
        assert!(dt.dominates(1, 3));
    }

    #[test]
    fn test_unreachable_node() {
        // Node 2 is not reachable from the entry.
        let succs = vec![vec![1], vec![], vec![1]];
        let dt = DomTree::compute(&succs, 0);
        assert!(dt.is_reachable(1));
        assert!(!dt.is_reachable(2));
        assert_eq!(dt.idom(2), None);
    }
}
