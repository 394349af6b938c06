//! Natural-loop analysis.
//!
//! Detects the loop forest of a [`Function`]: a back edge is an edge whose
//! destination dominates its source, every back-edge destination is a loop
//! header, and the loop body is everything that reaches a latch without
//! passing through the header. Loops sharing a header are merged, so each
//! header identifies exactly one loop.
//!
//! The PEG builder consumes this analysis read-only.

use std::collections::BTreeSet;
use std::fmt;

use indexmap::{IndexMap, IndexSet};

use super::{BlockId, Function};
use crate::domtree::DomTree;

/// Loop identifier, dense per [`LoopInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(pub u32);

impl LoopId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loop{}", self.0)
    }
}

/// A single natural loop.
#[derive(Debug, Clone)]
pub struct Loop {
    /// The unique block dominating every member of the loop.
    pub header: BlockId,
    /// The innermost loop properly containing this one.
    pub parent: Option<LoopId>,
    /// Members whose successors include the header.
    pub latches: Vec<BlockId>,
    blocks: IndexSet<BlockId>,
}

impl Loop {
    pub fn contains_block(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }

    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.iter().copied()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

/// The loop forest of a function.
#[derive(Debug, Clone)]
pub struct LoopInfo {
    loops: Vec<Loop>,
    /// Innermost loop per block.
    innermost: Vec<Option<LoopId>>,
}

impl LoopInfo {
    pub fn compute(func: &Function) -> Self {
        if func.block_count() == 0 {
            return Self {
                loops: Vec::new(),
                innermost: Vec::new(),
            };
        }

        let dom = DomTree::compute(&func.successor_indices(), func.entry().index());
        let preds = func.predecessor_map();

        // Back edges grouped by header. Keys are sorted afterwards so loop
        // ids do not depend on edge discovery order.
        let mut headers: IndexMap<BlockId, Vec<BlockId>> = IndexMap::new();
        for (id, _) in func.blocks() {
            if !dom.is_reachable(id.index()) {
                continue;
            }
            for succ in func.successors(id) {
                if dom.dominates(succ.index(), id.index()) {
                    let latches = headers.entry(succ).or_default();
                    if !latches.contains(&id) {
                        latches.push(id);
                    }
                }
            }
        }
        headers.sort_keys();

        let mut loops = Vec::with_capacity(headers.len());
        for (header, latches) in headers {
            let mut blocks = IndexSet::new();
            blocks.insert(header);
            let mut stack = latches.clone();
            while let Some(b) = stack.pop() {
                if blocks.insert(b) {
                    for &p in &preds[b.index()] {
                        if dom.is_reachable(p.index()) {
                            stack.push(p);
                        }
                    }
                }
            }
            loops.push(Loop {
                header,
                parent: None,
                latches,
                blocks,
            });
        }

        // Nesting: the parent is the smallest other loop containing this
        // loop's header.
        let parents: Vec<Option<LoopId>> = (0..loops.len())
            .map(|i| {
                let mut best: Option<usize> = None;
                for (j, candidate) in loops.iter().enumerate() {
                    if i == j
                        || !candidate.blocks.contains(&loops[i].header)
                        || candidate.blocks.len() <= loops[i].blocks.len()
                    {
                        continue;
                    }
                    if best.is_none_or(|b| candidate.blocks.len() < loops[b].blocks.len()) {
                        best = Some(j);
                    }
                }
                best.map(|j| LoopId(j as u32))
            })
            .collect();
        for (l, parent) in loops.iter_mut().zip(parents) {
            l.parent = parent;
        }

        let mut innermost: Vec<Option<LoopId>> = vec![None; func.block_count()];
        for (idx, l) in loops.iter().enumerate() {
            for &b in &l.blocks {
                let smaller = match innermost[b.index()] {
                    None => true,
                    Some(cur) => l.blocks.len() < loops[cur.index()].blocks.len(),
                };
                if smaller {
                    innermost[b.index()] = Some(LoopId(idx as u32));
                }
            }
        }

        Self { loops, innermost }
    }

    pub fn loop_count(&self) -> usize {
        self.loops.len()
    }

    pub fn get(&self, id: LoopId) -> &Loop {
        &self.loops[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (LoopId, &Loop)> {
        self.loops
            .iter()
            .enumerate()
            .map(|(i, l)| (LoopId(i as u32), l))
    }

    /// Whether `block` is the header of some loop.
    pub fn is_loop_header(&self, block: BlockId) -> bool {
        self.header_loop(block).is_some()
    }

    /// The loop headed by `block`, if any.
    pub fn header_loop(&self, block: BlockId) -> Option<LoopId> {
        self.loops
            .iter()
            .position(|l| l.header == block)
            .map(|i| LoopId(i as u32))
    }

    /// The innermost loop containing `block`, if any.
    pub fn loop_of(&self, block: BlockId) -> Option<LoopId> {
        self.innermost.get(block.index()).copied().flatten()
    }

    /// Whether `block` is a latch of exactly `l`: it must branch back to the
    /// header and `l` must be its innermost loop. A block of an inner loop
    /// that branches back to an outer header is not a latch of the outer
    /// loop for the purposes of this query.
    pub fn is_latch(&self, l: LoopId, block: BlockId) -> bool {
        self.loop_of(block) == Some(l) && self.loops[l.index()].latches.contains(&block)
    }

    pub fn parent(&self, l: LoopId) -> Option<LoopId> {
        self.loops[l.index()].parent
    }

    /// Whether `outer` contains `inner` (reflexively).
    pub fn contains_loop(&self, outer: LoopId, inner: LoopId) -> bool {
        let mut cur = Some(inner);
        while let Some(l) = cur {
            if l == outer {
                return true;
            }
            cur = self.loops[l.index()].parent;
        }
        false
    }

    /// Blocks outside `l` that are successors of a member of `l`, in a
    /// stable order.
    pub fn exit_blocks(&self, func: &Function, l: LoopId) -> Vec<BlockId> {
        let lp = &self.loops[l.index()];
        let mut exits = IndexSet::new();
        for &b in &lp.blocks {
            for succ in func.successors(b) {
                if !lp.blocks.contains(&succ) {
                    exits.insert(succ);
                }
            }
        }
        exits.into_iter().collect()
    }

    /// The chain of loops from `start` outward. Walks from the innermost
    /// loop toward the root of the forest; the outermost enclosing loop is
    /// not a member of the result.
    pub fn enclosing_loops(&self, start: Option<LoopId>) -> BTreeSet<LoopId> {
        let mut chain = BTreeSet::new();
        let mut cur = start;
        while let Some(l) = cur {
            let parent = self.loops[l.index()].parent;
            if parent.is_none() {
                break;
            }
            chain.insert(l);
            cur = parent;
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::Terminator;

    /// entry -> h; h -> body (true) / exit (false); body -> h.
    fn counted_loop() -> (Function, BlockId, BlockId, BlockId, BlockId) {
        let mut func = Function::new("counted");
        let entry = func.add_block("entry");
        let header = func.add_block("header");
        let body = func.add_block("body");
        let exit = func.add_block("exit");
        func.terminate(entry, Terminator::Jump(header));
        func.terminate(
            header,
            Terminator::Branch {
                then_dest: body,
                else_dest: exit,
            },
        );
        func.terminate(body, Terminator::Jump(header));
        func.terminate(exit, Terminator::Return);
        (func, entry, header, body, exit)
    }

    /// entry -> h1; h1 -> h2 / x; h2 -> a / b; a -> h2; b -> h1; x returns.
    fn nested_loops() -> (Function, [BlockId; 6]) {
        let mut func = Function::new("nested");
        let entry = func.add_block("entry");
        let h1 = func.add_block("h1");
        let h2 = func.add_block("h2");
        let a = func.add_block("a");
        let b = func.add_block("b");
        let x = func.add_block("x");
        func.terminate(entry, Terminator::Jump(h1));
        func.terminate(
            h1,
            Terminator::Branch {
                then_dest: h2,
                else_dest: x,
            },
        );
        func.terminate(
            h2,
            Terminator::Branch {
                then_dest: a,
                else_dest: b,
            },
        );
        func.terminate(a, Terminator::Jump(h2));
        func.terminate(b, Terminator::Jump(h1));
        func.terminate(x, Terminator::Return);
        (func, [entry, h1, h2, a, b, x])
    }

    #[test]
    fn test_single_loop() {
        let (func, entry, header, body, exit) = counted_loop();
        let li = LoopInfo::compute(&func);

        assert_eq!(li.loop_count(), 1);
        assert!(li.is_loop_header(header));
        assert!(!li.is_loop_header(body));

        let l = li.header_loop(header).unwrap();
        assert_eq!(li.get(l).latches, vec![body]);
        assert_eq!(li.loop_of(body), Some(l));
        assert_eq!(li.loop_of(entry), None);
        assert_eq!(li.loop_of(exit), None);
        assert!(li.is_latch(l, body));
        assert!(!li.is_latch(l, header));
        assert_eq!(li.exit_blocks(&func, l), vec![exit]);
    }

    #[test]
    fn test_nested_loops() {
        let (func, [_, h1, h2, a, b, x]) = nested_loops();
        let li = LoopInfo::compute(&func);

        assert_eq!(li.loop_count(), 2);
        let outer = li.header_loop(h1).unwrap();
        let inner = li.header_loop(h2).unwrap();

        assert_eq!(li.parent(inner), Some(outer));
        assert_eq!(li.parent(outer), None);
        assert!(li.contains_loop(outer, inner));
        assert!(!li.contains_loop(inner, outer));

        assert_eq!(li.loop_of(a), Some(inner));
        assert_eq!(li.loop_of(b), Some(outer));

        // b latches the outer loop; a latches only the inner one.
        assert!(li.is_latch(outer, b));
        assert!(li.is_latch(inner, a));
        assert!(!li.is_latch(outer, a));

        assert_eq!(li.exit_blocks(&func, inner), vec![b]);
        assert_eq!(li.exit_blocks(&func, outer), vec![x]);
    }

    #[test]
    fn test_enclosing_loops_excludes_outermost() {
        let (func, [_, h1, h2, ..]) = nested_loops();
        let li = LoopInfo::compute(&func);
        let outer = li.header_loop(h1).unwrap();
        let inner = li.header_loop(h2).unwrap();

        assert!(li.enclosing_loops(None).is_empty());
        assert!(li.enclosing_loops(Some(outer)).is_empty());

        let chain = li.enclosing_loops(Some(inner));
        assert!(chain.contains(&inner));
        assert!(!chain.contains(&outer));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_loop_free_function() {
        let mut func = Function::new("straight");
        let entry = func.add_block("entry");
        let next = func.add_block("next");
        func.terminate(entry, Terminator::Jump(next));
        func.terminate(next, Terminator::Return);

        let li = LoopInfo::compute(&func);
        assert_eq!(li.loop_count(), 0);
        assert_eq!(li.loop_of(entry), None);
    }
}
