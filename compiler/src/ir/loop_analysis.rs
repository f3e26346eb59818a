//! Loop Analysis for MIR Optimization
//!
//! This module provides loop analysis infrastructure for MIR optimizations including:
//! - Dominator tree computation (iterative dataflow algorithm)
//! - Dominance frontiers (for SSA construction)
//! - Natural loop detection via back-edge identification
//! - Loop nesting info, kept current by transformations that add blocks

use super::{IrBlockId, IrControlFlowGraph, IrFunction, IrId};
use fxhash::{FxHashMap, FxHashSet};
use indexmap::{IndexMap, IndexSet};
use std::collections::VecDeque;

/// Dominator tree for a function's control flow graph.
///
/// A block D dominates block B if every path from the entry to B goes through D.
/// The immediate dominator (idom) of B is the closest strict dominator.
///
/// Predecessors are derived from the terminators rather than the cached block
/// lists, so the tree is correct even in the middle of a CFG rewrite.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    /// Immediate dominator for each block (entry block has no idom)
    idom: FxHashMap<IrBlockId, IrBlockId>,

    /// Children in the dominator tree, in reverse postorder
    children: FxHashMap<IrBlockId, Vec<IrBlockId>>,

    /// Dominator tree depth for each block (entry = 0)
    depth: FxHashMap<IrBlockId, usize>,

    /// Reachable blocks in reverse postorder
    rpo: Vec<IrBlockId>,

    /// Predecessor lists the tree was computed from
    preds: FxHashMap<IrBlockId, Vec<IrBlockId>>,

    /// Entry block of the function
    entry: IrBlockId,
}

impl DominatorTree {
    /// Compute the dominator tree for a function using iterative dataflow.
    ///
    /// This uses Cooper, Harvey, and Kennedy's simple iterative algorithm
    /// which is efficient for typical CFGs and easy to understand.
    pub fn compute(function: &IrFunction) -> Self {
        Self::compute_cfg(&function.cfg)
    }

    /// Compute the dominator tree directly from a CFG.
    pub fn compute_cfg(cfg: &IrControlFlowGraph) -> Self {
        let entry = cfg.entry_block;
        let preds = cfg.predecessor_map();

        // Get blocks in reverse postorder for efficient iteration
        let rpo = Self::reverse_postorder_of(cfg, entry);
        let rpo_index: FxHashMap<IrBlockId, usize> =
            rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();

        // Entry dominates itself, others undefined
        let mut idom: FxHashMap<IrBlockId, IrBlockId> = FxHashMap::default();
        idom.insert(entry, entry);

        // Iterative dataflow until fixed point
        let mut changed = true;
        while changed {
            changed = false;

            for &block in rpo.iter().skip(1) {
                let mut new_idom: Option<IrBlockId> = None;

                for &pred in preds.get(&block).map(|p| p.as_slice()).unwrap_or(&[]) {
                    if !idom.contains_key(&pred) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => Self::intersect(current, pred, &idom, &rpo_index),
                    });
                }

                if let Some(new_idom) = new_idom {
                    if idom.get(&block) != Some(&new_idom) {
                        idom.insert(block, new_idom);
                        changed = true;
                    }
                }
            }
        }

        // Drop the entry's self-domination
        idom.remove(&entry);

        // Build children map (in RPO so walks are deterministic)
        let mut children: FxHashMap<IrBlockId, Vec<IrBlockId>> = FxHashMap::default();
        for &block in &rpo {
            if let Some(&dom) = idom.get(&block) {
                children.entry(dom).or_default().push(block);
            }
        }

        // Compute depths via BFS from entry
        let mut depth: FxHashMap<IrBlockId, usize> = FxHashMap::default();
        depth.insert(entry, 0);
        let mut queue: VecDeque<IrBlockId> = VecDeque::new();
        queue.push_back(entry);

        while let Some(block) = queue.pop_front() {
            let d = depth.get(&block).copied().unwrap_or(0);
            for &child in children.get(&block).map(|c| c.as_slice()).unwrap_or(&[]) {
                depth.insert(child, d + 1);
                queue.push_back(child);
            }
        }

        Self {
            idom,
            children,
            depth,
            rpo,
            preds,
            entry,
        }
    }

    /// Compute reverse postorder of blocks (good for dataflow iteration).
    fn reverse_postorder_of(cfg: &IrControlFlowGraph, entry: IrBlockId) -> Vec<IrBlockId> {
        // Iterative DFS; cloned loop bodies can make chains long.
        let mut visited = FxHashSet::default();
        let mut postorder = Vec::new();
        let mut stack: Vec<(IrBlockId, usize)> = Vec::new();

        if cfg.get_block(entry).is_some() {
            visited.insert(entry);
            stack.push((entry, 0));
        }

        while let Some((block, next_succ)) = stack.pop() {
            let succs = cfg
                .get_block(block)
                .map(|b| b.successors())
                .unwrap_or_default();
            if next_succ < succs.len() {
                stack.push((block, next_succ + 1));
                let succ = succs[next_succ];
                if cfg.get_block(succ).is_some() && visited.insert(succ) {
                    stack.push((succ, 0));
                }
            } else {
                postorder.push(block);
            }
        }

        postorder.reverse();
        postorder
    }

    /// Find intersection of two dominators in the dominator tree.
    /// Uses the standard algorithm from Cooper, Harvey, and Kennedy.
    fn intersect(
        mut b1: IrBlockId,
        mut b2: IrBlockId,
        idom: &FxHashMap<IrBlockId, IrBlockId>,
        rpo_index: &FxHashMap<IrBlockId, usize>,
    ) -> IrBlockId {
        let index = |b: IrBlockId| rpo_index.get(&b).copied().unwrap_or(usize::MAX);

        while b1 != b2 {
            while index(b1) > index(b2) {
                match idom.get(&b1) {
                    Some(&dom) if dom != b1 => b1 = dom,
                    _ => return b2,
                }
            }
            while index(b2) > index(b1) {
                match idom.get(&b2) {
                    Some(&dom) if dom != b2 => b2 = dom,
                    _ => return b1,
                }
            }
        }
        b1
    }

    /// Entry block the tree is rooted at.
    pub fn entry(&self) -> IrBlockId {
        self.entry
    }

    /// Reachable blocks in reverse postorder.
    pub fn reverse_postorder(&self) -> &[IrBlockId] {
        &self.rpo
    }

    /// Whether `block` is reachable from the entry.
    pub fn is_reachable(&self, block: IrBlockId) -> bool {
        block == self.entry || self.idom.contains_key(&block)
    }

    /// Predecessors of `block` as seen when the tree was computed.
    pub fn predecessors(&self, block: IrBlockId) -> &[IrBlockId] {
        self.preds.get(&block).map(|p| p.as_slice()).unwrap_or(&[])
    }

    /// Get the immediate dominator of a block.
    pub fn idom(&self, block: IrBlockId) -> Option<IrBlockId> {
        self.idom.get(&block).copied()
    }

    /// Get children of a block in the dominator tree.
    pub fn children(&self, block: IrBlockId) -> &[IrBlockId] {
        self.children.get(&block).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Get the depth of a block in the dominator tree.
    pub fn depth(&self, block: IrBlockId) -> usize {
        self.depth.get(&block).copied().unwrap_or(0)
    }

    /// Check if block A dominates block B.
    pub fn dominates(&self, a: IrBlockId, b: IrBlockId) -> bool {
        if a == b {
            return true;
        }

        let mut current = b;
        while let Some(&dom) = self.idom.get(&current) {
            if dom == a {
                return true;
            }
            current = dom;
        }

        false
    }

    /// Dominance frontier of every reachable block.
    ///
    /// For each join point, walk up from each predecessor until reaching the
    /// join's immediate dominator; every block passed has the join in its frontier.
    pub fn dominance_frontiers(&self) -> FxHashMap<IrBlockId, IndexSet<IrBlockId>> {
        let mut frontiers: FxHashMap<IrBlockId, IndexSet<IrBlockId>> =
            self.rpo.iter().map(|&b| (b, IndexSet::new())).collect();

        for &block in &self.rpo {
            let preds: Vec<IrBlockId> = self
                .predecessors(block)
                .iter()
                .copied()
                .filter(|&p| self.is_reachable(p))
                .collect();
            if preds.len() < 2 {
                continue;
            }
            let Some(block_idom) = self.idom(block) else {
                continue;
            };

            for pred in preds {
                let mut runner = pred;
                while runner != block_idom {
                    frontiers.entry(runner).or_default().insert(block);
                    match self.idom(runner) {
                        Some(next) => runner = next,
                        None => break,
                    }
                }
            }
        }

        frontiers
    }

    /// Iterated dominance frontier of a set of blocks.
    pub fn iterated_frontier(
        &self,
        frontiers: &FxHashMap<IrBlockId, IndexSet<IrBlockId>>,
        seeds: impl IntoIterator<Item = IrBlockId>,
    ) -> IndexSet<IrBlockId> {
        let mut result = IndexSet::new();
        let mut worklist: Vec<IrBlockId> = seeds.into_iter().collect();

        while let Some(block) = worklist.pop() {
            if let Some(frontier) = frontiers.get(&block) {
                for &f in frontier {
                    if result.insert(f) {
                        worklist.push(f);
                    }
                }
            }
        }

        result
    }
}

/// A natural loop in the control flow graph.
///
/// A natural loop is defined by a back edge (an edge from B to H where H dominates B).
/// The loop header is H, and the loop body contains all blocks from which H can be
/// reached without going through H.
#[derive(Debug, Clone)]
pub struct NaturalLoop {
    /// Loop header block (entry point of the loop)
    pub header: IrBlockId,

    /// The single back edge source, when there is exactly one
    pub latch: Option<IrBlockId>,

    /// All back edge sources, in layout order
    pub back_edges: Vec<IrBlockId>,

    /// All blocks in the loop body (including header)
    pub blocks: IndexSet<IrBlockId>,

    /// Blocks in the loop with an edge leaving the loop
    pub exiting_blocks: Vec<IrBlockId>,

    /// Blocks outside the loop targeted by an exiting edge
    pub exit_blocks: Vec<IrBlockId>,

    /// Preheader block if one exists (single predecessor of header from outside loop)
    pub preheader: Option<IrBlockId>,

    /// Nesting depth (0 = outermost)
    pub nesting_depth: usize,

    /// Parent loop header if this is a nested loop
    pub parent: Option<IrBlockId>,

    /// Child loop headers (directly nested loops)
    pub children: Vec<IrBlockId>,
}

impl NaturalLoop {
    /// Whether `block` belongs to this loop (nested loops included)
    pub fn contains(&self, block: IrBlockId) -> bool {
        self.blocks.contains(&block)
    }

    /// Whether `value` does not change inside the loop: a parameter, or defined
    /// by an instruction or phi outside the loop's blocks.
    pub fn is_invariant(&self, function: &IrFunction, value: IrId) -> bool {
        function.is_param(value)
            || function
                .def_blocks()
                .get(&value)
                .map_or(false, |block| !self.contains(*block))
    }
}

/// Loop nest information for a function.
#[derive(Debug, Clone)]
pub struct LoopNestInfo {
    /// All natural loops indexed by header block, in layout order
    pub loops: IndexMap<IrBlockId, NaturalLoop>,

    /// Top-level loops (not nested in any other loop)
    pub top_level_loops: Vec<IrBlockId>,

    /// Map from block to its innermost containing loop header
    pub block_to_loop: FxHashMap<IrBlockId, IrBlockId>,

    /// Maximum nesting depth in the function
    pub max_depth: usize,
}

impl LoopNestInfo {
    /// Compute dominators and analyze loops in one step.
    pub fn compute(function: &IrFunction) -> Self {
        let domtree = DominatorTree::compute(function);
        Self::analyze(function, &domtree)
    }

    /// Analyze loops in a function.
    pub fn analyze(function: &IrFunction, domtree: &DominatorTree) -> Self {
        let cfg = &function.cfg;
        let preds = cfg.predecessor_map();
        let mut loops: IndexMap<IrBlockId, NaturalLoop> = IndexMap::new();

        // Find all back edges and create natural loops
        for (&block_id, block) in &cfg.blocks {
            if !domtree.is_reachable(block_id) {
                continue;
            }
            for succ in block.successors() {
                // A back edge is an edge to a dominator
                if !domtree.dominates(succ, block_id) {
                    continue;
                }
                let body = Self::find_loop_blocks(&preds, domtree, succ, block_id);

                // If we already have a loop with this header, merge the blocks
                if let Some(existing) = loops.get_mut(&succ) {
                    if !existing.back_edges.contains(&block_id) {
                        existing.back_edges.push(block_id);
                    }
                    existing.blocks.extend(body);
                } else {
                    loops.insert(
                        succ,
                        NaturalLoop {
                            header: succ,
                            latch: None,
                            back_edges: vec![block_id],
                            blocks: body,
                            exiting_blocks: Vec::new(),
                            exit_blocks: Vec::new(),
                            preheader: None,
                            nesting_depth: 0, // Computed after all loops found
                            parent: None,
                            children: Vec::new(),
                        },
                    );
                }
            }
        }

        for natural_loop in loops.values_mut() {
            natural_loop.latch = match natural_loop.back_edges.as_slice() {
                [single] => Some(*single),
                _ => None,
            };
            let (exiting, exits) = Self::find_exits(cfg, &natural_loop.blocks);
            natural_loop.exiting_blocks = exiting;
            natural_loop.exit_blocks = exits;
            natural_loop.preheader =
                Self::find_preheader_with(cfg, &preds, natural_loop.header, &natural_loop.blocks);
        }

        // Parent = the smallest other loop containing this header
        let headers: Vec<IrBlockId> = loops.keys().copied().collect();
        let mut parents: Vec<(IrBlockId, IrBlockId)> = Vec::new();
        for &header in &headers {
            let parent = headers
                .iter()
                .filter(|&&other| other != header)
                .filter_map(|other| loops.get(other))
                .filter(|other| other.contains(header))
                .min_by_key(|other| other.blocks.len())
                .map(|other| other.header);
            if let Some(parent) = parent {
                parents.push((header, parent));
            }
        }
        for (child, parent) in parents {
            if let Some(l) = loops.get_mut(&child) {
                l.parent = Some(parent);
            }
            if let Some(p) = loops.get_mut(&parent) {
                p.children.push(child);
            }
        }

        // Compute nesting depths
        let top_level_loops: Vec<IrBlockId> = headers
            .iter()
            .filter(|h| loops.get(*h).map_or(false, |l| l.parent.is_none()))
            .copied()
            .collect();

        let mut stack: Vec<(IrBlockId, usize)> = top_level_loops.iter().map(|&h| (h, 0)).collect();
        while let Some((header, depth)) = stack.pop() {
            if let Some(l) = loops.get_mut(&header) {
                l.nesting_depth = depth;
                stack.extend(l.children.iter().map(|&c| (c, depth + 1)));
            }
        }

        let max_depth = loops.values().map(|l| l.nesting_depth).max().unwrap_or(0);

        // Build block-to-loop mapping (map each block to its innermost loop)
        let mut block_to_loop: FxHashMap<IrBlockId, IrBlockId> = FxHashMap::default();
        for (&header, loop_info) in &loops {
            for &block in &loop_info.blocks {
                let deeper = match block_to_loop.get(&block).and_then(|h| loops.get(h)) {
                    Some(existing) => loop_info.nesting_depth > existing.nesting_depth,
                    None => true,
                };
                if deeper {
                    block_to_loop.insert(block, header);
                }
            }
        }

        Self {
            loops,
            top_level_loops,
            block_to_loop,
            max_depth,
        }
    }

    /// Find all blocks in a natural loop given header and back edge source.
    fn find_loop_blocks(
        preds: &FxHashMap<IrBlockId, Vec<IrBlockId>>,
        domtree: &DominatorTree,
        header: IrBlockId,
        back_edge_source: IrBlockId,
    ) -> IndexSet<IrBlockId> {
        let mut loop_blocks = IndexSet::new();
        loop_blocks.insert(header);

        if header == back_edge_source {
            return loop_blocks;
        }

        // Work backwards from back_edge_source to find all blocks that can reach header
        let mut worklist = vec![back_edge_source];
        loop_blocks.insert(back_edge_source);

        while let Some(block) = worklist.pop() {
            for &pred in preds.get(&block).map(|p| p.as_slice()).unwrap_or(&[]) {
                if domtree.is_reachable(pred) && loop_blocks.insert(pred) {
                    worklist.push(pred);
                }
            }
        }

        loop_blocks
    }

    /// Exiting blocks (inside, with an edge out) and exit blocks (the outside targets).
    fn find_exits(
        cfg: &IrControlFlowGraph,
        loop_blocks: &IndexSet<IrBlockId>,
    ) -> (Vec<IrBlockId>, Vec<IrBlockId>) {
        let mut exiting = Vec::new();
        let mut exits = Vec::new();

        for &block in loop_blocks {
            let Some(b) = cfg.get_block(block) else {
                continue;
            };
            for succ in b.successors() {
                if loop_blocks.contains(&succ) {
                    continue;
                }
                if !exiting.contains(&block) {
                    exiting.push(block);
                }
                if !exits.contains(&succ) {
                    exits.push(succ);
                }
            }
        }

        (exiting, exits)
    }

    /// Find the preheader of the loop headed by `header`, if one exists.
    ///
    /// A preheader is the single predecessor of the header from outside the
    /// loop whose terminator reaches the header and nothing else.
    pub fn find_preheader(
        cfg: &IrControlFlowGraph,
        header: IrBlockId,
        loop_blocks: &IndexSet<IrBlockId>,
    ) -> Option<IrBlockId> {
        Self::find_preheader_with(cfg, &cfg.predecessor_map(), header, loop_blocks)
    }

    fn find_preheader_with(
        cfg: &IrControlFlowGraph,
        preds: &FxHashMap<IrBlockId, Vec<IrBlockId>>,
        header: IrBlockId,
        loop_blocks: &IndexSet<IrBlockId>,
    ) -> Option<IrBlockId> {
        // Find predecessors outside the loop
        let outside_preds: Vec<IrBlockId> = preds
            .get(&header)?
            .iter()
            .filter(|p| !loop_blocks.contains(*p))
            .copied()
            .collect();

        // Preheader exists if there's exactly one predecessor outside the loop
        // and it has only one successor (the header)
        match outside_preds.as_slice() {
            [pred] => {
                let succs = cfg.get_block(*pred)?.successors();
                (succs.as_slice() == [header]).then_some(*pred)
            }
            _ => None,
        }
    }

    /// Register a new block as a member of the loop headed by `header` and
    /// every loop enclosing it. The block becomes innermost in `header`.
    pub fn add_block_to_loop(&mut self, header: IrBlockId, block: IrBlockId) {
        let mut current = Some(header);
        while let Some(h) = current {
            match self.loops.get_mut(&h) {
                Some(l) => {
                    l.blocks.insert(block);
                    current = l.parent;
                }
                None => break,
            }
        }
        if self.loops.contains_key(&header) {
            self.block_to_loop.insert(block, header);
        }
    }

    /// Recompute exiting and exit blocks of a loop and its ancestors after a CFG edit.
    pub fn refresh_exits(&mut self, cfg: &IrControlFlowGraph, header: IrBlockId) {
        let mut current = Some(header);
        while let Some(h) = current {
            match self.loops.get_mut(&h) {
                Some(l) => {
                    let (exiting, exits) = Self::find_exits(cfg, &l.blocks);
                    l.exiting_blocks = exiting;
                    l.exit_blocks = exits;
                    current = l.parent;
                }
                None => break,
            }
        }
    }

    /// Loop headers in reverse nesting order (innermost first), layout order within a depth.
    pub fn loops_innermost_first(&self) -> Vec<IrBlockId> {
        let mut headers: Vec<IrBlockId> = self.loops.keys().copied().collect();
        headers.sort_by_key(|h| {
            std::cmp::Reverse(self.loops.get(h).map(|l| l.nesting_depth).unwrap_or(0))
        });
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::*;
    use crate::ir::{CompareOp, IrBlockId, IrType};

    #[test]
    fn test_dominator_tree_simple() {
        // Create a simple function with diamond CFG:
        //      entry
        //       /\
        //      /  \
        //    bb1  bb2
        //      \  /
        //       \/
        //      bb3

        let mut builder = IrBuilder::new("test");
        let sig = FunctionSignatureBuilder::new().returns(IrType::Void).build();
        builder.start_function("test", sig);

        // Entry block
        let cond = builder.build_bool(true).unwrap();
        let bb1 = builder.create_block().unwrap();
        let bb2 = builder.create_block().unwrap();
        let bb3 = builder.create_block().unwrap();
        builder.build_cond_branch(cond, bb1, bb2);

        // bb1
        builder.switch_to_block(bb1);
        builder.build_branch(bb3);

        // bb2
        builder.switch_to_block(bb2);
        builder.build_branch(bb3);

        // bb3
        builder.switch_to_block(bb3);
        builder.build_return(None);

        builder.finish_function();

        let function = builder.module.functions.values().next().unwrap();
        let domtree = DominatorTree::compute(function);

        // Entry dominates everything
        assert!(domtree.dominates(IrBlockId::entry(), bb1));
        assert!(domtree.dominates(IrBlockId::entry(), bb2));
        assert!(domtree.dominates(IrBlockId::entry(), bb3));

        // bb1 and bb2 don't dominate each other
        assert!(!domtree.dominates(bb1, bb2));
        assert!(!domtree.dominates(bb2, bb1));

        // Entry is the idom of bb3 (not bb1 or bb2)
        assert_eq!(domtree.idom(bb3), Some(IrBlockId::entry()));

        // The join is in the frontier of both arms
        let df = domtree.dominance_frontiers();
        assert!(df[&bb1].contains(&bb3));
        assert!(df[&bb2].contains(&bb3));
        assert!(df[&IrBlockId::entry()].is_empty());
    }

    #[test]
    fn test_simple_loop_detection() {
        // Create a simple loop:
        //     entry
        //       |
        //       v
        //     header <----+
        //       |         |
        //       v         |
        //     body -------+
        //       |
        //       v
        //     exit

        let mut builder = IrBuilder::new("test");
        let sig = FunctionSignatureBuilder::new().returns(IrType::Void).build();
        builder.start_function("loop_test", sig);

        // Entry -> header
        let header = builder.create_block().unwrap();
        let body = builder.create_block().unwrap();
        let exit = builder.create_block().unwrap();
        builder.build_branch(header);

        // Header
        builder.switch_to_block(header);
        let cond = builder.build_bool(true).unwrap();
        builder.build_cond_branch(cond, body, exit);

        // Body -> header (back edge)
        builder.switch_to_block(body);
        builder.build_branch(header);

        // Exit
        builder.switch_to_block(exit);
        builder.build_return(None);

        builder.finish_function();

        let function = builder.module.functions.values().next().unwrap();
        let loop_info = LoopNestInfo::compute(function);

        // Should find one loop with header
        assert_eq!(loop_info.loops.len(), 1);
        assert!(loop_info.loops.contains_key(&header));

        let the_loop = &loop_info.loops[&header];
        assert!(the_loop.contains(header));
        assert!(the_loop.contains(body));
        assert!(!the_loop.contains(exit));
        assert_eq!(the_loop.latch, Some(body));
        assert_eq!(the_loop.preheader, Some(IrBlockId::entry()));
        assert_eq!(the_loop.exiting_blocks, vec![header]);
        assert_eq!(the_loop.exit_blocks, vec![exit]);
    }

    #[test]
    fn test_nested_loops_and_membership_updates() {
        //   entry -> outer <-------------+
        //              |                 |
        //            inner_pre           |
        //              |                 |
        //            inner <-+           |
        //              |-----+           |
        //            outer_latch --------+
        //              |
        //             exit
        let mut builder = IrBuilder::new("test");
        let sig = FunctionSignatureBuilder::new()
            .param("n", IrType::I64)
            .returns(IrType::Void)
            .build();
        builder.start_function("nested", sig);
        let n = builder.param(0).unwrap();

        let outer = builder.create_block_with_label("outer").unwrap();
        let inner_pre = builder.create_block_with_label("inner.pre").unwrap();
        let inner = builder.create_block_with_label("inner").unwrap();
        let outer_latch = builder.create_block_with_label("outer.latch").unwrap();
        let exit = builder.create_block_with_label("exit").unwrap();
        let zero = builder.build_int(0, IrType::I64).unwrap();
        builder.build_branch(outer);

        builder.switch_to_block(outer);
        builder.build_branch(inner_pre);

        builder.switch_to_block(inner_pre);
        builder.build_branch(inner);

        builder.switch_to_block(inner);
        let c = builder.build_cmp(CompareOp::Ne, n, zero).unwrap();
        builder.build_cond_branch(c, inner, outer_latch);

        builder.switch_to_block(outer_latch);
        builder.build_cond_branch(c, outer, exit);

        builder.switch_to_block(exit);
        builder.build_return(None);
        builder.finish_function();

        let mut function = builder.module.functions.values().next().unwrap().clone();
        let mut info = LoopNestInfo::compute(&function);

        assert_eq!(info.loops.len(), 2);
        assert_eq!(info.loops_innermost_first(), vec![inner, outer]);
        assert_eq!(info.loops[&inner].parent, Some(outer));
        assert_eq!(info.loops[&inner].preheader, Some(inner_pre));
        assert_eq!(info.loops[&inner].latch, Some(inner));
        assert_eq!(info.loops[&outer].children, vec![inner]);
        assert_eq!(info.loops[&inner].nesting_depth, 1);
        assert_eq!(info.max_depth, 1);
        let inner_loop = &info.loops[&inner];
        assert!(inner_loop.is_invariant(&function, n));
        assert!(inner_loop.is_invariant(&function, zero));
        assert!(!inner_loop.is_invariant(&function, c));

        // A block added to the inner loop also joins the outer loop
        let extra = function.cfg.create_block();
        info.add_block_to_loop(inner, extra);
        assert!(info.loops[&inner].contains(extra));
        assert!(info.loops[&outer].contains(extra));
        assert_eq!(info.block_to_loop[&extra], inner);
    }
}
