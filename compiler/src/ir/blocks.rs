//! MIR Basic Blocks
//!
//! This module defines basic blocks, which are sequences of instructions
//! with a single entry point and single exit point, and the control flow graph
//! they form inside a function.

use super::{IrId, IrInstruction};
use fxhash::FxHashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

/// Successor list; most terminators have at most two targets.
pub type Successors = SmallVec<[IrBlockId; 2]>;

/// A basic block in the MIR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrBasicBlock {
    /// Unique identifier for this block
    pub id: IrBlockId,

    /// Human-readable label (for debugging)
    pub label: Option<String>,

    /// Instructions in this block (executed sequentially)
    pub instructions: Vec<IrInstruction>,

    /// Terminator instruction (branch, return, etc.)
    pub terminator: IrTerminator,

    /// Phi nodes at the beginning of this block
    pub phi_nodes: Vec<IrPhiNode>,

    /// Predecessors in the CFG
    pub predecessors: Vec<IrBlockId>,

    /// Metadata for optimization hints
    pub metadata: BlockMetadata,
}

/// Unique identifier for basic blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IrBlockId(pub u32);

impl IrBlockId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn entry() -> Self {
        Self(0)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for IrBlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Phi node for merging values from different control flow paths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrPhiNode {
    /// Destination register for the phi result
    pub dest: IrId,

    /// Incoming values from predecessor blocks
    pub incoming: Vec<(IrBlockId, IrId)>,

    /// Type of the phi node
    pub ty: super::IrType,
}

impl IrPhiNode {
    /// Value flowing in from `pred`, if the phi has an entry for it
    pub fn incoming_from(&self, pred: IrBlockId) -> Option<IrId> {
        self.incoming
            .iter()
            .find(|(block, _)| *block == pred)
            .map(|(_, value)| *value)
    }
}

/// Terminator instructions that end a basic block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrTerminator {
    /// Unconditional branch to another block
    Branch { target: IrBlockId },

    /// Conditional branch based on a boolean value.
    /// Successor 0 is `true_target`, successor 1 is `false_target`.
    CondBranch {
        condition: IrId,
        true_target: IrBlockId,
        false_target: IrBlockId,
    },

    /// Switch/jump table
    Switch {
        value: IrId,
        cases: Vec<(i64, IrBlockId)>,
        default: IrBlockId,
    },

    /// Return from function
    Return { value: Option<IrId> },

    /// Unreachable code (for optimization)
    Unreachable,
}

impl IrTerminator {
    /// Successor blocks in operand order (duplicates preserved)
    pub fn successors(&self) -> Successors {
        match self {
            IrTerminator::Branch { target } => smallvec![*target],
            IrTerminator::CondBranch {
                true_target,
                false_target,
                ..
            } => smallvec![*true_target, *false_target],
            IrTerminator::Switch { cases, default, .. } => {
                let mut succs: Successors = cases.iter().map(|(_, target)| *target).collect();
                succs.push(*default);
                succs
            }
            IrTerminator::Return { .. } | IrTerminator::Unreachable => SmallVec::new(),
        }
    }

    /// Replace the successor at `index` (operand order as in [`successors`](Self::successors)).
    /// Returns false when the index is out of range.
    pub fn set_successor(&mut self, index: usize, block: IrBlockId) -> bool {
        match self {
            IrTerminator::Branch { target } if index == 0 => *target = block,
            IrTerminator::CondBranch { true_target, .. } if index == 0 => *true_target = block,
            IrTerminator::CondBranch { false_target, .. } if index == 1 => *false_target = block,
            IrTerminator::Switch { cases, default, .. } => {
                if index < cases.len() {
                    cases[index].1 = block;
                } else if index == cases.len() {
                    *default = block;
                } else {
                    return false;
                }
            }
            _ => return false,
        }
        true
    }

    /// Redirect every edge to `old` so it targets `new`
    pub fn replace_successor(&mut self, old: IrBlockId, new: IrBlockId) {
        let redirect = |target: &mut IrBlockId| {
            if *target == old {
                *target = new;
            }
        };
        match self {
            IrTerminator::Branch { target } => redirect(target),
            IrTerminator::CondBranch {
                true_target,
                false_target,
                ..
            } => {
                redirect(true_target);
                redirect(false_target);
            }
            IrTerminator::Switch { cases, default, .. } => {
                cases.iter_mut().for_each(|(_, target)| redirect(target));
                redirect(default);
            }
            IrTerminator::Return { .. } | IrTerminator::Unreachable => {}
        }
    }

    /// Registers read by the terminator
    pub fn uses(&self) -> Vec<IrId> {
        match self {
            IrTerminator::CondBranch { condition, .. } => vec![*condition],
            IrTerminator::Switch { value, .. } => vec![*value],
            IrTerminator::Return { value: Some(val) } => vec![*val],
            _ => Vec::new(),
        }
    }

    /// Rewrite operands through `replacements`; registers without an entry are kept.
    pub fn replace_uses(&mut self, replacements: &FxHashMap<IrId, IrId>) {
        let operand = match self {
            IrTerminator::CondBranch { condition, .. } => condition,
            IrTerminator::Switch { value, .. } => value,
            IrTerminator::Return { value: Some(val) } => val,
            _ => return,
        };
        if let Some(&new_reg) = replacements.get(operand) {
            *operand = new_reg;
        }
    }
}

/// Metadata for optimization and analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockMetadata {
    /// Block this one was duplicated from, if it is a clone
    pub cloned_from: Option<IrBlockId>,
}

impl IrBasicBlock {
    /// Create a new basic block
    pub fn new(id: IrBlockId) -> Self {
        Self {
            id,
            label: None,
            instructions: Vec::new(),
            terminator: IrTerminator::Unreachable,
            phi_nodes: Vec::new(),
            predecessors: Vec::new(),
            metadata: BlockMetadata::default(),
        }
    }

    /// Add an instruction to this block
    pub fn add_instruction(&mut self, inst: IrInstruction) {
        self.instructions.push(inst);
    }

    /// Add a phi node to this block
    pub fn add_phi(&mut self, phi: IrPhiNode) {
        self.phi_nodes.push(phi);
    }

    /// Set the terminator for this block
    pub fn set_terminator(&mut self, term: IrTerminator) {
        self.terminator = term;
    }

    /// Get all successor blocks based on the terminator
    pub fn successors(&self) -> Successors {
        self.terminator.successors()
    }

    /// Check if this block is terminated properly
    pub fn is_terminated(&self) -> bool {
        !matches!(self.terminator, IrTerminator::Unreachable)
    }

    /// Display name: the label when present, otherwise the id
    pub fn name(&self) -> String {
        self.label.clone().unwrap_or_else(|| self.id.to_string())
    }

    /// Whether this block defines `reg` (phi or instruction)
    pub fn defines(&self, reg: IrId) -> bool {
        self.phi_nodes.iter().any(|phi| phi.dest == reg)
            || self.instructions.iter().any(|inst| inst.dest() == Some(reg))
    }
}

/// Control flow graph of one function.
///
/// Blocks are kept in layout order; new blocks are appended at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrControlFlowGraph {
    /// All basic blocks in the function
    pub blocks: IndexMap<IrBlockId, IrBasicBlock>,

    /// Entry block ID
    pub entry_block: IrBlockId,

    /// Next available block ID
    pub next_block_id: u32,
}

impl Default for IrControlFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl IrControlFlowGraph {
    /// Create a new CFG with an entry block
    pub fn new() -> Self {
        let mut blocks = IndexMap::new();
        let entry_block = IrBlockId::entry();
        blocks.insert(entry_block, IrBasicBlock::new(entry_block));

        Self {
            blocks,
            entry_block,
            next_block_id: 1,
        }
    }

    /// Create a new basic block
    pub fn create_block(&mut self) -> IrBlockId {
        let id = IrBlockId::new(self.next_block_id);
        self.next_block_id += 1;
        self.blocks.insert(id, IrBasicBlock::new(id));
        id
    }

    /// Create a new basic block carrying a label
    pub fn create_block_with_label(&mut self, label: impl Into<String>) -> IrBlockId {
        let id = self.create_block();
        if let Some(block) = self.blocks.get_mut(&id) {
            block.label = Some(label.into());
        }
        id
    }

    /// Get a block by ID
    pub fn get_block(&self, id: IrBlockId) -> Option<&IrBasicBlock> {
        self.blocks.get(&id)
    }

    /// Get a mutable block by ID
    pub fn get_block_mut(&mut self, id: IrBlockId) -> Option<&mut IrBasicBlock> {
        self.blocks.get_mut(&id)
    }

    /// Block IDs in layout order
    pub fn block_ids(&self) -> Vec<IrBlockId> {
        self.blocks.keys().copied().collect()
    }

    /// Connect two blocks (update predecessors)
    pub fn connect_blocks(&mut self, from: IrBlockId, to: IrBlockId) {
        if let Some(to_block) = self.blocks.get_mut(&to) {
            if !to_block.predecessors.contains(&from) {
                to_block.predecessors.push(from);
            }
        }
    }

    /// Predecessor lists derived from the terminators, in layout order.
    ///
    /// This never trusts the cached `predecessors` fields, so analyses can run
    /// in the middle of a CFG rewrite.
    pub fn predecessor_map(&self) -> FxHashMap<IrBlockId, Vec<IrBlockId>> {
        let mut preds: FxHashMap<IrBlockId, Vec<IrBlockId>> =
            self.blocks.keys().map(|&id| (id, Vec::new())).collect();
        for (&id, block) in &self.blocks {
            for succ in block.successors() {
                let list = preds.entry(succ).or_default();
                if !list.contains(&id) {
                    list.push(id);
                }
            }
        }
        preds
    }

    /// Rebuild every block's cached predecessor list from the terminators
    pub fn recompute_predecessors(&mut self) {
        let mut preds = self.predecessor_map();
        for (id, block) in self.blocks.iter_mut() {
            block.predecessors = preds.remove(id).unwrap_or_default();
        }
    }

    /// Verify CFG integrity
    pub fn verify(&self) -> Result<(), String> {
        // Check entry block exists
        if !self.blocks.contains_key(&self.entry_block) {
            return Err("Entry block not found".to_string());
        }

        let preds = self.predecessor_map();

        for (id, block) in &self.blocks {
            if !block.is_terminated() && !block.instructions.is_empty() {
                return Err(format!("Block {} is not properly terminated", id));
            }

            // Verify successor blocks exist
            for succ in block.successors() {
                if !self.blocks.contains_key(&succ) {
                    return Err(format!(
                        "Block {} references non-existent successor {}",
                        id, succ
                    ));
                }
            }

            // Verify phi node consistency
            let block_preds = preds.get(id).map(|p| p.as_slice()).unwrap_or(&[]);
            for phi in &block.phi_nodes {
                for (pred_block, _) in &phi.incoming {
                    if !block_preds.contains(pred_block) {
                        return Err(format!(
                            "Phi node {} in block {} references non-predecessor block {}",
                            phi.dest, id, pred_block
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}
