//! MIR Functions
//!
//! This module defines function representation in the MIR, including
//! function signatures, parameters, attributes, and the function body.

use super::{IrBlockId, IrControlFlowGraph, IrId, IrInstruction, IrType, Linkage};
use fxhash::FxHashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// MIR function representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrFunction {
    /// Unique identifier for this function
    pub id: IrFunctionId,

    /// Function name
    pub name: String,

    /// Function signature
    pub signature: IrFunctionSignature,

    /// Control flow graph (function body)
    pub cfg: IrControlFlowGraph,

    /// Type information for all registers (parameters and intermediate values)
    pub register_types: IndexMap<IrId, IrType>,

    /// Function attributes
    pub attributes: FunctionAttributes,

    /// Next available register ID
    pub next_reg_id: u32,
}

/// Unique identifier for functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IrFunctionId(pub u32);

impl std::fmt::Display for IrFunctionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

/// Function signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrFunctionSignature {
    /// Parameter types and names
    pub parameters: Vec<IrParameter>,

    /// Return type
    pub return_type: IrType,
}

/// Function parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrParameter {
    /// Parameter name
    pub name: String,

    /// Parameter type
    pub ty: IrType,

    /// Register assigned to this parameter
    pub reg: IrId,
}

/// Function attributes and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionAttributes {
    /// Linkage type
    pub linkage: Linkage,

    /// Whether this function is inline
    pub inline: InlineHint,

    /// Whether this function should be optimized for size
    pub optimize_size: bool,
}

/// Inline hint for functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InlineHint {
    /// Never inline
    Never,

    /// Compiler decides
    Auto,

    /// Prefer to inline
    Hint,

    /// Always inline
    Always,
}

impl Default for FunctionAttributes {
    fn default() -> Self {
        Self {
            linkage: Linkage::Private,
            inline: InlineHint::Auto,
            optimize_size: false,
        }
    }
}

impl IrFunction {
    /// Create a new MIR function
    pub fn new(id: IrFunctionId, name: String, signature: IrFunctionSignature) -> Self {
        let mut function = Self {
            id,
            name,
            signature,
            cfg: IrControlFlowGraph::new(),
            register_types: IndexMap::new(),
            attributes: FunctionAttributes::default(),
            next_reg_id: 0,
        };

        // Allocate registers for parameters and register their types
        let param_count = function.signature.parameters.len();
        for i in 0..param_count {
            let param_ty = function.signature.parameters[i].ty.clone();
            let reg = function.alloc_typed_reg(param_ty);
            function.signature.parameters[i].reg = reg;
        }

        function
    }

    /// Allocate a new register
    pub fn alloc_reg(&mut self) -> IrId {
        let id = IrId::new(self.next_reg_id);
        self.next_reg_id += 1;
        id
    }

    /// Allocate a new register and record its type
    pub fn alloc_typed_reg(&mut self, ty: IrType) -> IrId {
        let reg = self.alloc_reg();
        self.register_types.insert(reg, ty);
        reg
    }

    /// Type of a register, if known
    pub fn reg_type(&self, reg: IrId) -> Option<&IrType> {
        self.register_types.get(&reg)
    }

    /// Get the entry block
    pub fn entry_block(&self) -> IrBlockId {
        self.cfg.entry_block
    }

    /// Get parameter register by index
    pub fn get_param_reg(&self, index: usize) -> Option<IrId> {
        self.signature.parameters.get(index).map(|p| p.reg)
    }

    /// Whether `reg` is bound to a parameter
    pub fn is_param(&self, reg: IrId) -> bool {
        self.signature.parameters.iter().any(|p| p.reg == reg)
    }

    /// Whether the function has a body
    pub fn has_body(&self) -> bool {
        self.cfg
            .get_block(self.cfg.entry_block)
            .map(|entry| entry.is_terminated())
            .unwrap_or(false)
    }

    /// Map from every defined register to the block that defines it
    pub fn def_blocks(&self) -> FxHashMap<IrId, IrBlockId> {
        let mut defs = FxHashMap::default();
        for (&block_id, block) in &self.cfg.blocks {
            for phi in &block.phi_nodes {
                defs.insert(phi.dest, block_id);
            }
            for inst in &block.instructions {
                if let Some(dest) = inst.dest() {
                    defs.insert(dest, block_id);
                }
            }
        }
        defs
    }

    /// Find the instruction defining `reg` (phis are not instructions)
    pub fn find_def(&self, reg: IrId) -> Option<(IrBlockId, &IrInstruction)> {
        self.cfg.blocks.iter().find_map(|(&block_id, block)| {
            block
                .instructions
                .iter()
                .find(|inst| inst.dest() == Some(reg))
                .map(|inst| (block_id, inst))
        })
    }

    /// Verify function integrity
    pub fn verify(&self) -> Result<(), String> {
        // Verify CFG
        self.cfg.verify()?;

        // Verify entry block has no phi nodes
        if let Some(entry) = self.cfg.get_block(self.cfg.entry_block) {
            if !entry.phi_nodes.is_empty() {
                return Err("Entry block cannot have phi nodes".to_string());
            }
        }

        Ok(())
    }

    /// Compute statistics for this function
    pub fn compute_stats(&self) -> FunctionStats {
        let mut stats = FunctionStats::default();

        stats.block_count = self.cfg.blocks.len();

        for block in self.cfg.blocks.values() {
            stats.instruction_count += block.instructions.len();
            stats.phi_count += block.phi_nodes.len();
        }

        stats
    }
}

/// Function statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FunctionStats {
    /// Number of basic blocks
    pub block_count: usize,

    /// Number of instructions
    pub instruction_count: usize,

    /// Number of phi nodes
    pub phi_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(params: &[(&str, IrType)], ret: IrType) -> IrFunctionSignature {
        IrFunctionSignature {
            parameters: params
                .iter()
                .map(|(name, ty)| IrParameter {
                    name: name.to_string(),
                    ty: ty.clone(),
                    reg: IrId::new(0),
                })
                .collect(),
            return_type: ret,
        }
    }

    #[test]
    fn test_function_creation() {
        let func = IrFunction::new(
            IrFunctionId(1),
            "add".to_string(),
            sig(&[("x", IrType::I32), ("y", IrType::I32)], IrType::I32),
        );

        assert_eq!(func.name, "add");
        assert_eq!(func.signature.parameters.len(), 2);

        // Parameters should have registers assigned
        let x = func.get_param_reg(0).unwrap();
        let y = func.get_param_reg(1).unwrap();
        assert_ne!(x, y);
        assert!(func.is_param(x));
        assert_eq!(func.reg_type(y), Some(&IrType::I32));
        assert!(!func.has_body());
    }

    #[test]
    fn test_def_lookup() {
        let mut func = IrFunction::new(IrFunctionId(0), "f".to_string(), sig(&[], IrType::Void));
        let dest = func.alloc_typed_reg(IrType::I64);
        let entry = func.entry_block();
        let block = func.cfg.get_block_mut(entry).unwrap();
        block.add_instruction(IrInstruction::Const {
            dest,
            value: super::super::IrValue::I64(7),
        });
        block.set_terminator(super::super::IrTerminator::Return { value: Some(dest) });

        assert_eq!(func.def_blocks().get(&dest), Some(&entry));
        assert!(matches!(func.find_def(dest), Some((b, IrInstruction::Const { .. })) if b == entry));
        assert_eq!(func.compute_stats().instruction_count, 1);
        assert!(func.has_body());
        assert!(func.verify().is_ok());
    }
}
