//! MIR Builder
//!
//! This module provides a builder interface for constructing MIR in a convenient way.
//! The builder maintains context and provides helper methods for common patterns.

use tracing::debug;

use super::{
    BinaryOp, CompareOp, IrBlockId, IrExternFunction, IrFunction, IrFunctionId,
    IrFunctionSignature, IrId, IrInstruction, IrModule, IrParameter, IrPhiNode, IrTerminator,
    IrType, IrValue, UnaryOp,
};

/// MIR builder for constructing IR modules
pub struct IrBuilder {
    /// The module being built
    pub module: IrModule,

    /// Current function being built
    pub(crate) current_function: Option<IrFunctionId>,

    /// Current basic block being built
    pub(crate) current_block: Option<IrBlockId>,
}

impl IrBuilder {
    /// Create a new IR builder
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module: IrModule::new(module_name.into()),
            current_function: None,
            current_block: None,
        }
    }

    // === Module Building ===

    /// Start building a new function
    pub fn start_function(
        &mut self,
        name: impl Into<String>,
        signature: IrFunctionSignature,
    ) -> IrFunctionId {
        let id = self.module.alloc_function_id();
        let function = IrFunction::new(id, name.into(), signature);
        self.current_function = Some(id);
        self.current_block = Some(function.entry_block());
        self.module.add_function(function);
        id
    }

    /// Finish building the current function
    pub fn finish_function(&mut self) {
        self.current_function = None;
        self.current_block = None;
    }

    /// Declare a body-less external function
    pub fn declare_extern(
        &mut self,
        name: impl Into<String>,
        signature: IrFunctionSignature,
    ) -> IrFunctionId {
        let id = self.module.alloc_function_id();
        self.module.add_extern_function(IrExternFunction {
            id,
            name: name.into(),
            signature,
        })
    }

    /// Get the current function
    pub fn current_function(&self) -> Option<&IrFunction> {
        self.current_function
            .and_then(|id| self.module.functions.get(&id))
    }

    /// Get the current function mutably
    pub fn current_function_mut(&mut self) -> Option<&mut IrFunction> {
        self.current_function
            .and_then(move |id| self.module.functions.get_mut(&id))
    }

    /// Parameter register of the current function
    pub fn param(&self, index: usize) -> Option<IrId> {
        self.current_function()?.get_param_reg(index)
    }

    // === Block Building ===

    /// Create a new basic block in the current function
    pub fn create_block(&mut self) -> Option<IrBlockId> {
        self.current_function_mut().map(|f| f.cfg.create_block())
    }

    /// Create a new basic block with a label
    pub fn create_block_with_label(&mut self, label: impl Into<String>) -> Option<IrBlockId> {
        let label = label.into();
        self.current_function_mut()
            .map(|f| f.cfg.create_block_with_label(label))
    }

    /// Switch to building in a different block
    pub fn switch_to_block(&mut self, block: IrBlockId) {
        self.current_block = Some(block);
    }

    /// Get the current block
    pub fn current_block(&self) -> Option<IrBlockId> {
        self.current_block
    }

    // === Register Management ===

    /// Allocate a new register in the current function
    pub fn alloc_reg(&mut self) -> Option<IrId> {
        self.current_function_mut().map(|f| f.alloc_reg())
    }

    /// Get the type of a register
    pub fn get_register_type(&self, reg: IrId) -> Option<IrType> {
        self.current_function()?.reg_type(reg).cloned()
    }

    /// Set the type of a register
    pub fn set_register_type(&mut self, reg: IrId, ty: IrType) {
        if let Some(func) = self.current_function_mut() {
            func.register_types.insert(reg, ty);
        }
    }

    // === Instruction Building ===

    /// Add an instruction to the current block
    fn add_instruction(&mut self, inst: IrInstruction) -> Option<()> {
        let block_id = self.current_block?;
        self.current_function_mut()
            .and_then(|f| f.cfg.get_block_mut(block_id))
            .map(|b| b.add_instruction(inst))
    }

    /// Build a constant instruction
    pub fn build_const(&mut self, value: IrValue) -> Option<IrId> {
        let dest = self.alloc_reg()?;
        self.set_register_type(dest, value.ty());
        self.add_instruction(IrInstruction::Const { dest, value })?;
        Some(dest)
    }

    /// Build a load instruction
    pub fn build_load(&mut self, ptr: IrId, ty: IrType) -> Option<IrId> {
        let dest = self.alloc_reg()?;
        self.set_register_type(dest, ty.clone());
        self.add_instruction(IrInstruction::Load { dest, ptr, ty })?;
        Some(dest)
    }

    /// Build a store instruction
    pub fn build_store(&mut self, ptr: IrId, value: IrId) -> Option<()> {
        self.add_instruction(IrInstruction::Store { ptr, value })
    }

    /// Build a binary operation
    pub fn build_binop(&mut self, op: BinaryOp, left: IrId, right: IrId) -> Option<IrId> {
        let dest = self.alloc_reg()?;
        // Result type follows the left operand (or right if left is unknown)
        if let Some(ty) = self
            .get_register_type(left)
            .or_else(|| self.get_register_type(right))
        {
            self.set_register_type(dest, ty);
        }
        self.add_instruction(IrInstruction::BinOp { dest, op, left, right })?;
        Some(dest)
    }

    /// Build a unary operation
    pub fn build_unop(&mut self, op: UnaryOp, operand: IrId) -> Option<IrId> {
        let dest = self.alloc_reg()?;
        if let Some(ty) = self.get_register_type(operand) {
            self.set_register_type(dest, ty);
        }
        self.add_instruction(IrInstruction::UnOp { dest, op, operand })?;
        Some(dest)
    }

    /// Build a comparison operation
    pub fn build_cmp(&mut self, op: CompareOp, left: IrId, right: IrId) -> Option<IrId> {
        let dest = self.alloc_reg()?;
        // Comparisons always return Bool
        self.set_register_type(dest, IrType::Bool);
        self.add_instruction(IrInstruction::Cmp { dest, op, left, right })?;
        Some(dest)
    }

    /// Build an alloc instruction (stack allocation)
    pub fn build_alloc(&mut self, ty: IrType, count: Option<IrId>) -> Option<IrId> {
        let dest = self.alloc_reg()?;
        self.set_register_type(dest, ty.clone().ptr_to());
        self.add_instruction(IrInstruction::Alloc { dest, ty, count })?;
        Some(dest)
    }

    /// Build a conversion of `src` to `to_ty`; the source type comes from the register
    pub fn build_cast(&mut self, src: IrId, to_ty: IrType) -> Option<IrId> {
        let from_ty = self.get_register_type(src)?;
        let dest = self.alloc_reg()?;
        self.add_instruction(IrInstruction::Cast {
            dest,
            src,
            from_ty,
            to_ty: to_ty.clone(),
        })?;
        self.set_register_type(dest, to_ty);
        Some(dest)
    }

    /// Build a direct function call (callee known at compile time)
    ///
    /// A destination register is only allocated when the callee returns a value.
    pub fn build_call_direct(&mut self, func_id: IrFunctionId, args: Vec<IrId>) -> Option<IrId> {
        self.build_call(func_id, args, false)
    }

    /// Build a direct call that must never be duplicated
    pub fn build_call_no_duplicate(
        &mut self,
        func_id: IrFunctionId,
        args: Vec<IrId>,
    ) -> Option<IrId> {
        self.build_call(func_id, args, true)
    }

    fn build_call(
        &mut self,
        func_id: IrFunctionId,
        args: Vec<IrId>,
        no_duplicate: bool,
    ) -> Option<IrId> {
        let return_type = if let Some(func) = self.module.functions.get(&func_id) {
            func.signature.return_type.clone()
        } else if let Some(extern_func) = self.module.extern_functions.get(&func_id) {
            extern_func.signature.return_type.clone()
        } else {
            debug!("call to unknown function {}, assuming void", func_id);
            IrType::Void
        };

        let dest = if return_type == IrType::Void {
            None
        } else {
            let reg = self.alloc_reg()?;
            self.set_register_type(reg, return_type);
            Some(reg)
        };

        self.add_instruction(IrInstruction::CallDirect {
            dest,
            func_id,
            args,
            no_duplicate,
        })?;

        // Void calls still report success with an invalid register
        Some(dest.unwrap_or_else(IrId::invalid))
    }

    /// Build a block-address constant
    pub fn build_block_address(&mut self, block: IrBlockId) -> Option<IrId> {
        let dest = self.alloc_reg()?;
        self.set_register_type(dest, IrType::Ptr(Box::new(IrType::Void)));
        self.add_instruction(IrInstruction::BlockAddress { dest, block })?;
        Some(dest)
    }

    // === Terminator Building ===

    /// Set the terminator for the current block
    fn set_terminator(&mut self, term: IrTerminator) -> Option<()> {
        let block_id = self.current_block?;
        let func = self.current_function_mut()?;

        // First, set the terminator
        let block = func.cfg.get_block_mut(block_id)?;
        block.set_terminator(term.clone());

        // Then, update predecessor information based on the terminator
        for succ in term.successors() {
            func.cfg.connect_blocks(block_id, succ);
        }

        Some(())
    }

    /// Build an unconditional branch
    pub fn build_branch(&mut self, target: IrBlockId) -> Option<()> {
        self.set_terminator(IrTerminator::Branch { target })
    }

    /// Build a conditional branch
    pub fn build_cond_branch(
        &mut self,
        condition: IrId,
        true_target: IrBlockId,
        false_target: IrBlockId,
    ) -> Option<()> {
        self.set_terminator(IrTerminator::CondBranch {
            condition,
            true_target,
            false_target,
        })
    }

    /// Build a switch statement
    pub fn build_switch(
        &mut self,
        value: IrId,
        cases: Vec<(i64, IrBlockId)>,
        default: IrBlockId,
    ) -> Option<()> {
        self.set_terminator(IrTerminator::Switch { value, cases, default })
    }

    /// Build a return instruction
    pub fn build_return(&mut self, value: Option<IrId>) -> Option<()> {
        self.set_terminator(IrTerminator::Return { value })
    }

    // === Phi Node Building ===

    /// Add a phi node to a block
    pub fn build_phi(&mut self, block: IrBlockId, ty: IrType) -> Option<IrId> {
        let dest = self.alloc_reg()?;
        self.set_register_type(dest, ty.clone());
        let phi = IrPhiNode {
            dest,
            incoming: Vec::new(),
            ty,
        };

        self.current_function_mut()
            .and_then(|f| f.cfg.get_block_mut(block))
            .map(|b| b.add_phi(phi))?;

        Some(dest)
    }

    /// Add an incoming value to a phi node
    pub fn add_phi_incoming(
        &mut self,
        block: IrBlockId,
        phi_dest: IrId,
        from_block: IrBlockId,
        value: IrId,
    ) -> Option<()> {
        self.current_function_mut()
            .and_then(|f| f.cfg.get_block_mut(block))
            .and_then(|b| b.phi_nodes.iter_mut().find(|p| p.dest == phi_dest))
            .map(|phi| phi.incoming.push((from_block, value)))
    }

    // === Convenience Methods ===

    /// Build an integer constant
    pub fn build_int(&mut self, value: i64, ty: IrType) -> Option<IrId> {
        let ir_value = IrValue::from_int(value, &ty)?;
        self.build_const(ir_value)
    }

    /// Build a boolean constant
    pub fn build_bool(&mut self, value: bool) -> Option<IrId> {
        self.build_const(IrValue::Bool(value))
    }

    /// Build addition
    pub fn build_add(&mut self, left: IrId, right: IrId, is_float: bool) -> Option<IrId> {
        let op = if is_float { BinaryOp::FAdd } else { BinaryOp::Add };
        self.build_binop(op, left, right)
    }
}

/// Function builder helper for building function signatures
pub struct FunctionSignatureBuilder {
    parameters: Vec<IrParameter>,
    return_type: IrType,
}

impl Default for FunctionSignatureBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionSignatureBuilder {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
            return_type: IrType::Void,
        }
    }

    pub fn param(mut self, name: impl Into<String>, ty: IrType) -> Self {
        self.parameters.push(IrParameter {
            name: name.into(),
            ty,
            reg: IrId::new(0), // Will be assigned later
        });
        self
    }

    pub fn returns(mut self, ty: IrType) -> Self {
        self.return_type = ty;
        self
    }

    pub fn build(self) -> IrFunctionSignature {
        IrFunctionSignature {
            parameters: self.parameters,
            return_type: self.return_type,
        }
    }
}
