//! MIR Validation
//!
//! This module provides validation passes for the MIR to ensure correctness
//! after transformations. It checks control flow integrity, proper SSA form
//! (single definitions, uses dominated by their definitions, phi operands
//! matching predecessors), and basic type consistency.

use super::loop_analysis::DominatorTree;
use super::{
    IrBasicBlock, IrBlockId, IrFunction, IrFunctionId, IrId, IrInstruction, IrModule,
    IrTerminator, IrType, IrValue,
};
use fxhash::{FxHashMap, FxHashSet};
use std::fmt;

/// Validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub function: Option<IrFunctionId>,
    pub block: Option<IrBlockId>,
}

/// Types of validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationErrorKind {
    /// Register used without a dominating definition
    UseBeforeDefine { register: IrId },

    /// Register defined multiple times
    MultipleDefinitions { register: IrId },

    /// Type mismatch
    TypeMismatch {
        expected: IrType,
        found: IrType,
        register: IrId,
    },

    /// Missing terminator in basic block
    MissingTerminator { block: IrBlockId },

    /// Invalid control flow
    InvalidControlFlow {
        from: IrBlockId,
        to: IrBlockId,
        reason: String,
    },

    /// Phi node inconsistency
    InvalidPhiNode { block: IrBlockId, reason: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(func) = self.function {
            write!(f, "{}: ", func)?;
        }
        if let Some(block) = self.block {
            write!(f, "{}: ", block)?;
        }
        match &self.kind {
            ValidationErrorKind::UseBeforeDefine { register } => {
                write!(f, "{} is used without a dominating definition", register)
            }
            ValidationErrorKind::MultipleDefinitions { register } => {
                write!(f, "{} is defined more than once", register)
            }
            ValidationErrorKind::TypeMismatch {
                expected,
                found,
                register,
            } => write!(f, "{} has type {}, expected {}", register, found, expected),
            ValidationErrorKind::MissingTerminator { block } => {
                write!(f, "block {} has no terminator", block)
            }
            ValidationErrorKind::InvalidControlFlow { from, to, reason } => {
                write!(f, "edge {} -> {}: {}", from, to, reason)
            }
            ValidationErrorKind::InvalidPhiNode { block, reason } => {
                write!(f, "phi in {}: {}", block, reason)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Where a register is defined
#[derive(Debug, Clone, Copy)]
enum DefSite {
    Param,
    Phi(IrBlockId),
    Inst(IrBlockId, usize),
}

/// MIR validation context for one function
struct ValidationContext<'a> {
    function: &'a IrFunction,
    domtree: DominatorTree,
    defs: FxHashMap<IrId, DefSite>,
    errors: Vec<ValidationError>,
}

impl<'a> ValidationContext<'a> {
    fn new(function: &'a IrFunction) -> Self {
        Self {
            function,
            domtree: DominatorTree::compute(function),
            defs: FxHashMap::default(),
            errors: Vec::new(),
        }
    }

    /// Add a validation error
    fn add_error(&mut self, block: Option<IrBlockId>, kind: ValidationErrorKind) {
        self.errors.push(ValidationError {
            kind,
            function: Some(self.function.id),
            block,
        });
    }

    /// Record register definition
    fn define_register(&mut self, reg: IrId, site: DefSite, block: Option<IrBlockId>) {
        if self.defs.insert(reg, site).is_some() {
            self.add_error(block, ValidationErrorKind::MultipleDefinitions { register: reg });
        }
    }

    /// Whether a definition is available at instruction `index` of `block`.
    /// `index == usize::MAX` means "at the end of the block" (terminator, phi edge).
    fn def_reaches(&self, reg: IrId, block: IrBlockId, index: usize) -> bool {
        match self.defs.get(&reg) {
            Some(DefSite::Param) => true,
            Some(DefSite::Phi(def_block)) => self.domtree.dominates(*def_block, block),
            Some(DefSite::Inst(def_block, def_index)) => {
                if *def_block == block {
                    *def_index < index
                } else {
                    self.domtree.dominates(*def_block, block)
                }
            }
            None => false,
        }
    }

    fn check_use(&mut self, reg: IrId, block: IrBlockId, index: usize) {
        if !self.def_reaches(reg, block, index) {
            self.add_error(Some(block), ValidationErrorKind::UseBeforeDefine { register: reg });
        }
    }

    fn check_type(&mut self, block: IrBlockId, reg: IrId, expected: &IrType) {
        let function = self.function;
        if let Some(found) = function.reg_type(reg) {
            if found != expected {
                self.add_error(
                    Some(block),
                    ValidationErrorKind::TypeMismatch {
                        expected: expected.clone(),
                        found: found.clone(),
                        register: reg,
                    },
                );
            }
        }
    }
}

/// Validate every function of a module.
pub fn validate_module(module: &IrModule) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    for function in module.functions.values() {
        if let Err(mut function_errors) = validate_function(function) {
            errors.append(&mut function_errors);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate one function.
pub fn validate_function(function: &IrFunction) -> Result<(), Vec<ValidationError>> {
    let mut ctx = ValidationContext::new(function);

    validate_cfg_structure(&mut ctx);
    collect_definitions(&mut ctx);

    // Uses are only meaningful in reachable code
    let reachable: Vec<IrBlockId> = ctx.domtree.reverse_postorder().to_vec();
    for block_id in reachable {
        if let Some(block) = function.cfg.get_block(block_id) {
            validate_block(&mut ctx, block);
        }
    }

    validate_return_types(&mut ctx);

    if ctx.errors.is_empty() {
        Ok(())
    } else {
        Err(ctx.errors)
    }
}

/// Terminator targets exist; reachable blocks are terminated.
fn validate_cfg_structure(ctx: &mut ValidationContext) {
    let cfg = &ctx.function.cfg;
    let mut problems = Vec::new();

    for (&id, block) in &cfg.blocks {
        if ctx.domtree.is_reachable(id) && !block.is_terminated() && !block.instructions.is_empty()
        {
            problems.push((Some(id), ValidationErrorKind::MissingTerminator { block: id }));
        }
        for succ in block.successors() {
            if cfg.get_block(succ).is_none() {
                problems.push((
                    Some(id),
                    ValidationErrorKind::InvalidControlFlow {
                        from: id,
                        to: succ,
                        reason: "target block does not exist".to_string(),
                    },
                ));
            }
        }
    }

    for (block, kind) in problems {
        ctx.add_error(block, kind);
    }
}

fn collect_definitions(ctx: &mut ValidationContext) {
    let function = ctx.function;
    for param in &function.signature.parameters {
        ctx.define_register(param.reg, DefSite::Param, None);
    }
    for (&block_id, block) in &function.cfg.blocks {
        for phi in &block.phi_nodes {
            ctx.define_register(phi.dest, DefSite::Phi(block_id), Some(block_id));
        }
        for (index, inst) in block.instructions.iter().enumerate() {
            if let Some(dest) = inst.dest() {
                ctx.define_register(dest, DefSite::Inst(block_id, index), Some(block_id));
            }
        }
    }
}

fn validate_block(ctx: &mut ValidationContext, block: &IrBasicBlock) {
    let block_id = block.id;
    let preds: Vec<IrBlockId> = ctx.domtree.predecessors(block_id).to_vec();

    // Phi nodes: one incoming per predecessor, each value available at the end of it
    for phi in &block.phi_nodes {
        let mut seen = FxHashSet::default();
        for &(pred, value) in &phi.incoming {
            if !preds.contains(&pred) {
                ctx.add_error(
                    Some(block_id),
                    ValidationErrorKind::InvalidPhiNode {
                        block: block_id,
                        reason: format!("{} names non-predecessor {}", phi.dest, pred),
                    },
                );
                continue;
            }
            if !seen.insert(pred) {
                ctx.add_error(
                    Some(block_id),
                    ValidationErrorKind::InvalidPhiNode {
                        block: block_id,
                        reason: format!("{} has two entries for {}", phi.dest, pred),
                    },
                );
            }
            if ctx.domtree.is_reachable(pred) && !ctx.def_reaches(value, pred, usize::MAX) {
                ctx.add_error(
                    Some(block_id),
                    ValidationErrorKind::UseBeforeDefine { register: value },
                );
            }
        }
        for pred in &preds {
            if ctx.domtree.is_reachable(*pred) && !seen.contains(pred) {
                ctx.add_error(
                    Some(block_id),
                    ValidationErrorKind::InvalidPhiNode {
                        block: block_id,
                        reason: format!("{} has no entry for predecessor {}", phi.dest, pred),
                    },
                );
            }
        }
    }

    for (index, inst) in block.instructions.iter().enumerate() {
        for reg in inst.uses() {
            ctx.check_use(reg, block_id, index);
        }
        validate_instruction_types(ctx, block_id, inst);
    }

    for reg in block.terminator.uses() {
        ctx.check_use(reg, block_id, usize::MAX);
    }
    if let IrTerminator::CondBranch { condition, .. } = &block.terminator {
        ctx.check_type(block_id, *condition, &IrType::Bool);
    }
}

fn validate_instruction_types(ctx: &mut ValidationContext, block: IrBlockId, inst: &IrInstruction) {
    match inst {
        IrInstruction::BinOp { left, right, .. } => {
            if let Some(left_ty) = ctx.function.reg_type(*left).cloned() {
                ctx.check_type(block, *right, &left_ty);
            }
        }
        IrInstruction::Store { ptr, value } => {
            let pointee = ctx
                .function
                .reg_type(*ptr)
                .and_then(|ty| ty.pointee())
                .cloned();
            if let Some(pointee) = pointee.filter(|ty| *ty != IrType::Void) {
                ctx.check_type(block, *value, &pointee);
            }
        }
        IrInstruction::Const { dest, value } if *value != IrValue::Undef => {
            ctx.check_type(block, *dest, &value.ty());
        }
        IrInstruction::Cmp { dest, .. } => ctx.check_type(block, *dest, &IrType::Bool),
        _ => {}
    }
}

fn validate_return_types(ctx: &mut ValidationContext) {
    let expected = ctx.function.signature.return_type.clone();
    let returns: Vec<(IrBlockId, IrId)> = ctx
        .function
        .cfg
        .blocks
        .values()
        .filter_map(|b| match b.terminator {
            IrTerminator::Return { value: Some(v) } => Some((b.id, v)),
            _ => None,
        })
        .collect();
    for (block, value) in returns {
        ctx.check_type(block, value, &expected);
    }
}
