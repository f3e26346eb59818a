//! IR Instructions
//!
//! Defines the instruction set for the intermediate representation.
//! Instructions are low-level operations that map directly to machine operations.
//! Control flow lives in [`IrTerminator`](super::IrTerminator), not here.

use super::{IrBlockId, IrFunctionId, IrId, IrType, IrValue};
use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};

/// IR instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrInstruction {
    // === Value Operations ===

    /// Load constant value
    Const {
        dest: IrId,
        value: IrValue,
    },

    /// Copy value from one register to another
    Copy {
        dest: IrId,
        src: IrId,
    },

    /// Load value from memory
    Load {
        dest: IrId,
        ptr: IrId,
        ty: IrType,
    },

    /// Store value to memory
    Store {
        ptr: IrId,
        value: IrId,
    },

    // === Arithmetic Operations ===

    /// Binary arithmetic operation
    BinOp {
        dest: IrId,
        op: BinaryOp,
        left: IrId,
        right: IrId,
    },

    /// Unary operation
    UnOp {
        dest: IrId,
        op: UnaryOp,
        operand: IrId,
    },

    /// Compare operation
    Cmp {
        dest: IrId,
        op: CompareOp,
        left: IrId,
        right: IrId,
    },

    /// Select (ternary) operation
    Select {
        dest: IrId,
        condition: IrId,
        true_val: IrId,
        false_val: IrId,
    },

    /// Type cast
    Cast {
        dest: IrId,
        src: IrId,
        from_ty: IrType,
        to_ty: IrType,
    },

    // === Memory Operations ===

    /// Allocate a stack slot (`count` elements of `ty`, one when absent)
    Alloc {
        dest: IrId,
        ty: IrType,
        count: Option<IrId>,
    },

    // === Calls ===

    /// Direct call to a function known at compile time.
    ///
    /// `no_duplicate` marks calls that must exist exactly once in the code
    /// (barriers, unique-label intrinsics); passes must not clone them.
    CallDirect {
        dest: Option<IrId>,
        func_id: IrFunctionId,
        args: Vec<IrId>,
        no_duplicate: bool,
    },

    // === Special Operations ===

    /// Address of a basic block (indirect-branch target)
    BlockAddress {
        dest: IrId,
        block: IrBlockId,
    },

    /// Inline assembly
    InlineAsm {
        dest: Option<IrId>,
        asm: String,
        inputs: Vec<IrId>,
    },
}

/// Binary operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    UDiv,
    URem,

    // Bitwise
    And,
    Or,
    Xor,
    Shl,
    Shr,
    UShr,

    // Floating point
    FAdd,
    FSub,
    FMul,
    FDiv,
}

impl BinaryOp {
    pub fn is_float(&self) -> bool {
        matches!(self, BinaryOp::FAdd | BinaryOp::FSub | BinaryOp::FMul | BinaryOp::FDiv)
    }
}

/// Unary operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    // Arithmetic
    Neg,

    // Bitwise
    Not,

    // Floating point
    FNeg,
}

/// Comparison operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    // Integer comparisons
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Unsigned comparisons
    ULt,
    ULe,
    UGt,
    UGe,

    // Floating point comparisons
    FEq,
    FNe,
    FLt,
    FLe,
    FGt,
    FGe,
}

impl CompareOp {
    /// Whether this predicate compares integers
    pub fn is_integer(&self) -> bool {
        !self.is_float()
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            CompareOp::FEq
                | CompareOp::FNe
                | CompareOp::FLt
                | CompareOp::FLe
                | CompareOp::FGt
                | CompareOp::FGe
        )
    }
}

impl IrInstruction {
    /// Get the destination register if this instruction produces a value
    pub fn dest(&self) -> Option<IrId> {
        match self {
            IrInstruction::Const { dest, .. }
            | IrInstruction::Copy { dest, .. }
            | IrInstruction::Load { dest, .. }
            | IrInstruction::BinOp { dest, .. }
            | IrInstruction::UnOp { dest, .. }
            | IrInstruction::Cmp { dest, .. }
            | IrInstruction::Select { dest, .. }
            | IrInstruction::Cast { dest, .. }
            | IrInstruction::Alloc { dest, .. }
            | IrInstruction::BlockAddress { dest, .. } => Some(*dest),

            IrInstruction::CallDirect { dest, .. } | IrInstruction::InlineAsm { dest, .. } => {
                *dest
            }

            IrInstruction::Store { .. } => None,
        }
    }

    /// Mutable access to the destination register
    pub fn dest_mut(&mut self) -> Option<&mut IrId> {
        match self {
            IrInstruction::Const { dest, .. }
            | IrInstruction::Copy { dest, .. }
            | IrInstruction::Load { dest, .. }
            | IrInstruction::BinOp { dest, .. }
            | IrInstruction::UnOp { dest, .. }
            | IrInstruction::Cmp { dest, .. }
            | IrInstruction::Select { dest, .. }
            | IrInstruction::Cast { dest, .. }
            | IrInstruction::Alloc { dest, .. }
            | IrInstruction::BlockAddress { dest, .. } => Some(dest),

            IrInstruction::CallDirect { dest, .. } | IrInstruction::InlineAsm { dest, .. } => {
                dest.as_mut()
            }

            IrInstruction::Store { .. } => None,
        }
    }

    /// Get all registers used by this instruction
    pub fn uses(&self) -> Vec<IrId> {
        match self {
            IrInstruction::Const { .. } | IrInstruction::BlockAddress { .. } => vec![],
            IrInstruction::Copy { src, .. } => vec![*src],
            IrInstruction::Load { ptr, .. } => vec![*ptr],
            IrInstruction::Store { ptr, value } => vec![*ptr, *value],
            IrInstruction::BinOp { left, right, .. } => vec![*left, *right],
            IrInstruction::UnOp { operand, .. } => vec![*operand],
            IrInstruction::Cmp { left, right, .. } => vec![*left, *right],
            IrInstruction::Select {
                condition,
                true_val,
                false_val,
                ..
            } => vec![*condition, *true_val, *false_val],
            IrInstruction::Cast { src, .. } => vec![*src],
            IrInstruction::Alloc { count, .. } => count.map(|c| vec![c]).unwrap_or_default(),
            IrInstruction::CallDirect { args, .. } => args.clone(),
            IrInstruction::InlineAsm { inputs, .. } => inputs.clone(),
        }
    }

    /// Visit every operand register mutably
    pub fn for_each_use_mut(&mut self, mut f: impl FnMut(&mut IrId)) {
        match self {
            IrInstruction::Const { .. } | IrInstruction::BlockAddress { .. } => {}
            IrInstruction::Copy { src, .. } | IrInstruction::Cast { src, .. } => f(src),
            IrInstruction::Load { ptr, .. } => f(ptr),
            IrInstruction::Store { ptr, value } => {
                f(ptr);
                f(value);
            }
            IrInstruction::BinOp { left, right, .. } | IrInstruction::Cmp { left, right, .. } => {
                f(left);
                f(right);
            }
            IrInstruction::UnOp { operand, .. } => f(operand),
            IrInstruction::Select {
                condition,
                true_val,
                false_val,
                ..
            } => {
                f(condition);
                f(true_val);
                f(false_val);
            }
            IrInstruction::Alloc { count, .. } => {
                if let Some(c) = count {
                    f(c);
                }
            }
            IrInstruction::CallDirect { args, .. } => args.iter_mut().for_each(f),
            IrInstruction::InlineAsm { inputs, .. } => inputs.iter_mut().for_each(f),
        }
    }

    /// Rewrite operands through `replacements`; registers without an entry are kept.
    pub fn replace_uses(&mut self, replacements: &FxHashMap<IrId, IrId>) {
        self.for_each_use_mut(|reg| {
            if let Some(&new_reg) = replacements.get(reg) {
                *reg = new_reg;
            }
        });
    }

    /// Check if this instruction has side effects
    pub fn has_side_effects(&self) -> bool {
        matches!(
            self,
            IrInstruction::Store { .. }
                | IrInstruction::CallDirect { .. }
                | IrInstruction::InlineAsm { .. }
        )
    }

    /// Whether cloning this instruction would change program meaning
    pub fn is_non_duplicatable(&self) -> bool {
        match self {
            IrInstruction::CallDirect { no_duplicate, .. } => *no_duplicate,
            IrInstruction::InlineAsm { .. } => true,
            _ => false,
        }
    }
}
