//! Loop shape recognition
//!
//! Decides whether a loop is a single-block counted loop of the form
//!
//! ```text
//! header:
//!     i    = phi [preheader: start, header: next]   ; or a load of a counter slot
//!     ...
//!     next = add i, 1
//!     c    = cmp ne next, upper                     ; eq when the exit is taken on true
//!     condbr c, header, exit
//! ```
//!
//! and records where every piece lives. Nothing here mutates the function.

use super::super::loop_analysis::{LoopNestInfo, NaturalLoop};
use super::super::{
    BinaryOp, CompareOp, IrBlockId, IrFunction, IrId, IrInstruction, IrTerminator, IrType,
};
use std::fmt;

/// Why a loop was left alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnrollRejection {
    /// No single outside predecessor that branches only to the header
    NoPreheader,
    /// The loop has more than one block, or its latch is not the header
    MultiBlockBody,
    /// The latch does not end in a conditional branch
    NotConditionalLatch,
    /// A `BlockAddress` names the header
    HeaderAddressTaken,
    /// The branch condition is not an integer comparison
    NotIntegerCompare,
    /// Both branch targets are the header
    NoExit,
    /// The predicate does not match the exit layout
    PredicateMismatch { op: CompareOp, latch_index: usize },
    /// The compared value is not an `Add`
    NotAnIncrement,
    /// The add does not step the loop's own counter
    UnknownCounter,
    /// The add does not step by the constant one
    NonUnitStep,
    /// The bound is redefined inside the loop
    VariantBound,
    /// The body holds an instruction that must not be copied
    NotDuplicatable,
    /// The body calls functions the inliner will expand
    InlineCandidates(usize),
    /// `size * count` exceeds the threshold and shrinking is disabled
    TooLarge { size: u32, count: u32, threshold: u32 },
    /// Shrinking to fit the threshold leaves a factor below two
    FactorTooSmall { factor: u32 },
    /// The configured count is below two
    InvalidCount(u32),
    /// The guard constant or a switch case would not fit the bound's type
    FactorExceedsBound { factor: u32, ty: IrType },
    /// Cloning needs phi demotion, which is disabled
    NeedsFlattening,
}

impl fmt::Display for UnrollRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnrollRejection::NoPreheader => write!(f, "loop has no preheader"),
            UnrollRejection::MultiBlockBody => write!(f, "loop is not a single block"),
            UnrollRejection::NotConditionalLatch => {
                write!(f, "loop is not terminated by a conditional branch")
            }
            UnrollRejection::HeaderAddressTaken => write!(f, "address of header block is taken"),
            UnrollRejection::NotIntegerCompare => {
                write!(f, "loop condition is not an integer comparison")
            }
            UnrollRejection::NoExit => write!(f, "loop branch never leaves the loop"),
            UnrollRejection::PredicateMismatch { op, latch_index } => write!(
                f,
                "predicate {:?} does not exit the loop (latch successor {})",
                op, latch_index
            ),
            UnrollRejection::NotAnIncrement => write!(f, "increment expression is not an add"),
            UnrollRejection::UnknownCounter => {
                write!(f, "increment does not step the loop counter")
            }
            UnrollRejection::NonUnitStep => write!(f, "increment constant is not one"),
            UnrollRejection::VariantBound => write!(f, "upper bound is not loop invariant"),
            UnrollRejection::NotDuplicatable => {
                write!(f, "loop contains non-duplicatable instructions")
            }
            UnrollRejection::InlineCandidates(n) => {
                write!(f, "loop contains {} inlinable call(s)", n)
            }
            UnrollRejection::TooLarge {
                size,
                count,
                threshold,
            } => write!(
                f,
                "too large to unroll: size {} x count {} > threshold {}",
                size, count, threshold
            ),
            UnrollRejection::FactorTooSmall { factor } => {
                write!(f, "could not unroll partially (factor {})", factor)
            }
            UnrollRejection::InvalidCount(count) => {
                write!(f, "unroll count {} is below two", count)
            }
            UnrollRejection::FactorExceedsBound { factor, ty } => {
                write!(f, "unroll factor {} does not fit loop bound type {}", factor, ty)
            }
            UnrollRejection::NeedsFlattening => {
                write!(f, "loop values cross blocks but phi demotion is disabled")
            }
        }
    }
}

/// Where the loop counter lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterForm {
    /// A header phi fed by the add along the back edge
    Phi,
    /// A slot the header loads from and stores the add back into
    Slot(IrId),
}

/// Counter value on loop entry, as seen at the end of the preheader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterStart {
    /// The integer constant zero
    Zero,
    /// A register available at the end of the preheader
    Value(IrId),
    /// Whatever the counter slot holds when the preheader ends
    Slot(IrId),
}

/// An accepted loop, with its roles resolved
#[derive(Debug, Clone, PartialEq)]
pub struct LoopShape {
    pub header: IrBlockId,
    pub preheader: IrBlockId,
    pub exit: IrBlockId,
    /// Successor index of the back edge in the latch terminator
    pub latch_index: usize,
    /// Successor index of the exit edge
    pub exit_index: usize,
    pub condition: IrId,
    pub predicate: CompareOp,
    pub increment: IrId,
    pub counter: IrId,
    pub counter_form: CounterForm,
    pub start: CounterStart,
    pub upper: IrId,
    pub bound_ty: IrType,
}

/// Run the shape checks in order and stop at the first failure.
pub fn analyze_loop(
    function: &IrFunction,
    natural_loop: &NaturalLoop,
) -> Result<LoopShape, UnrollRejection> {
    let header = natural_loop.header;

    let preheader = LoopNestInfo::find_preheader(&function.cfg, header, &natural_loop.blocks)
        .ok_or(UnrollRejection::NoPreheader)?;

    if natural_loop.blocks.len() != 1 || natural_loop.latch != Some(header) {
        return Err(UnrollRejection::MultiBlockBody);
    }

    let header_block = function
        .cfg
        .get_block(header)
        .ok_or(UnrollRejection::MultiBlockBody)?;
    let (condition, true_target, false_target) = match header_block.terminator {
        IrTerminator::CondBranch {
            condition,
            true_target,
            false_target,
        } => (condition, true_target, false_target),
        _ => return Err(UnrollRejection::NotConditionalLatch),
    };

    if header_address_taken(function, header) {
        return Err(UnrollRejection::HeaderAddressTaken);
    }

    let (predicate, compared, upper) = match function.find_def(condition) {
        Some((
            _,
            IrInstruction::Cmp {
                op, left, right, ..
            },
        )) if op.is_integer() => (*op, *left, *right),
        _ => return Err(UnrollRejection::NotIntegerCompare),
    };
    let bound_ty = match (function.reg_type(compared), function.reg_type(upper)) {
        (Some(l), Some(r)) if l.is_integer() && l == r => r.clone(),
        _ => return Err(UnrollRejection::NotIntegerCompare),
    };

    let (latch_index, exit_index) = match (true_target == header, false_target == header) {
        (true, true) => return Err(UnrollRejection::NoExit),
        (true, false) => (0, 1),
        _ => (1, 0),
    };
    let exit = if exit_index == 0 { true_target } else { false_target };

    let expected = if latch_index == 0 {
        CompareOp::Ne
    } else {
        CompareOp::Eq
    };
    if predicate != expected {
        return Err(UnrollRejection::PredicateMismatch {
            op: predicate,
            latch_index,
        });
    }

    let (counter, step) = match function.find_def(compared) {
        Some((def_block, IrInstruction::BinOp {
            op: BinaryOp::Add,
            left,
            right,
            ..
        })) if def_block == header => (*left, *right),
        _ => return Err(UnrollRejection::NotAnIncrement),
    };

    let (counter_form, start) = find_counter(function, header, preheader, counter, compared)
        .ok_or(UnrollRejection::UnknownCounter)?;

    match function.find_def(step) {
        Some((_, IrInstruction::Const { value, .. })) if value.is_int(1) => {}
        _ => return Err(UnrollRejection::NonUnitStep),
    }

    if !natural_loop.is_invariant(function, upper) {
        return Err(UnrollRejection::VariantBound);
    }

    Ok(LoopShape {
        header,
        preheader,
        exit,
        latch_index,
        exit_index,
        condition,
        predicate,
        increment: compared,
        counter,
        counter_form,
        start,
        upper,
        bound_ty,
    })
}

fn header_address_taken(function: &IrFunction, header: IrBlockId) -> bool {
    function.cfg.blocks.values().any(|block| {
        block.instructions.iter().any(|inst| {
            matches!(inst, IrInstruction::BlockAddress { block, .. } if *block == header)
        })
    })
}

/// Match the counter against the phi form, then the slot form.
fn find_counter(
    function: &IrFunction,
    header: IrBlockId,
    preheader: IrBlockId,
    counter: IrId,
    increment: IrId,
) -> Option<(CounterForm, CounterStart)> {
    let header_block = function.cfg.get_block(header)?;

    if let Some(phi) = header_block.phi_nodes.iter().find(|p| p.dest == counter) {
        if phi.incoming_from(header) != Some(increment) {
            return None;
        }
        let start = phi.incoming_from(preheader)?;
        let start = if is_zero_const(function, start) {
            CounterStart::Zero
        } else {
            CounterStart::Value(start)
        };
        return Some((CounterForm::Phi, start));
    }

    // The counter load must see the value from the previous iteration, and the
    // increment must be the value the slot holds when the header ends.
    let (load_at, slot) = header_block
        .instructions
        .iter()
        .enumerate()
        .find_map(|(at, inst)| match inst {
            IrInstruction::Load { dest, ptr, .. } if *dest == counter => Some((at, *ptr)),
            _ => None,
        })?;
    let mut stores = header_block
        .instructions
        .iter()
        .enumerate()
        .filter_map(|(at, inst)| match inst {
            IrInstruction::Store { ptr, value } if *ptr == slot => Some((at, *value)),
            _ => None,
        });
    let first_store = stores.next()?;
    let last_store = stores.last().unwrap_or(first_store);
    if first_store.0 < load_at || last_store.1 != increment {
        return None;
    }

    let preheader_store = function
        .cfg
        .get_block(preheader)?
        .instructions
        .iter()
        .rev()
        .find_map(|inst| match inst {
            IrInstruction::Store { ptr, value } if *ptr == slot => Some(*value),
            _ => None,
        });
    let start = match preheader_store {
        Some(value) if is_zero_const(function, value) => CounterStart::Zero,
        Some(value) => CounterStart::Value(value),
        None => CounterStart::Slot(slot),
    };
    Some((CounterForm::Slot(slot), start))
}

fn is_zero_const(function: &IrFunction, reg: IrId) -> bool {
    matches!(
        function.find_def(reg),
        Some((_, IrInstruction::Const { value, .. })) if value.is_int(0)
    )
}
