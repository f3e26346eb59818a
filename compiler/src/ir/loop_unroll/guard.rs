//! Remainder prologue
//!
//! The unrolled body runs `factor` iterations per trip around the back edge,
//! so the `trip % factor` leftover iterations run first, in a chain of header
//! copies selected by a switch:
//!
//! ```text
//! dispatch:  guard = urem trip, F          ; or `and trip, F-1`
//!            switch guard [1 => G1, 2 => G2, ...], default body_entry
//! G3: br G2     G2: br G1     G1: condbr c, body_entry, exit
//! body_entry: br header
//! ```
//!
//! `G1` keeps the loop's exit test so a trip count below the factor leaves
//! straight from the prologue.

use super::eligibility::{CounterStart, LoopShape};
use crate::ir::cloning::clone_basic_block;
use crate::ir::loop_analysis::LoopNestInfo;
use crate::ir::{BinaryOp, IrBlockId, IrFunction, IrId, IrInstruction, IrTerminator, IrValue};
use log::trace;

/// Blocks and values created by [`build_guard`]
#[derive(Debug, Clone, PartialEq)]
pub struct GuardInfo {
    /// The old preheader, now ending in the switch
    pub dispatch: IrBlockId,
    /// New preheader of the loop
    pub body_entry: IrBlockId,
    /// `trip % factor`
    pub guard: IrId,
    /// Prologue copies, `clones[i - 1]` is `G_i`
    pub clones: Vec<IrBlockId>,
}

/// Split `block` before its terminator. The new block takes the terminator,
/// `block` keeps its instructions and branches to the new block.
pub fn split_at_terminator(function: &mut IrFunction, block: IrBlockId) -> Option<IrBlockId> {
    let name = function.cfg.get_block(block)?.name();
    let tail = function.cfg.create_block_with_label(format!("{}.split", name));
    let terminator = std::mem::replace(
        &mut function.cfg.get_block_mut(block)?.terminator,
        IrTerminator::Branch { target: tail },
    );
    function.cfg.get_block_mut(tail)?.terminator = terminator;
    Some(tail)
}

fn append(function: &mut IrFunction, block: IrBlockId, inst: IrInstruction) {
    function
        .cfg
        .get_block_mut(block)
        .expect("loop-unroll: dispatch block disappeared")
        .add_instruction(inst);
}

fn emit_const(
    function: &mut IrFunction,
    block: IrBlockId,
    value: i64,
    shape: &LoopShape,
) -> IrId {
    let value = IrValue::from_int(value, &shape.bound_ty).unwrap_or_else(|| {
        panic!(
            "loop-unroll: bound type {} is not an integer",
            shape.bound_ty
        )
    });
    let dest = function.alloc_typed_reg(shape.bound_ty.clone());
    append(function, block, IrInstruction::Const { dest, value });
    dest
}

fn emit_binop(
    function: &mut IrFunction,
    block: IrBlockId,
    op: BinaryOp,
    left: IrId,
    right: IrId,
    shape: &LoopShape,
) -> IrId {
    let dest = function.alloc_typed_reg(shape.bound_ty.clone());
    append(
        function,
        block,
        IrInstruction::BinOp {
            dest,
            op,
            left,
            right,
        },
    );
    dest
}

/// Build the dispatch switch and the prologue chain for `factor`.
///
/// The guard copies and the new body entry join the parent loop (and its
/// ancestors) when the unrolled loop is nested; the loop's preheader becomes
/// the body entry.
pub fn build_guard(
    function: &mut IrFunction,
    loop_info: &mut LoopNestInfo,
    shape: &LoopShape,
    factor: u32,
    and_guard: bool,
) -> GuardInfo {
    match function.reg_type(shape.upper) {
        Some(ty) if ty.is_integer() => {}
        other => panic!(
            "loop-unroll: bound {} lost its integer type ({:?})",
            shape.upper, other
        ),
    }

    let dispatch = shape.preheader;
    let body_entry = split_at_terminator(function, dispatch)
        .expect("loop-unroll: preheader vanished before the split");

    let trip = match shape.start {
        CounterStart::Zero => shape.upper,
        CounterStart::Value(start) => {
            emit_binop(function, dispatch, BinaryOp::Sub, shape.upper, start, shape)
        }
        CounterStart::Slot(slot) => {
            let start = function.alloc_typed_reg(shape.bound_ty.clone());
            append(
                function,
                dispatch,
                IrInstruction::Load {
                    dest: start,
                    ptr: slot,
                    ty: shape.bound_ty.clone(),
                },
            );
            emit_binop(function, dispatch, BinaryOp::Sub, shape.upper, start, shape)
        }
    };

    let guard = if and_guard && factor.is_power_of_two() {
        let mask = emit_const(function, dispatch, i64::from(factor) - 1, shape);
        emit_binop(function, dispatch, BinaryOp::And, trip, mask, shape)
    } else {
        let modulus = emit_const(function, dispatch, i64::from(factor), shape);
        emit_binop(function, dispatch, BinaryOp::URem, trip, modulus, shape)
    };

    let mut clones = Vec::with_capacity(factor.saturating_sub(1) as usize);
    let mut next = body_entry;
    for i in 1..factor {
        let (clone, _) = clone_basic_block(function, shape.header, &format!(".lua.guard{}", i))
            .expect("loop-unroll: header vanished while cloning the prologue");
        let block = function
            .cfg
            .get_block_mut(clone)
            .expect("loop-unroll: fresh clone missing");
        if i == 1 {
            if !block.terminator.set_successor(shape.latch_index, body_entry) {
                panic!("loop-unroll: prologue clone {} lost its exit test", clone);
            }
        } else {
            block.terminator = IrTerminator::Branch { target: next };
        }
        next = clone;
        clones.push(clone);
    }

    let cases = clones
        .iter()
        .enumerate()
        .map(|(index, &block)| (index as i64 + 1, block))
        .collect();
    function
        .cfg
        .get_block_mut(dispatch)
        .expect("loop-unroll: dispatch block disappeared")
        .terminator = IrTerminator::Switch {
        value: guard,
        cases,
        default: body_entry,
    };

    let parent = loop_info.loops.get(&shape.header).and_then(|l| l.parent);
    if let Some(parent) = parent {
        loop_info.add_block_to_loop(parent, body_entry);
        for &clone in &clones {
            loop_info.add_block_to_loop(parent, clone);
        }
    }
    if let Some(natural_loop) = loop_info.loops.get_mut(&shape.header) {
        natural_loop.preheader = Some(body_entry);
    }

    function.cfg.recompute_predecessors();
    trace!(
        "LUA: guard {} in {} dispatches to {} prologue block(s)",
        guard,
        dispatch,
        clones.len()
    );

    GuardInfo {
        dispatch,
        body_entry,
        guard,
        clones,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::loop_unroll::eligibility::analyze_loop;
    use crate::ir::loop_unroll::samples::{sum_loop, SumLoopOptions, SUM_FUNCTION};
    use crate::ir::reg2mem::flatten_function_phis;

    fn prepared(options: SumLoopOptions) -> (IrFunction, LoopNestInfo, LoopShape) {
        let module = sum_loop(&options);
        let id = module.get_function_by_name(SUM_FUNCTION).unwrap();
        let mut function = module.functions[&id].clone();
        let info = LoopNestInfo::compute(&function);
        let header = info.loops_innermost_first()[0];
        let shape = analyze_loop(&function, &info.loops[&header]).unwrap();
        flatten_function_phis(&mut function);
        (function, info, shape)
    }

    #[test]
    fn test_urem_guard_and_chain() {
        let (mut function, mut info, shape) = prepared(SumLoopOptions::default());
        let guard = build_guard(&mut function, &mut info, &shape, 4, false);

        assert_eq!(guard.clones.len(), 3);
        let dispatch = function.cfg.get_block(guard.dispatch).unwrap();
        match &dispatch.terminator {
            IrTerminator::Switch { value, cases, default } => {
                assert_eq!(*value, guard.guard);
                assert_eq!(*default, guard.body_entry);
                let targets: Vec<(i64, IrBlockId)> = cases.clone();
                assert_eq!(
                    targets,
                    vec![(1, guard.clones[0]), (2, guard.clones[1]), (3, guard.clones[2])]
                );
            }
            other => panic!("expected switch, got {:?}", other),
        }
        assert!(dispatch.instructions.iter().any(|inst| matches!(
            inst,
            IrInstruction::BinOp { op: BinaryOp::URem, dest, .. } if *dest == guard.guard
        )));

        // G3 -> G2 -> G1 -> {body_entry, exit}
        let g3 = function.cfg.get_block(guard.clones[2]).unwrap();
        assert_eq!(g3.successors().as_slice(), &[guard.clones[1]]);
        let g1 = function.cfg.get_block(guard.clones[0]).unwrap();
        assert_eq!(g1.successors().as_slice(), &[guard.body_entry, shape.exit]);
        assert_eq!(g1.metadata.cloned_from, Some(shape.header));

        let entry = function.cfg.get_block(guard.body_entry).unwrap();
        assert_eq!(entry.successors().as_slice(), &[shape.header]);
        assert_eq!(info.loops[&shape.header].preheader, Some(guard.body_entry));
    }

    #[test]
    fn test_and_guard_needs_power_of_two() {
        let (mut function, mut info, shape) = prepared(SumLoopOptions::default());
        let guard = build_guard(&mut function, &mut info, &shape, 4, true);
        let dispatch = function.cfg.get_block(guard.dispatch).unwrap();
        assert!(dispatch.instructions.iter().any(|inst| matches!(
            inst,
            IrInstruction::BinOp { op: BinaryOp::And, dest, .. } if *dest == guard.guard
        )));

        let (mut function, mut info, shape) = prepared(SumLoopOptions::default());
        let guard = build_guard(&mut function, &mut info, &shape, 3, true);
        let dispatch = function.cfg.get_block(guard.dispatch).unwrap();
        assert!(dispatch.instructions.iter().any(|inst| matches!(
            inst,
            IrInstruction::BinOp { op: BinaryOp::URem, .. }
        )));
    }

    #[test]
    fn test_nonzero_start_subtracts() {
        let (mut function, mut info, shape) = prepared(SumLoopOptions {
            start: 2,
            ..SumLoopOptions::default()
        });
        assert!(matches!(shape.start, CounterStart::Value(_)));
        let guard = build_guard(&mut function, &mut info, &shape, 2, false);
        let dispatch = function.cfg.get_block(guard.dispatch).unwrap();
        assert!(dispatch.instructions.iter().any(|inst| matches!(
            inst,
            IrInstruction::BinOp { op: BinaryOp::Sub, left, .. } if *left == shape.upper
        )));
    }
}
