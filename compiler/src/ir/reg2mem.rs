//! Register-to-memory demotion
//!
//! Moves SSA values into stack slots so that a transformation can duplicate
//! and rewire blocks without maintaining phi nodes by hand. The slots are
//! `Alloc` instructions at the top of the entry block; [`super::mem2reg`]
//! turns them back into SSA afterwards.

use super::{IrBlockId, IrFunction, IrId, IrInstruction, IrType};
use fxhash::FxHashMap;
use log::trace;

/// Insert a new slot of type `ty` after the leading allocs of the entry block.
fn insert_entry_alloc(function: &mut IrFunction, ty: IrType) -> Option<IrId> {
    let slot = function.alloc_typed_reg(ty.clone().ptr_to());
    let entry = function.entry_block();
    let block = function.cfg.get_block_mut(entry)?;
    let position = block
        .instructions
        .iter()
        .take_while(|inst| matches!(inst, IrInstruction::Alloc { .. }))
        .count();
    block
        .instructions
        .insert(position, IrInstruction::Alloc { dest: slot, ty, count: None });
    Some(slot)
}

/// Append `inst` to the end of `block` (just before its terminator).
fn append_before_terminator(function: &mut IrFunction, block: IrBlockId, inst: IrInstruction) -> Option<()> {
    function.cfg.get_block_mut(block).map(|b| b.add_instruction(inst))
}

/// Replace the phi defining `phi_dest` in `block` with a stack slot.
///
/// Each incoming predecessor stores its value into the slot right before its
/// terminator, and the phi becomes a `Load` with the same destination register
/// at the top of the block, so existing uses stay valid. Returns the slot.
pub fn demote_phi_to_slot(function: &mut IrFunction, block: IrBlockId, phi_dest: IrId) -> Option<IrId> {
    let phi = {
        let b = function.cfg.get_block_mut(block)?;
        let index = b.phi_nodes.iter().position(|p| p.dest == phi_dest)?;
        b.phi_nodes.remove(index)
    };

    let slot = insert_entry_alloc(function, phi.ty.clone())?;

    let mut stored_from: Vec<IrBlockId> = Vec::with_capacity(phi.incoming.len());
    for &(pred, value) in &phi.incoming {
        if stored_from.contains(&pred) {
            continue;
        }
        stored_from.push(pred);
        append_before_terminator(function, pred, IrInstruction::Store { ptr: slot, value })?;
    }

    function.cfg.get_block_mut(block)?.instructions.insert(
        0,
        IrInstruction::Load {
            dest: phi.dest,
            ptr: slot,
            ty: phi.ty,
        },
    );

    trace!("LUA: demoted phi {} in {} to slot {}", phi_dest, block, slot);
    Some(slot)
}

/// Demote an instruction-defined value used outside its block to a stack slot.
///
/// A `Store` follows the definition; every use in another block reads the
/// value through a fresh `Load` placed right before it (phi operands load at
/// the end of the incoming predecessor). Returns `None` when `reg` is not
/// defined by an instruction or its type is unknown.
pub fn demote_value_to_slot(function: &mut IrFunction, reg: IrId) -> Option<IrId> {
    let ty = function.reg_type(reg)?.clone();
    let (def_block, _) = function.find_def(reg)?;

    let slot = insert_entry_alloc(function, ty.clone())?;

    {
        let b = function.cfg.get_block_mut(def_block)?;
        let def_index = b.instructions.iter().position(|inst| inst.dest() == Some(reg))?;
        b.instructions
            .insert(def_index + 1, IrInstruction::Store { ptr: slot, value: reg });
    }

    let block_ids = function.cfg.block_ids();

    // Phi operands: load at the end of the incoming predecessor
    let mut phi_loads: Vec<(IrBlockId, usize, usize, IrBlockId)> = Vec::new();
    for &block_id in &block_ids {
        if block_id == def_block {
            continue;
        }
        let Some(block) = function.cfg.get_block(block_id) else {
            continue;
        };
        for (phi_index, phi) in block.phi_nodes.iter().enumerate() {
            for (edge_index, &(pred, value)) in phi.incoming.iter().enumerate() {
                if value == reg {
                    phi_loads.push((block_id, phi_index, edge_index, pred));
                }
            }
        }
    }
    for (block_id, phi_index, edge_index, pred) in phi_loads {
        let loaded = function.alloc_typed_reg(ty.clone());
        append_before_terminator(
            function,
            pred,
            IrInstruction::Load { dest: loaded, ptr: slot, ty: ty.clone() },
        )?;
        let phi = function
            .cfg
            .get_block_mut(block_id)?
            .phi_nodes
            .get_mut(phi_index)?;
        phi.incoming[edge_index].1 = loaded;
    }

    // Ordinary uses: load right before each user
    for &block_id in &block_ids {
        if block_id == def_block {
            continue;
        }
        let uses_in_block = function.cfg.get_block(block_id).map_or(false, |b| {
            b.instructions.iter().any(|inst| inst.uses().contains(&reg))
                || b.terminator.uses().contains(&reg)
        });
        if !uses_in_block {
            continue;
        }

        let old = std::mem::take(&mut function.cfg.get_block_mut(block_id)?.instructions);
        let mut rewritten = Vec::with_capacity(old.len() + 1);
        for mut inst in old {
            if inst.uses().contains(&reg) {
                let loaded = function.alloc_typed_reg(ty.clone());
                rewritten.push(IrInstruction::Load { dest: loaded, ptr: slot, ty: ty.clone() });
                inst.replace_uses(&single(reg, loaded));
            }
            rewritten.push(inst);
        }

        let term_uses = function
            .cfg
            .get_block(block_id)
            .map_or(false, |b| b.terminator.uses().contains(&reg));
        let term_load = if term_uses {
            let loaded = function.alloc_typed_reg(ty.clone());
            rewritten.push(IrInstruction::Load { dest: loaded, ptr: slot, ty: ty.clone() });
            Some(loaded)
        } else {
            None
        };

        let block = function.cfg.get_block_mut(block_id)?;
        block.instructions = rewritten;
        if let Some(loaded) = term_load {
            block.terminator.replace_uses(&single(reg, loaded));
        }
    }

    trace!("LUA: demoted {} defined in {} to slot {}", reg, def_block, slot);
    Some(slot)
}

fn single(from: IrId, to: IrId) -> FxHashMap<IrId, IrId> {
    let mut map = FxHashMap::default();
    map.insert(from, to);
    map
}

/// Registers defined in `block` that are read anywhere outside it.
pub fn values_used_outside(function: &IrFunction, block: IrBlockId) -> Vec<IrId> {
    let Some(b) = function.cfg.get_block(block) else {
        return Vec::new();
    };
    let defined: Vec<IrId> = b
        .phi_nodes
        .iter()
        .map(|p| p.dest)
        .chain(b.instructions.iter().filter_map(|i| i.dest()))
        .collect();

    defined
        .into_iter()
        .filter(|&reg| {
            function.cfg.blocks.values().any(|other| {
                other.id != block
                    && (other.phi_nodes.iter().any(|p| p.incoming.iter().any(|(_, v)| *v == reg))
                        || other.instructions.iter().any(|i| i.uses().contains(&reg))
                        || other.terminator.uses().contains(&reg))
            })
        })
        .collect()
}

/// Demote every phi of the function to a slot. Returns the slots in creation order.
pub fn flatten_function_phis(function: &mut IrFunction) -> Vec<IrId> {
    let phis: Vec<(IrBlockId, IrId)> = function
        .cfg
        .blocks
        .values()
        .flat_map(|b| b.phi_nodes.iter().map(move |p| (b.id, p.dest)))
        .collect();

    phis.into_iter()
        .filter_map(|(block, dest)| demote_phi_to_slot(function, block, dest))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::validation::validate_function;
    use crate::ir::{CompareOp, FunctionSignatureBuilder, IrBuilder};

    /// entry -> header(phi i) -> exit, exit reads the header's `next`
    fn counting_loop() -> (IrFunction, IrBlockId, IrBlockId, IrId, IrId) {
        let mut builder = IrBuilder::new("test");
        let sig = FunctionSignatureBuilder::new()
            .param("n", IrType::I64)
            .returns(IrType::I64)
            .build();
        builder.start_function("count", sig);
        let n = builder.param(0).unwrap();
        let header = builder.create_block().unwrap();
        let exit = builder.create_block().unwrap();
        let zero = builder.build_int(0, IrType::I64).unwrap();
        let one = builder.build_int(1, IrType::I64).unwrap();
        builder.build_branch(header);

        builder.switch_to_block(header);
        let i = builder.build_phi(header, IrType::I64).unwrap();
        let next = builder.build_add(i, one, false).unwrap();
        let cond = builder.build_cmp(CompareOp::Ne, next, n).unwrap();
        builder.add_phi_incoming(header, i, IrBlockId::entry(), zero);
        builder.add_phi_incoming(header, i, header, next);
        builder.build_cond_branch(cond, header, exit);

        builder.switch_to_block(exit);
        let doubled = builder.build_add(next, next, false).unwrap();
        builder.build_return(Some(doubled));
        builder.finish_function();
        let function = builder.module.functions.values().next().unwrap().clone();
        (function, header, exit, i, next)
    }

    #[test]
    fn test_demote_phi_keeps_register() {
        let (mut function, header, _, i, next) = counting_loop();
        let slot = demote_phi_to_slot(&mut function, header, i).unwrap();

        let header_block = function.cfg.get_block(header).unwrap();
        assert!(header_block.phi_nodes.is_empty());
        assert!(matches!(
            header_block.instructions[0],
            IrInstruction::Load { dest, ptr, .. } if dest == i && ptr == slot
        ));
        assert!(matches!(
            header_block.instructions.last(),
            Some(IrInstruction::Store { ptr, value }) if *ptr == slot && *value == next
        ));

        let entry = function.cfg.get_block(function.entry_block()).unwrap();
        assert!(matches!(entry.instructions[0], IrInstruction::Alloc { dest, .. } if dest == slot));
        assert_eq!(function.reg_type(slot), Some(&IrType::I64.ptr_to()));
        assert!(validate_function(&function).is_ok());
    }

    #[test]
    fn test_demote_escaping_value() {
        let (mut function, header, exit, _, next) = counting_loop();
        assert_eq!(values_used_outside(&function, header), vec![next]);

        let slot = demote_value_to_slot(&mut function, next).unwrap();
        let exit_block = function.cfg.get_block(exit).unwrap();
        // Both operands of the add are one instruction, so one load serves both
        assert!(matches!(exit_block.instructions[0], IrInstruction::Load { ptr, .. } if ptr == slot));
        assert!(!exit_block.instructions[1].uses().contains(&next));
        assert!(values_used_outside(&function, header).is_empty());
        assert!(validate_function(&function).is_ok());
    }

    #[test]
    fn test_flatten_function_phis() {
        let (mut function, ..) = counting_loop();
        let slots = flatten_function_phis(&mut function);
        assert_eq!(slots.len(), 1);
        assert_eq!(function.compute_stats().phi_count, 0);
        assert!(flatten_function_phis(&mut function).is_empty());
    }
}
