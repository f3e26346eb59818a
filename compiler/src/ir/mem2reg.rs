//! Memory-to-register promotion
//!
//! Rebuilds SSA form for stack slots that are only ever loaded and stored
//! through. This is the classic construction: phi nodes are placed at the
//! iterated dominance frontier of the blocks that store to a slot (pruned to
//! blocks where the slot is live on entry), then a walk over the dominator tree
//! renames every load to the value reaching it.

use super::loop_analysis::DominatorTree;
use super::{IrBlockId, IrFunction, IrId, IrInstruction, IrPhiNode, IrType, IrValue};
use fxhash::{FxHashMap, FxHashSet};
use indexmap::IndexSet;
use log::{debug, trace};

/// Whether `slot` can be rewritten into SSA registers.
///
/// The slot must be a single-element `Alloc` in the entry block, and every use
/// of it must be a `Load` of the allocated type or a `Store` through it (never
/// storing the slot's address itself).
pub fn is_slot_promotable(function: &IrFunction, slot: IrId) -> bool {
    let Some(entry) = function.cfg.get_block(function.entry_block()) else {
        return false;
    };
    let slot_ty = entry.instructions.iter().find_map(|inst| match inst {
        IrInstruction::Alloc { dest, ty, count: None } if *dest == slot => Some(ty),
        _ => None,
    });
    let Some(slot_ty) = slot_ty else {
        return false;
    };

    for block in function.cfg.blocks.values() {
        if block
            .phi_nodes
            .iter()
            .any(|phi| phi.incoming.iter().any(|(_, v)| *v == slot))
        {
            return false;
        }
        if block.terminator.uses().contains(&slot) {
            return false;
        }
        for inst in &block.instructions {
            match inst {
                IrInstruction::Load { ptr, ty, .. } if *ptr == slot => {
                    if ty != slot_ty {
                        return false;
                    }
                }
                IrInstruction::Store { ptr, value } if *ptr == slot => {
                    if *value == slot {
                        return false;
                    }
                }
                IrInstruction::Alloc { dest, .. } if *dest == slot => {}
                other => {
                    if other.uses().contains(&slot) {
                        return false;
                    }
                }
            }
        }
    }

    true
}

/// Every promotable slot allocated in the entry block, in layout order.
pub fn promotable_slots(function: &IrFunction) -> Vec<IrId> {
    let Some(entry) = function.cfg.get_block(function.entry_block()) else {
        return Vec::new();
    };
    entry
        .instructions
        .iter()
        .filter_map(|inst| match inst {
            IrInstruction::Alloc { dest, .. } => Some(*dest),
            _ => None,
        })
        .filter(|&slot| is_slot_promotable(function, slot))
        .collect()
}

/// Per-slot facts gathered before placing phis
#[derive(Debug)]
struct SlotInfo {
    ty: IrType,
    /// Blocks containing a store to the slot
    def_blocks: IndexSet<IrBlockId>,
    /// Blocks where the slot's value is read before any store
    live_in: FxHashSet<IrBlockId>,
}

/// Promote the given slots to SSA registers. Slots that are not promotable
/// are skipped. Returns the number of slots promoted.
pub fn promote_slots(function: &mut IrFunction, slots: &[IrId]) -> usize {
    let slots: Vec<IrId> = slots
        .iter()
        .copied()
        .filter(|&slot| is_slot_promotable(function, slot))
        .collect();
    if slots.is_empty() {
        return 0;
    }

    let domtree = DominatorTree::compute(function);
    let frontiers = domtree.dominance_frontiers();
    let slot_index: FxHashMap<IrId, usize> =
        slots.iter().enumerate().map(|(i, &s)| (s, i)).collect();

    let infos: Vec<SlotInfo> = slots
        .iter()
        .map(|&slot| collect_slot_info(function, &domtree, slot))
        .collect();

    // Place pruned phis
    let mut phi_for: FxHashMap<(IrBlockId, usize), IrId> = FxHashMap::default();
    let mut phi_blocks: Vec<(IrBlockId, usize)> = Vec::new();
    for (index, info) in infos.iter().enumerate() {
        let idf = domtree.iterated_frontier(&frontiers, info.def_blocks.iter().copied());
        for block in idf {
            if !info.live_in.contains(&block) {
                continue;
            }
            let dest = function.alloc_typed_reg(info.ty.clone());
            phi_for.insert((block, index), dest);
            phi_blocks.push((block, index));
        }
    }

    // Rename along the dominator tree
    let mut replacements: FxHashMap<IrId, Option<IrId>> = FxHashMap::default();
    let mut load_types: FxHashMap<IrId, IrType> = FxHashMap::default();
    let mut incoming: FxHashMap<IrId, Vec<(IrBlockId, Option<IrId>)>> = FxHashMap::default();
    let mut stack: Vec<(IrBlockId, Vec<Option<IrId>>)> =
        vec![(domtree.entry(), vec![None; infos.len()])];

    while let Some((block_id, mut values)) = stack.pop() {
        let Some(block) = function.cfg.get_block(block_id) else {
            continue;
        };

        for index in 0..infos.len() {
            if let Some(&phi) = phi_for.get(&(block_id, index)) {
                values[index] = Some(phi);
            }
        }

        for inst in &block.instructions {
            match inst {
                IrInstruction::Load { dest, ptr, ty } => {
                    if let Some(&index) = slot_index.get(ptr) {
                        replacements.insert(*dest, values[index]);
                        load_types.insert(*dest, ty.clone());
                    }
                }
                IrInstruction::Store { ptr, value } => {
                    if let Some(&index) = slot_index.get(ptr) {
                        values[index] = Some(*value);
                    }
                }
                _ => {}
            }
        }

        let mut seen = FxHashSet::default();
        for succ in block.successors() {
            if !seen.insert(succ) {
                continue;
            }
            for index in 0..infos.len() {
                if let Some(&phi) = phi_for.get(&(succ, index)) {
                    incoming.entry(phi).or_default().push((block_id, values[index]));
                }
            }
        }

        for &child in domtree.children(block_id).iter().rev() {
            stack.push((child, values.clone()));
        }
    }

    // Loads in unreachable blocks never see a store
    for block in function.cfg.blocks.values() {
        if domtree.is_reachable(block.id) {
            continue;
        }
        for inst in &block.instructions {
            if let IrInstruction::Load { dest, ptr, ty } = inst {
                if slot_index.contains_key(ptr) {
                    replacements.insert(*dest, None);
                    load_types.insert(*dest, ty.clone());
                }
            }
        }
    }

    // Resolve values, materializing undef per type on demand
    let mut undefs: FxHashMap<IrType, IrId> = FxHashMap::default();
    let mut resolved: FxHashMap<IrId, IrId> = FxHashMap::default();
    let load_regs: Vec<IrId> = replacements.keys().copied().collect();
    for reg in load_regs {
        let ty = load_types.get(&reg).cloned().unwrap_or(IrType::Void);
        let value = resolve(reg, &replacements, &mut FxHashSet::default());
        let value = match value {
            Some(v) => v,
            None => undef_of(function, &mut undefs, ty),
        };
        resolved.insert(reg, value);
    }

    // Build the phi nodes
    let preds = function.cfg.predecessor_map();
    for &(block_id, index) in &phi_blocks {
        let Some(&dest) = phi_for.get(&(block_id, index)) else {
            continue;
        };
        let ty = infos[index].ty.clone();
        let mut edges: Vec<(IrBlockId, IrId)> = Vec::new();
        for (pred, value) in incoming.remove(&dest).unwrap_or_default() {
            let value = match value.and_then(|v| resolve_chain(v, &replacements, &resolved)) {
                Some(v) => v,
                None => undef_of(function, &mut undefs, ty.clone()),
            };
            edges.push((pred, value));
        }
        for &pred in preds.get(&block_id).map(|p| p.as_slice()).unwrap_or(&[]) {
            if !edges.iter().any(|(p, _)| *p == pred) {
                let undef = undef_of(function, &mut undefs, ty.clone());
                edges.push((pred, undef));
            }
        }
        if let Some(block) = function.cfg.get_block_mut(block_id) {
            block.add_phi(IrPhiNode { dest, incoming: edges, ty });
        }
    }

    // Rewrite uses and drop the memory traffic
    let promoted: FxHashSet<IrId> = slots.iter().copied().collect();
    for block in function.cfg.blocks.values_mut() {
        block.instructions.retain(|inst| match inst {
            IrInstruction::Load { ptr, .. } | IrInstruction::Store { ptr, .. } => {
                !promoted.contains(ptr)
            }
            IrInstruction::Alloc { dest, .. } => !promoted.contains(dest),
            _ => true,
        });
        for inst in &mut block.instructions {
            inst.replace_uses(&resolved);
        }
        for phi in &mut block.phi_nodes {
            for (_, value) in &mut phi.incoming {
                if let Some(&new_value) = resolved.get(value) {
                    *value = new_value;
                }
            }
        }
        block.terminator.replace_uses(&resolved);
    }
    function.cfg.recompute_predecessors();

    debug!(
        "LUA: promoted {} slot(s), placed {} phi(s) in {}",
        slots.len(),
        phi_blocks.len(),
        function.name
    );
    slots.len()
}

/// Gather store blocks and live-in blocks for one slot.
fn collect_slot_info(function: &IrFunction, domtree: &DominatorTree, slot: IrId) -> SlotInfo {
    let mut ty = IrType::Void;
    let mut def_blocks = IndexSet::new();
    let mut upward_exposed: Vec<IrBlockId> = Vec::new();

    for block in function.cfg.blocks.values() {
        if !domtree.is_reachable(block.id) {
            continue;
        }
        let mut stored = false;
        for inst in &block.instructions {
            match inst {
                IrInstruction::Alloc { dest, ty: alloc_ty, .. } if *dest == slot => {
                    ty = alloc_ty.clone();
                }
                IrInstruction::Store { ptr, .. } if *ptr == slot => {
                    stored = true;
                    def_blocks.insert(block.id);
                }
                IrInstruction::Load { ptr, .. } if *ptr == slot && !stored => {
                    if !upward_exposed.contains(&block.id) {
                        upward_exposed.push(block.id);
                    }
                }
                _ => {}
            }
        }
    }

    // Propagate liveness backwards until a storing block kills it
    let mut live_in: FxHashSet<IrBlockId> = FxHashSet::default();
    let mut worklist = upward_exposed;
    while let Some(block) = worklist.pop() {
        if !live_in.insert(block) {
            continue;
        }
        for &pred in domtree.predecessors(block) {
            if domtree.is_reachable(pred) && !def_blocks.contains(&pred) {
                worklist.push(pred);
            }
        }
    }

    trace!(
        "LUA: slot {} stored in {} block(s), live into {}",
        slot,
        def_blocks.len(),
        live_in.len()
    );

    SlotInfo {
        ty,
        def_blocks,
        live_in,
    }
}

/// Follow load-replaced-by-load chains to a final value (`None` = undef).
fn resolve(
    reg: IrId,
    replacements: &FxHashMap<IrId, Option<IrId>>,
    visiting: &mut FxHashSet<IrId>,
) -> Option<IrId> {
    let mut current = reg;
    loop {
        match replacements.get(&current) {
            Some(Some(next)) => {
                if !visiting.insert(current) {
                    return None;
                }
                current = *next;
            }
            Some(None) => return None,
            None => return Some(current),
        }
    }
}

fn resolve_chain(
    value: IrId,
    replacements: &FxHashMap<IrId, Option<IrId>>,
    resolved: &FxHashMap<IrId, IrId>,
) -> Option<IrId> {
    if let Some(&r) = resolved.get(&value) {
        return Some(r);
    }
    resolve(value, replacements, &mut FxHashSet::default())
}

/// The undef constant of `ty`, created at the top of the entry block on first use.
fn undef_of(function: &mut IrFunction, undefs: &mut FxHashMap<IrType, IrId>, ty: IrType) -> IrId {
    if let Some(&reg) = undefs.get(&ty) {
        return reg;
    }
    let reg = function.alloc_typed_reg(ty.clone());
    let entry = function.entry_block();
    if let Some(block) = function.cfg.get_block_mut(entry) {
        block.instructions.insert(
            0,
            IrInstruction::Const {
                dest: reg,
                value: IrValue::Undef,
            },
        );
    }
    undefs.insert(ty, reg);
    reg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::reg2mem::{demote_value_to_slot, flatten_function_phis};
    use crate::ir::validation::validate_function;
    use crate::ir::{CompareOp, FunctionSignatureBuilder, IrBuilder, IrTerminator};

    /// Diamond writing a slot on both arms and reading it at the join.
    fn diamond_with_slot() -> (IrFunction, IrId, IrBlockId) {
        let mut builder = IrBuilder::new("test");
        let sig = FunctionSignatureBuilder::new()
            .param("c", IrType::Bool)
            .returns(IrType::I64)
            .build();
        builder.start_function("pick", sig);
        let c = builder.param(0).unwrap();
        let slot = builder.build_alloc(IrType::I64, None).unwrap();
        let left = builder.create_block().unwrap();
        let right = builder.create_block().unwrap();
        let join = builder.create_block().unwrap();
        builder.build_cond_branch(c, left, right);

        builder.switch_to_block(left);
        let one = builder.build_int(1, IrType::I64).unwrap();
        builder.build_store(slot, one);
        builder.build_branch(join);

        builder.switch_to_block(right);
        let two = builder.build_int(2, IrType::I64).unwrap();
        builder.build_store(slot, two);
        builder.build_branch(join);

        builder.switch_to_block(join);
        let v = builder.build_load(slot, IrType::I64).unwrap();
        builder.build_return(Some(v));
        builder.finish_function();

        let function = builder.module.functions.values().next().unwrap().clone();
        (function, slot, join)
    }

    #[test]
    fn test_promote_diamond_places_phi() {
        let (mut function, slot, join) = diamond_with_slot();
        assert_eq!(promotable_slots(&function), vec![slot]);

        assert_eq!(promote_slots(&mut function, &[slot]), 1);
        let join_block = function.cfg.get_block(join).unwrap();
        assert_eq!(join_block.phi_nodes.len(), 1);
        assert_eq!(join_block.phi_nodes[0].incoming.len(), 2);
        assert!(join_block.instructions.is_empty());
        assert!(matches!(
            join_block.terminator,
            IrTerminator::Return { value: Some(v) } if v == join_block.phi_nodes[0].dest
        ));
        assert!(promotable_slots(&function).is_empty());
        assert!(validate_function(&function).is_ok());
    }

    #[test]
    fn test_escaping_address_is_not_promotable() {
        let (mut function, slot, join) = diamond_with_slot();
        let other = function.alloc_typed_reg(IrType::I64.ptr_to().ptr_to());
        function.cfg.get_block_mut(join).unwrap().instructions.insert(
            0,
            IrInstruction::Store { ptr: other, value: slot },
        );
        assert!(!is_slot_promotable(&function, slot));
        assert_eq!(promote_slots(&mut function, &[slot]), 0);
    }

    #[test]
    fn test_load_before_store_reads_undef() {
        let mut builder = IrBuilder::new("test");
        let sig = FunctionSignatureBuilder::new().returns(IrType::I64).build();
        builder.start_function("uninit", sig);
        let slot = builder.build_alloc(IrType::I64, None).unwrap();
        let v = builder.build_load(slot, IrType::I64).unwrap();
        builder.build_return(Some(v));
        builder.finish_function();
        let mut function = builder.module.functions.values().next().unwrap().clone();

        assert_eq!(promote_slots(&mut function, &[slot]), 1);
        let entry = function.cfg.get_block(function.entry_block()).unwrap();
        assert!(matches!(
            entry.instructions[0],
            IrInstruction::Const { value: IrValue::Undef, .. }
        ));
        assert_eq!(entry.instructions.len(), 1);
    }

    #[test]
    fn test_round_trip_restores_loop_phis() {
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
        let out = builder.build_add(next, one, false).unwrap();
        builder.build_return(Some(out));
        builder.finish_function();
        let mut function = builder.module.functions.values().next().unwrap().clone();

        let mut slots = flatten_function_phis(&mut function);
        slots.extend(demote_value_to_slot(&mut function, next));
        assert_eq!(slots.len(), 2);

        assert_eq!(promote_slots(&mut function, &slots), 2);
        let stats = function.compute_stats();
        // The loop phi comes back; the exit reads `next` directly again
        assert_eq!(function.cfg.get_block(header).unwrap().phi_nodes.len(), 1);
        assert!(function.cfg.get_block(exit).unwrap().phi_nodes.is_empty());
        assert_eq!(stats.phi_count, 1);
        assert!(function.cfg.blocks.values().all(|b| b
            .instructions
            .iter()
            .all(|inst| !matches!(inst, IrInstruction::Alloc { .. }))));
        assert!(validate_function(&function).is_ok());
    }
}
