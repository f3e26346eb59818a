//! Basic block cloning
//!
//! Duplicates a block inside its own function. Every definition in the copy
//! gets a fresh register of the same type; operands that named a definition of
//! the source block are rewritten through the clone's value map, everything
//! else keeps pointing at the original values.

use super::{IrBasicBlock, IrBlockId, IrFunction, IrId};
use fxhash::FxHashMap;

/// Old register -> register defined by the clone
pub type ValueMap = FxHashMap<IrId, IrId>;

/// Clone `source` into a new block appended at the end of the function.
///
/// The new block is labelled `<source name><suffix>`, records the source in
/// `metadata.cloned_from`, and starts with no cached predecessors. Phi nodes are
/// copied with fresh destinations but unchanged incoming edges; callers that
/// rewire the copy must fix them up.
pub fn clone_basic_block(
    function: &mut IrFunction,
    source: IrBlockId,
    suffix: &str,
) -> Option<(IrBlockId, ValueMap)> {
    let original = function.cfg.get_block(source)?.clone();

    let mut value_map = ValueMap::default();
    let defs = original
        .phi_nodes
        .iter()
        .map(|phi| phi.dest)
        .chain(original.instructions.iter().filter_map(|inst| inst.dest()));
    let defs: Vec<IrId> = defs.collect();
    for old in defs {
        let new = match function.reg_type(old).cloned() {
            Some(ty) => function.alloc_typed_reg(ty),
            None => function.alloc_reg(),
        };
        value_map.insert(old, new);
    }

    let new_id = function.cfg.create_block();
    let mut copy = IrBasicBlock::new(new_id);
    copy.label = Some(format!("{}{}", original.name(), suffix));
    copy.metadata.cloned_from = Some(source);
    copy.phi_nodes = original.phi_nodes;
    copy.instructions = original.instructions;
    copy.terminator = original.terminator;

    for phi in &mut copy.phi_nodes {
        if let Some(&dest) = value_map.get(&phi.dest) {
            phi.dest = dest;
        }
    }
    for inst in &mut copy.instructions {
        if let Some(dest) = inst.dest_mut() {
            if let Some(&new_dest) = value_map.get(dest) {
                *dest = new_dest;
            }
        }
    }
    remap_block(&mut copy, &value_map);

    *function.cfg.get_block_mut(new_id)? = copy;
    Some((new_id, value_map))
}

/// Rewrite every operand of `block` through `map`, leaving unmapped registers alone.
pub fn remap_block(block: &mut IrBasicBlock, map: &ValueMap) {
    for phi in &mut block.phi_nodes {
        for (_, value) in &mut phi.incoming {
            if let Some(&new_value) = map.get(value) {
                *value = new_value;
            }
        }
    }
    for inst in &mut block.instructions {
        inst.replace_uses(map);
    }
    block.terminator.replace_uses(map);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CompareOp, FunctionSignatureBuilder, IrBuilder, IrInstruction, IrTerminator, IrType};

    #[test]
    fn test_clone_remaps_local_definitions_only() {
        let mut builder = IrBuilder::new("test");
        let sig = FunctionSignatureBuilder::new()
            .param("n", IrType::I64)
            .returns(IrType::Void)
            .build();
        builder.start_function("f", sig);
        let n = builder.param(0).unwrap();
        let body = builder.create_block_with_label("body").unwrap();
        let exit = builder.create_block().unwrap();
        let one = builder.build_int(1, IrType::I64).unwrap();
        builder.build_branch(body);

        builder.switch_to_block(body);
        let sum = builder.build_add(n, one, false).unwrap();
        let cond = builder.build_cmp(CompareOp::Ne, sum, n).unwrap();
        builder.build_cond_branch(cond, body, exit);
        builder.switch_to_block(exit);
        builder.build_return(None);
        builder.finish_function();

        let mut function = builder.module.functions.values().next().unwrap().clone();
        let (copy_id, map) = clone_basic_block(&mut function, body, ".copy").unwrap();

        assert_eq!(map.len(), 2);
        let new_sum = map[&sum];
        let new_cond = map[&cond];
        assert_ne!(new_sum, sum);
        assert_eq!(function.reg_type(new_sum), Some(&IrType::I64));

        let copy = function.cfg.get_block(copy_id).unwrap();
        assert_eq!(copy.label.as_deref(), Some("body.copy"));
        assert_eq!(copy.metadata.cloned_from, Some(body));
        assert!(copy.predecessors.is_empty());
        assert_eq!(
            copy.instructions[0],
            IrInstruction::BinOp {
                dest: new_sum,
                op: crate::ir::BinaryOp::Add,
                left: n,
                right: one,
            }
        );
        assert_eq!(copy.instructions[1].uses(), vec![new_sum, n]);
        assert!(matches!(
            copy.terminator,
            IrTerminator::CondBranch { condition, .. } if condition == new_cond
        ));

        // The source is untouched and still last-but-one in layout
        assert_eq!(function.cfg.get_block(body).unwrap().instructions[0].dest(), Some(sum));
        assert_eq!(function.cfg.block_ids().last(), Some(&copy_id));
        assert!(clone_basic_block(&mut function, IrBlockId::new(99), ".x").is_none());
    }
}
