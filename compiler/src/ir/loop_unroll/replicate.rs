//! Body replication
//!
//! Copies the loop block `factor - 1` times and chains the copies so the
//! exit test only runs at the end of the chain:
//!
//! ```text
//! header: ... br C1
//! C1:     ... br C2
//! C{F-1}: ... condbr c, header, exit
//! ```

use super::eligibility::LoopShape;
use crate::ir::cloning::clone_basic_block;
use crate::ir::loop_analysis::LoopNestInfo;
use crate::ir::{IrBlockId, IrFunction, IrTerminator};
use log::trace;

/// Clone the header `factor - 1` times and rewire the chain. Returns the
/// copies in execution order; the last one is the new latch.
pub fn replicate_body(
    function: &mut IrFunction,
    loop_info: &mut LoopNestInfo,
    shape: &LoopShape,
    factor: u32,
) -> Vec<IrBlockId> {
    let header = shape.header;

    // Copy the pristine header first, rewire afterwards
    let mut copies = Vec::with_capacity(factor.saturating_sub(1) as usize);
    for i in 1..factor {
        let (copy, _) = clone_basic_block(function, header, &format!(".lua{}", i))
            .expect("loop-unroll: header vanished while unrolling");
        loop_info.add_block_to_loop(header, copy);
        copies.push(copy);
    }

    let mut prev = header;
    for &copy in &copies {
        function
            .cfg
            .get_block_mut(prev)
            .expect("loop-unroll: clone chain broken")
            .terminator = IrTerminator::Branch { target: copy };
        prev = copy;
    }

    let last = function
        .cfg
        .get_block_mut(prev)
        .expect("loop-unroll: clone chain broken");
    let rewired = last.terminator.set_successor(shape.latch_index, header)
        && last.terminator.set_successor(shape.exit_index, shape.exit);
    if !rewired || !matches!(last.terminator, IrTerminator::CondBranch { .. }) {
        panic!("loop-unroll: clone chain missing its terminator in {}", prev);
    }

    if let Some(natural_loop) = loop_info.loops.get_mut(&header) {
        natural_loop.latch = Some(prev);
        natural_loop.back_edges = vec![prev];
    }
    function.cfg.recompute_predecessors();
    loop_info.refresh_exits(&function.cfg, header);

    trace!("LUA: {} now runs {} copies per trip, latch {}", header, factor, prev);
    copies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::loop_unroll::eligibility::analyze_loop;
    use crate::ir::loop_unroll::samples::{sum_loop, SumLoopOptions, SUM_FUNCTION};
    use crate::ir::reg2mem::flatten_function_phis;

    #[test]
    fn test_chain_layout_and_membership() {
        let module = sum_loop(&SumLoopOptions::default());
        let id = module.get_function_by_name(SUM_FUNCTION).unwrap();
        let mut function = module.functions[&id].clone();
        let mut info = LoopNestInfo::compute(&function);
        let header = info.loops_innermost_first()[0];
        let shape = analyze_loop(&function, &info.loops[&header]).unwrap();
        flatten_function_phis(&mut function);

        let copies = replicate_body(&mut function, &mut info, &shape, 4);
        assert_eq!(copies.len(), 3);

        let header_block = function.cfg.get_block(header).unwrap();
        assert_eq!(header_block.successors().as_slice(), &[copies[0]]);
        let middle = function.cfg.get_block(copies[1]).unwrap();
        assert_eq!(middle.successors().as_slice(), &[copies[2]]);
        let last = function.cfg.get_block(copies[2]).unwrap();
        assert_eq!(last.successors().as_slice(), &[header, shape.exit]);
        assert_eq!(last.label.as_deref().map(|l| l.ends_with(".lua3")), Some(true));

        let natural_loop = &info.loops[&header];
        assert_eq!(natural_loop.latch, Some(copies[2]));
        assert_eq!(natural_loop.blocks.len(), 4);
        assert_eq!(natural_loop.exiting_blocks, vec![copies[2]]);
        assert!(copies.iter().all(|c| info.block_to_loop[c] == header));
    }
}
