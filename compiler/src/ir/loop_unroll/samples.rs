//! Sample counted loops
//!
//! Builds `fn sum(n) -> i64`, a bottom-tested loop over `start..n` that
//! reports every counter value to the external `observe` function and
//! accumulates it. The counter and `n` share the bound type; the value is
//! widened to `i64` before it is observed. Used by the CLI demo, the benches
//! and the tests.

use crate::ir::{
    CompareOp, FunctionSignatureBuilder, IrBlockId, IrBuilder, IrId, IrModule, IrType,
};

pub const SUM_FUNCTION: &str = "sum";
pub const OBSERVE_FUNCTION: &str = "observe";
pub const BARRIER_FUNCTION: &str = "barrier";

/// Shape knobs for [`sum_loop`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SumLoopOptions {
    /// Initial counter value
    pub start: i64,
    /// Extra `add` instructions in the body, one size unit each
    pub filler_ops: usize,
    /// Call the no-duplicate `barrier` in the body
    pub no_duplicate: bool,
    /// The exit block reads the final counter value
    pub exit_uses_counter: bool,
    /// Keep the counter and the accumulator in stack slots instead of phis
    pub memory_counter: bool,
    /// Wrap the loop in an outer loop running this many times
    pub outer_rows: Option<i64>,
    /// Test `next == n` and leave the loop on the true edge
    pub exit_on_true: bool,
    /// Integer type of the counter and of `n`
    pub bound_ty: IrType,
}

impl Default for SumLoopOptions {
    fn default() -> Self {
        Self {
            start: 0,
            filler_ops: 0,
            no_duplicate: false,
            exit_uses_counter: false,
            memory_counter: false,
            outer_rows: None,
            exit_on_true: false,
            bound_ty: IrType::I64,
        }
    }
}

/// Value `sum(n)` returns for these options
pub fn expected_sum(options: &SumLoopOptions, n: i64) -> i64 {
    if options.start >= n {
        return 0;
    }
    let filler = options.filler_ops as i64;
    let mut per_row: i64 = (options.start..n).map(|i| i + filler).sum();
    if options.exit_uses_counter {
        per_row += n;
    }
    per_row * options.outer_rows.unwrap_or(1)
}

/// Build the sample module.
pub fn sum_loop(options: &SumLoopOptions) -> IrModule {
    build_sum_loop(options).expect("sample loop construction uses only valid blocks")
}

fn widen(builder: &mut IrBuilder, reg: IrId, ty: &IrType) -> Option<IrId> {
    if *ty == IrType::I64 {
        Some(reg)
    } else {
        builder.build_cast(reg, IrType::I64)
    }
}

fn build_sum_loop(options: &SumLoopOptions) -> Option<IrModule> {
    let bound_ty = &options.bound_ty;
    let mut builder = IrBuilder::new("samples");
    let observe = builder.declare_extern(
        OBSERVE_FUNCTION,
        FunctionSignatureBuilder::new()
            .param("value", IrType::I64)
            .returns(IrType::Void)
            .build(),
    );
    let barrier = builder.declare_extern(
        BARRIER_FUNCTION,
        FunctionSignatureBuilder::new().returns(IrType::Void).build(),
    );

    let sig = FunctionSignatureBuilder::new()
        .param("n", bound_ty.clone())
        .returns(IrType::I64)
        .build();
    builder.start_function(SUM_FUNCTION, sig);
    let entry = IrBlockId::entry();
    let n = builder.param(0)?;

    let slots = if options.memory_counter {
        Some((
            builder.build_alloc(bound_ty.clone(), None)?,
            builder.build_alloc(IrType::I64, None)?,
        ))
    } else {
        None
    };
    let zero = builder.build_int(0, IrType::I64)?;
    let one = builder.build_int(1, IrType::I64)?;
    let start = builder.build_int(options.start, bound_ty.clone())?;
    let step = builder.build_int(1, bound_ty.clone())?;

    // Outer loop scaffolding: `row` counts up to `rows`, the sum is carried along
    let outer = match options.outer_rows {
        Some(rows) => {
            let rows = builder.build_int(rows, IrType::I64)?;
            let outer = builder.create_block_with_label("outer")?;
            builder.build_branch(outer)?;
            builder.switch_to_block(outer);
            let row = builder.build_phi(outer, IrType::I64)?;
            let acc_in = builder.build_phi(outer, IrType::I64)?;
            Some((outer, rows, row, acc_in))
        }
        None => None,
    };
    let guard_block = outer.map_or(entry, |(block, ..)| block);
    let acc_in = outer.map_or(zero, |(.., acc_in)| acc_in);

    let preheader = builder.create_block_with_label("preheader")?;
    let header = builder.create_block_with_label("loop")?;
    let exit = builder.create_block_with_label("exit")?;
    let join = builder.create_block_with_label(if outer.is_some() { "outer.latch" } else { "done" })?;

    if let Some((counter_slot, acc_slot)) = slots {
        builder.build_store(counter_slot, start)?;
        builder.build_store(acc_slot, acc_in)?;
    }
    let enter = builder.build_cmp(CompareOp::Lt, start, n)?;
    builder.build_cond_branch(enter, preheader, join)?;

    builder.switch_to_block(preheader);
    builder.build_branch(header)?;

    builder.switch_to_block(header);
    let (i, acc) = match slots {
        Some((counter_slot, acc_slot)) => (
            builder.build_load(counter_slot, bound_ty.clone())?,
            builder.build_load(acc_slot, IrType::I64)?,
        ),
        None => (
            builder.build_phi(header, bound_ty.clone())?,
            builder.build_phi(header, IrType::I64)?,
        ),
    };
    if options.no_duplicate {
        builder.build_call_no_duplicate(barrier, vec![])?;
    }
    let mut value = widen(&mut builder, i, bound_ty)?;
    builder.build_call_direct(observe, vec![value])?;
    for _ in 0..options.filler_ops {
        value = builder.build_add(value, one, false)?;
    }
    let acc_next = builder.build_add(acc, value, false)?;
    let next = builder.build_add(i, step, false)?;
    if let Some((counter_slot, acc_slot)) = slots {
        builder.build_store(acc_slot, acc_next)?;
        builder.build_store(counter_slot, next)?;
    } else {
        builder.add_phi_incoming(header, i, preheader, start)?;
        builder.add_phi_incoming(header, i, header, next)?;
        builder.add_phi_incoming(header, acc, preheader, acc_in)?;
        builder.add_phi_incoming(header, acc, header, acc_next)?;
    }
    if options.exit_on_true {
        let done = builder.build_cmp(CompareOp::Eq, next, n)?;
        builder.build_cond_branch(done, exit, header)?;
    } else {
        let more = builder.build_cmp(CompareOp::Ne, next, n)?;
        builder.build_cond_branch(more, header, exit)?;
    }

    builder.switch_to_block(exit);
    let mut out: IrId = match slots {
        Some((_, acc_slot)) => builder.build_load(acc_slot, IrType::I64)?,
        None => acc_next,
    };
    if options.exit_uses_counter {
        let last = widen(&mut builder, next, bound_ty)?;
        out = builder.build_add(out, last, false)?;
    }
    builder.build_branch(join)?;

    builder.switch_to_block(join);
    let total = builder.build_phi(join, IrType::I64)?;
    builder.add_phi_incoming(join, total, guard_block, acc_in)?;
    builder.add_phi_incoming(join, total, exit, out)?;

    match outer {
        Some((outer_block, rows, row, carried)) => {
            let row_next = builder.build_add(row, one, false)?;
            let more = builder.build_cmp(CompareOp::Ne, row_next, rows)?;
            let done = builder.create_block_with_label("done")?;
            builder.build_cond_branch(more, outer_block, done)?;
            builder.add_phi_incoming(outer_block, row, entry, zero)?;
            builder.add_phi_incoming(outer_block, row, join, row_next)?;
            builder.add_phi_incoming(outer_block, carried, entry, zero)?;
            builder.add_phi_incoming(outer_block, carried, join, total)?;
            builder.switch_to_block(done);
            builder.build_return(Some(total))?;
        }
        None => {
            builder.build_return(Some(total))?;
        }
    }

    builder.finish_function();
    Some(builder.module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::loop_analysis::LoopNestInfo;
    use crate::ir::validation::validate_module;

    #[test]
    fn test_samples_are_valid_ssa() {
        for options in [
            SumLoopOptions::default(),
            SumLoopOptions {
                memory_counter: true,
                exit_uses_counter: true,
                ..SumLoopOptions::default()
            },
            SumLoopOptions {
                outer_rows: Some(3),
                start: 1,
                ..SumLoopOptions::default()
            },
            SumLoopOptions {
                exit_on_true: true,
                bound_ty: IrType::U8,
                memory_counter: true,
                exit_uses_counter: true,
                ..SumLoopOptions::default()
            },
        ] {
            let module = sum_loop(&options);
            assert!(validate_module(&module).is_ok(), "{:?}", options);
        }
    }

    #[test]
    fn test_nested_sample_has_two_loops() {
        let module = sum_loop(&SumLoopOptions {
            outer_rows: Some(2),
            ..SumLoopOptions::default()
        });
        let id = module.get_function_by_name(SUM_FUNCTION).unwrap();
        let info = LoopNestInfo::compute(&module.functions[&id]);
        assert_eq!(info.loops.len(), 2);
        assert_eq!(info.max_depth, 1);
    }

    #[test]
    fn test_expected_sum() {
        let options = SumLoopOptions::default();
        assert_eq!(expected_sum(&options, 4), 6);
        assert_eq!(expected_sum(&options, 0), 0);
        let nested = SumLoopOptions {
            outer_rows: Some(2),
            exit_uses_counter: true,
            ..SumLoopOptions::default()
        };
        assert_eq!(expected_sum(&nested, 3), 2 * (3 + 3));
    }
}
