//! Loop size estimation and unroll factor selection

use super::config::{Threshold, UnrollConfig};
use super::eligibility::UnrollRejection;
use crate::ir::cost_model::CostModel;
use crate::ir::loop_analysis::NaturalLoop;
use crate::ir::{IrFunction, IrType};

/// Cost summary of a loop body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopSize {
    /// Instruction plus terminator cost, at least one; phis are free
    pub size: u32,
    /// Calls the inliner is expected to expand
    pub inline_candidates: usize,
    /// Whether any instruction must not be copied
    pub not_duplicatable: bool,
}

/// Sum the cost of every member block of `natural_loop`.
pub fn approximate_loop_size(
    function: &IrFunction,
    natural_loop: &NaturalLoop,
    cost_model: &dyn CostModel,
) -> LoopSize {
    let mut result = LoopSize::default();
    let mut size: u64 = 0;

    for block_id in &natural_loop.blocks {
        let Some(block) = function.cfg.get_block(*block_id) else {
            continue;
        };
        for inst in &block.instructions {
            size += u64::from(cost_model.instruction_cost(inst));
            if cost_model.is_inline_candidate(inst) {
                result.inline_candidates += 1;
            }
            if cost_model.is_non_duplicatable(inst) {
                result.not_duplicatable = true;
            }
        }
        size += u64::from(cost_model.terminator_cost(&block.terminator));
    }

    result.size = size.clamp(1, u64::from(u32::MAX)) as u32;
    result
}

/// Pick the unroll factor for a loop of the given size.
///
/// Non-duplicatable bodies are refused under any threshold. With a finite
/// threshold, inline candidates are refused and the requested count shrinks
/// to `threshold / size` when partial unrolling is allowed.
pub fn select_factor(
    config: &UnrollConfig,
    loop_size: &LoopSize,
    optimize_size: bool,
) -> Result<u32, UnrollRejection> {
    let count = config.count;
    if count < 2 {
        return Err(UnrollRejection::InvalidCount(count));
    }
    if loop_size.not_duplicatable {
        return Err(UnrollRejection::NotDuplicatable);
    }

    let threshold = match config.effective_threshold(optimize_size) {
        Threshold::NoLimit => return Ok(count),
        Threshold::Limit(threshold) => threshold,
    };

    if loop_size.inline_candidates > 0 {
        return Err(UnrollRejection::InlineCandidates(loop_size.inline_candidates));
    }

    let size = loop_size.size.max(1);
    if u64::from(size) * u64::from(count) <= u64::from(threshold) {
        return Ok(count);
    }

    if !config.allow_partial {
        return Err(UnrollRejection::TooLarge {
            size,
            count,
            threshold,
        });
    }

    let factor = threshold / size;
    if factor < 2 {
        return Err(UnrollRejection::FactorTooSmall { factor });
    }
    Ok(factor)
}

/// Largest factor the guard can use for a bound of type `ty`.
///
/// The factor is materialized as a constant of the bound's type and the
/// remainder is matched against positive switch cases, so both must stay
/// non-negative in that type.
pub fn max_factor_for(ty: &IrType) -> u64 {
    let bits = ty.bit_width().unwrap_or(64);
    let value_bits = if ty.is_signed_integer() { bits - 1 } else { bits };
    if value_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << value_bits) - 1
    }
}

/// Refuse a factor that would wrap in the bound's type.
pub fn check_factor_fits(factor: u32, ty: &IrType) -> Result<u32, UnrollRejection> {
    if u64::from(factor) > max_factor_for(ty) {
        return Err(UnrollRejection::FactorExceedsBound {
            factor,
            ty: ty.clone(),
        });
    }
    Ok(factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::cost_model::DefaultCostModel;
    use crate::ir::loop_analysis::LoopNestInfo;
    use crate::ir::loop_unroll::samples::{sum_loop, SumLoopOptions, SUM_FUNCTION};
    use crate::ir::IrInstruction;

    fn measure(
        options: SumLoopOptions,
        edit: impl FnOnce(&mut IrFunction, &NaturalLoop),
    ) -> LoopSize {
        let module = sum_loop(&options);
        let id = module.get_function_by_name(SUM_FUNCTION).unwrap();
        let mut function = module.functions[&id].clone();
        let info = LoopNestInfo::compute(&function);
        let natural_loop = &info.loops[&info.loops_innermost_first()[0]];
        edit(&mut function, natural_loop);
        approximate_loop_size(&function, natural_loop, &DefaultCostModel)
    }

    fn sized(size: u32) -> LoopSize {
        LoopSize {
            size,
            ..LoopSize::default()
        }
    }

    #[test]
    fn test_fits_and_shrinks() {
        let config = UnrollConfig::default();
        assert_eq!(select_factor(&config, &sized(10), false), Ok(4));
        assert_eq!(select_factor(&config, &sized(40), false), Ok(3));
        assert_eq!(
            select_factor(&config, &sized(100), false),
            Err(UnrollRejection::FactorTooSmall { factor: 1 })
        );
    }

    #[test]
    fn test_optsize_budget() {
        let config = UnrollConfig::default();
        assert_eq!(select_factor(&config, &sized(20), true), Ok(2));
        let explicit = UnrollConfig::default().with_threshold(Threshold::Limit(150));
        assert_eq!(select_factor(&explicit, &sized(20), true), Ok(4));
    }

    #[test]
    fn test_no_partial() {
        let config = UnrollConfig::default().with_allow_partial(false);
        assert_eq!(
            select_factor(&config, &sized(40), false),
            Err(UnrollRejection::TooLarge {
                size: 40,
                count: 4,
                threshold: 150
            })
        );
    }

    #[test]
    fn test_no_limit_still_refuses_unsafe_bodies() {
        let config = UnrollConfig::default().with_threshold(Threshold::NoLimit);
        assert_eq!(select_factor(&config, &sized(10_000), false), Ok(4));

        let barrier = LoopSize {
            size: 3,
            not_duplicatable: true,
            ..LoopSize::default()
        };
        assert_eq!(
            select_factor(&config, &barrier, false),
            Err(UnrollRejection::NotDuplicatable)
        );

        let calls = LoopSize {
            size: 3,
            inline_candidates: 2,
            ..LoopSize::default()
        };
        assert_eq!(select_factor(&config, &calls, false), Ok(4));
        assert_eq!(
            select_factor(&UnrollConfig::default(), &calls, false),
            Err(UnrollRejection::InlineCandidates(2))
        );
    }

    #[test]
    fn test_count_below_two() {
        let config = UnrollConfig::default().with_count(1);
        assert_eq!(
            select_factor(&config, &sized(1), false),
            Err(UnrollRejection::InvalidCount(1))
        );
    }

    #[test]
    fn test_factor_must_fit_bound_type() {
        assert_eq!(max_factor_for(&IrType::U8), 255);
        assert_eq!(max_factor_for(&IrType::I8), 127);
        assert_eq!(max_factor_for(&IrType::I64), i64::MAX as u64);
        assert_eq!(max_factor_for(&IrType::U64), u64::MAX);

        assert_eq!(check_factor_fits(255, &IrType::U8), Ok(255));
        assert_eq!(
            check_factor_fits(256, &IrType::U8),
            Err(UnrollRejection::FactorExceedsBound {
                factor: 256,
                ty: IrType::U8
            })
        );
        assert!(check_factor_fits(128, &IrType::I8).is_err());
        assert_eq!(check_factor_fits(127, &IrType::I8), Ok(127));
        assert_eq!(check_factor_fits(u32::MAX, &IrType::U32), Ok(u32::MAX));
    }

    #[test]
    fn test_sample_body_size() {
        // call, filler, two adds, compare, branch; phis are free
        let plain = measure(SumLoopOptions::default(), |_, _| {});
        assert_eq!(plain.size, 5);
        assert!(!plain.not_duplicatable);

        let padded = measure(
            SumLoopOptions {
                filler_ops: 35,
                ..SumLoopOptions::default()
            },
            |_, _| {},
        );
        assert_eq!(padded.size, 40);

        let barrier = measure(
            SumLoopOptions {
                no_duplicate: true,
                ..SumLoopOptions::default()
            },
            |_, _| {},
        );
        assert_eq!(barrier.size, 6);
        assert!(barrier.not_duplicatable);
    }

    #[test]
    fn test_inline_asm_is_not_duplicatable() {
        let size = measure(SumLoopOptions::default(), |function, natural_loop| {
            let header = function.cfg.get_block_mut(natural_loop.header).unwrap();
            header.add_instruction(IrInstruction::InlineAsm {
                dest: None,
                asm: "1: nop".to_string(),
                inputs: vec![],
            });
        });
        assert!(size.not_duplicatable);
        assert_eq!(size.size, 6);
    }
}
