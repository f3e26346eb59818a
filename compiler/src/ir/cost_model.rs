//! Target cost model
//!
//! Size estimates used by code-growing transformations. Every instruction and
//! terminator costs one unit by default; a model also decides which calls are
//! worth keeping around for the inliner and which instructions must never be
//! duplicated.

use super::{IrFunctionId, IrInstruction, IrModule, IrTerminator, InlineHint};
use fxhash::FxHashSet;

/// Per-instruction cost queries
pub trait CostModel {
    /// Size of one instruction
    fn instruction_cost(&self, _inst: &IrInstruction) -> u32 {
        1
    }

    /// Size of a block terminator
    fn terminator_cost(&self, _term: &IrTerminator) -> u32 {
        1
    }

    /// Whether `inst` is a call the inliner is expected to expand
    fn is_inline_candidate(&self, inst: &IrInstruction) -> bool;

    /// Whether copying `inst` would change program meaning
    fn is_non_duplicatable(&self, inst: &IrInstruction) -> bool {
        inst.is_non_duplicatable()
    }
}

/// Unit costs and no inline candidates; used when no module is at hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCostModel;

impl CostModel for DefaultCostModel {
    fn is_inline_candidate(&self, _inst: &IrInstruction) -> bool {
        false
    }
}

/// Unit costs; calls to private, inlinable functions with a body count as
/// inline candidates.
#[derive(Debug, Clone, Default)]
pub struct ModuleCostModel {
    inline_candidates: FxHashSet<IrFunctionId>,
}

impl ModuleCostModel {
    /// Precompute the inlinable callees of `module`.
    pub fn from_module(module: &IrModule) -> Self {
        let inline_candidates = module
            .functions
            .values()
            .filter(|f| f.has_body())
            .filter(|f| !f.attributes.linkage.is_exported())
            .filter(|f| f.attributes.inline != InlineHint::Never)
            .map(|f| f.id)
            .collect();
        Self { inline_candidates }
    }

    /// Whether calls to `callee` are inline candidates
    pub fn is_inline_candidate_function(&self, callee: IrFunctionId) -> bool {
        self.inline_candidates.contains(&callee)
    }
}

impl CostModel for ModuleCostModel {
    fn is_inline_candidate(&self, inst: &IrInstruction) -> bool {
        match inst {
            IrInstruction::CallDirect { func_id, .. } => self.is_inline_candidate_function(*func_id),
            _ => false,
        }
    }
}
