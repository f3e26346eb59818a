//! Aggressive loop unrolling
//!
//! Unrolls single-block counted loops (`i = start; do { body; i += 1 } while i != n`)
//! by a factor `F`:
//!
//! 1. every phi of the function is demoted to a stack slot, together with the
//!    loop values read outside the loop block, so blocks can be copied freely;
//! 2. the preheader is split and ends in a switch on `(n - start) % F` that
//!    runs the leftover iterations in a chain of header copies;
//! 3. the header is copied `F - 1` times and the copies are chained, only the
//!    last one keeps the exit test;
//! 4. the slots created in step 1 are promoted back to SSA registers.
//!
//! Loops that do not match are left untouched and reported with an
//! [`UnrollRejection`].

pub mod config;
pub mod eligibility;
pub mod guard;
pub mod replicate;
pub mod samples;
pub mod size;

pub use config::{ConfigError, Threshold, UnrollConfig, UnrollProfile};
pub use eligibility::{analyze_loop, CounterForm, CounterStart, LoopShape, UnrollRejection};
pub use guard::{build_guard, GuardInfo};
pub use replicate::replicate_body;
pub use size::{approximate_loop_size, check_factor_fits, max_factor_for, select_factor, LoopSize};

use super::cost_model::{CostModel, DefaultCostModel, ModuleCostModel};
use super::dump::dump_function;
use super::loop_analysis::LoopNestInfo;
use super::mem2reg::promote_slots;
use super::optimization::{OptimizationPass, OptimizationResult};
use super::reg2mem::{demote_value_to_slot, flatten_function_phis, values_used_outside};
use super::validation::validate_function;
use super::{IrBlockId, IrFunction, IrId, IrModule};
use log::debug;
use tracing::debug_span;

/// Counters accumulated over a pass run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnrollStats {
    pub loops_unrolled: usize,
    pub loops_rejected: usize,
    /// Prologue and body copies
    pub blocks_cloned: usize,
    pub slots_created: usize,
    pub slots_promoted: usize,
}

impl UnrollStats {
    pub fn merge(&mut self, other: &UnrollStats) {
        self.loops_unrolled += other.loops_unrolled;
        self.loops_rejected += other.loops_rejected;
        self.blocks_cloned += other.blocks_cloned;
        self.slots_created += other.slots_created;
        self.slots_promoted += other.slots_promoted;
    }

    fn record(&mut self, outcome: &UnrollOutcome) {
        match outcome {
            UnrollOutcome::Unrolled(report) => {
                self.loops_unrolled += 1;
                self.blocks_cloned += report.guard.clones.len() + report.body_copies.len();
                self.slots_created += report.slots_created;
                self.slots_promoted += report.slots_promoted;
            }
            UnrollOutcome::Rejected(_) => self.loops_rejected += 1,
        }
    }

    /// Fold into a pass result. Each unrolled loop also adds its split block.
    pub fn to_result(&self) -> OptimizationResult {
        let mut result = if self.loops_unrolled > 0 {
            OptimizationResult::changed()
        } else {
            OptimizationResult::unchanged()
        };
        result.blocks_added = self.blocks_cloned + self.loops_unrolled;
        for (key, value) in [
            ("loops_unrolled", self.loops_unrolled),
            ("loops_rejected", self.loops_rejected),
            ("blocks_cloned", self.blocks_cloned),
            ("slots_created", self.slots_created),
            ("slots_promoted", self.slots_promoted),
        ] {
            result.stats.insert(key.to_string(), value);
        }
        result
    }
}

/// What happened to one loop
#[derive(Debug, Clone, PartialEq)]
pub enum UnrollOutcome {
    Unrolled(UnrollReport),
    Rejected(UnrollRejection),
}

impl UnrollOutcome {
    pub fn is_unrolled(&self) -> bool {
        matches!(self, UnrollOutcome::Unrolled(_))
    }

    pub fn rejection(&self) -> Option<&UnrollRejection> {
        match self {
            UnrollOutcome::Rejected(reason) => Some(reason),
            UnrollOutcome::Unrolled(_) => None,
        }
    }
}

/// Details of a successful unroll
#[derive(Debug, Clone, PartialEq)]
pub struct UnrollReport {
    pub header: IrBlockId,
    pub factor: u32,
    pub guard: GuardInfo,
    /// Body copies in execution order; the last one is the latch
    pub body_copies: Vec<IrBlockId>,
    pub slots_created: usize,
    pub slots_promoted: usize,
}

fn trace_dump(config: &UnrollConfig, stage: &str, function: &IrFunction) {
    if config.trace {
        debug!("LUA: {}\n{}", stage, dump_function(function));
    }
}

/// Whether copying the loop block would break SSA without demotion first.
fn needs_flattening(function: &IrFunction, shape: &LoopShape) -> bool {
    let has_phis = |block: IrBlockId| {
        function
            .cfg
            .get_block(block)
            .map_or(false, |b| !b.phi_nodes.is_empty())
    };
    has_phis(shape.header)
        || has_phis(shape.exit)
        || !values_used_outside(function, shape.header).is_empty()
}

/// Demote every phi of the function and every header value read elsewhere.
fn flatten(function: &mut IrFunction, header: IrBlockId) -> Vec<IrId> {
    let mut slots = flatten_function_phis(function);
    for reg in values_used_outside(function, header) {
        if let Some(slot) = demote_value_to_slot(function, reg) {
            slots.push(slot);
        }
    }
    slots
}

fn verify_unrolled(function: &IrFunction) {
    if let Err(message) = function.verify() {
        panic!("loop-unroll: broken CFG in {}: {}", function.name, message);
    }
    if let Err(errors) = validate_function(function) {
        let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
        panic!(
            "loop-unroll: invalid SSA after unrolling {}: {}",
            function.name,
            details.join("; ")
        );
    }
}

/// Try to unroll the loop headed by `header`.
///
/// On rejection the function is left exactly as it was. On success
/// `loop_info` is updated in place: the body copies join the loop, the
/// prologue copies and the split block join the parent loop.
pub fn unroll_loop(
    function: &mut IrFunction,
    loop_info: &mut LoopNestInfo,
    header: IrBlockId,
    config: &UnrollConfig,
    cost_model: &dyn CostModel,
) -> UnrollOutcome {
    let natural_loop = loop_info
        .loops
        .get(&header)
        .unwrap_or_else(|| panic!("loop-unroll: {} is not a loop header", header));
    debug!("LUA: F[{}] Loop %{}", function.name, header);

    let reject = |reason: UnrollRejection| {
        debug!("LUA: Can't unroll: {}", reason);
        UnrollOutcome::Rejected(reason)
    };

    let shape = match analyze_loop(function, natural_loop) {
        Ok(shape) => shape,
        Err(reason) => return reject(reason),
    };

    let loop_size = approximate_loop_size(function, natural_loop, cost_model);
    debug!("LUA: Loop Size = {}", loop_size.size);
    let factor = match select_factor(config, &loop_size, function.attributes.optimize_size)
        .and_then(|factor| check_factor_fits(factor, &shape.bound_ty))
    {
        Ok(factor) => factor,
        Err(reason) => return reject(reason),
    };
    if factor < config.count {
        debug!("LUA: partially unrolling with count: {}", factor);
    }

    if config.disable_reg2mem && needs_flattening(function, &shape) {
        return reject(UnrollRejection::NeedsFlattening);
    }

    trace_dump(config, "(1) dump before transform", function);

    let slots = if config.disable_reg2mem {
        Vec::new()
    } else {
        flatten(function, header)
    };
    trace_dump(config, "(2) dump after reg2mem", function);

    let guard = build_guard(function, loop_info, &shape, factor, config.and_guard);
    trace_dump(config, "(3) dump after guarantee switch case", function);

    let body_copies = replicate_body(function, loop_info, &shape, factor);
    trace_dump(config, "(4) dump after unroll body", function);

    let slots_promoted = if config.disable_mem2reg {
        0
    } else {
        promote_slots(function, &slots)
    };
    function.cfg.recompute_predecessors();
    trace_dump(config, "(5) dump after transform", function);

    if config.verify {
        verify_unrolled(function);
    }

    debug!(
        "LUA: unrolled {} in {} by {} ({} slot(s) promoted)",
        header, function.name, factor, slots_promoted
    );
    UnrollOutcome::Unrolled(UnrollReport {
        header,
        factor,
        guard,
        body_copies,
        slots_created: slots.len(),
        slots_promoted,
    })
}

/// Unroll every eligible loop of `function`, innermost loops first.
pub fn unroll_function(
    function: &mut IrFunction,
    config: &UnrollConfig,
    cost_model: &dyn CostModel,
) -> UnrollStats {
    let mut stats = UnrollStats::default();
    if config.disable || !function.has_body() {
        return stats;
    }

    let mut loop_info = LoopNestInfo::compute(function);
    for header in loop_info.loops_innermost_first() {
        let outcome = unroll_loop(function, &mut loop_info, header, config, cost_model);
        stats.record(&outcome);
    }
    stats
}

/// The unroller as a pass-manager pass
pub struct LoopUnrollPass {
    config: UnrollConfig,
    cost_model: Option<Box<dyn CostModel>>,
    stats: UnrollStats,
}

impl Default for LoopUnrollPass {
    fn default() -> Self {
        Self::new(UnrollConfig::default())
    }
}

impl LoopUnrollPass {
    /// Create a pass. Without an explicit cost model, module runs use
    /// [`ModuleCostModel`] and single-function runs use [`DefaultCostModel`].
    pub fn new(config: UnrollConfig) -> Self {
        Self {
            config,
            cost_model: None,
            stats: UnrollStats::default(),
        }
    }

    pub fn with_cost_model(mut self, cost_model: impl CostModel + 'static) -> Self {
        self.cost_model = Some(Box::new(cost_model));
        self
    }

    pub fn config(&self) -> &UnrollConfig {
        &self.config
    }

    /// Totals over every run so far
    pub fn stats(&self) -> UnrollStats {
        self.stats
    }
}

impl OptimizationPass for LoopUnrollPass {
    fn name(&self) -> &'static str {
        "loop-unroll-aggressive"
    }

    fn run_on_module(&mut self, module: &mut IrModule) -> OptimizationResult {
        let Self {
            config,
            cost_model,
            stats,
        } = self;
        if config.disable {
            return OptimizationResult::unchanged();
        }

        let module_model;
        let model: &dyn CostModel = match cost_model.as_deref() {
            Some(model) => model,
            None => {
                module_model = ModuleCostModel::from_module(module);
                &module_model
            }
        };

        let mut run_stats = UnrollStats::default();
        for function in module.functions.values_mut() {
            let _span = debug_span!("pass", pass = "loop-unroll-aggressive", function = %function.name)
                .entered();
            run_stats.merge(&unroll_function(function, config, model));
        }
        stats.merge(&run_stats);
        run_stats.to_result()
    }

    fn run_on_function(&mut self, function: &mut IrFunction) -> OptimizationResult {
        let model: &dyn CostModel = match self.cost_model.as_deref() {
            Some(model) => model,
            None => &DefaultCostModel,
        };
        let run_stats = unroll_function(function, &self.config, model);
        self.stats.merge(&run_stats);
        run_stats.to_result()
    }
}
