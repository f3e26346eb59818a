//! MIR Optimization Passes
//!
//! This module defines the pass interface and the pass manager.
//! Optimizations are organized into passes that can be run independently
//! and in different orders based on optimization level.

use super::{IrFunction, IrModule};
use fxhash::FxHashMap;
use tracing::debug_span;

/// Optimization pass trait
pub trait OptimizationPass {
    /// Get the name of this pass
    fn name(&self) -> &'static str;

    /// Run the pass on a module
    fn run_on_module(&mut self, module: &mut IrModule) -> OptimizationResult {
        let mut result = OptimizationResult::unchanged();
        for function in module.functions.values_mut() {
            let _span = debug_span!("pass", pass = self.name(), function = %function.name).entered();
            result = result.combine(self.run_on_function(function));
        }
        result
    }

    /// Run the pass on a function (default implementation does nothing)
    fn run_on_function(&mut self, _function: &mut IrFunction) -> OptimizationResult {
        OptimizationResult::unchanged()
    }
}

/// Result of an optimization pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptimizationResult {
    /// Whether the IR was modified
    pub modified: bool,

    /// Number of instructions eliminated
    pub instructions_eliminated: usize,

    /// Number of blocks added
    pub blocks_added: usize,

    /// Other statistics
    pub stats: FxHashMap<String, usize>,
}

impl OptimizationResult {
    /// Create a result indicating no changes
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// Create a result indicating changes
    pub fn changed() -> Self {
        Self {
            modified: true,
            ..Self::default()
        }
    }

    /// Read a named statistic (zero when absent)
    pub fn stat(&self, key: &str) -> usize {
        self.stats.get(key).copied().unwrap_or(0)
    }

    /// Combine results
    pub fn combine(mut self, other: OptimizationResult) -> Self {
        self.modified |= other.modified;
        self.instructions_eliminated += other.instructions_eliminated;
        self.blocks_added += other.blocks_added;

        for (key, value) in other.stats {
            *self.stats.entry(key).or_insert(0) += value;
        }

        self
    }
}

/// Optimization pass manager
#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn OptimizationPass>>,
}

impl PassManager {
    /// Create a new pass manager
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Add a pass to the manager
    pub fn add_pass<P: OptimizationPass + 'static>(&mut self, pass: P) {
        self.passes.push(Box::new(pass));
    }

    /// Run every pass once, in order
    pub fn run(&mut self, module: &mut IrModule) -> OptimizationResult {
        let mut total_result = OptimizationResult::unchanged();

        for pass in &mut self.passes {
            let _span = debug_span!("run_pass", pass = pass.name()).entered();
            total_result = total_result.combine(pass.run_on_module(module));
        }

        total_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::*;
    use crate::ir::IrType;

    /// Marks every function optimize-for-size, once.
    struct MarkOptSize;

    impl OptimizationPass for MarkOptSize {
        fn name(&self) -> &'static str {
            "mark-optsize"
        }

        fn run_on_function(&mut self, function: &mut IrFunction) -> OptimizationResult {
            if function.attributes.optimize_size {
                return OptimizationResult::unchanged();
            }
            function.attributes.optimize_size = true;
            let mut result = OptimizationResult::changed();
            result.stats.insert("marked".to_string(), 1);
            result
        }
    }

    fn two_functions() -> IrModule {
        let mut builder = IrBuilder::new("test");
        for name in ["a", "b"] {
            let sig = FunctionSignatureBuilder::new().returns(IrType::Void).build();
            builder.start_function(name, sig);
            builder.build_return(None);
            builder.finish_function();
        }
        builder.module
    }

    #[test]
    fn test_pass_runs_on_every_function() {
        let mut module = two_functions();
        let mut manager = PassManager::new();
        manager.add_pass(MarkOptSize);

        let result = manager.run(&mut module);
        assert!(result.modified);
        assert_eq!(result.stat("marked"), 2);
        assert!(module.functions.values().all(|f| f.attributes.optimize_size));

        // Second run finds nothing to do
        let again = manager.run(&mut module);
        assert!(!again.modified);
        assert_eq!(again.stat("marked"), 0);
    }
}
