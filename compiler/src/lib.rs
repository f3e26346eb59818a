//! Aggressive loop unrolling over a small MIR.
//!
//! - [`ir`]: the IR, its analyses and utilities, and the unroller in
//!   [`ir::loop_unroll`]
//! - [`codegen`]: an interpreter used to observe program behavior
//! - [`logging`]: `env_logger` setup

pub mod codegen;
pub mod ir;
pub mod logging;
