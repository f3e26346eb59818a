/// Execution support for MIR
///
/// The register interpreter runs a module function directly. Loop
/// transformations are checked by comparing the external calls and the
/// result of a run before and after the pass.
pub mod mir_interpreter;

pub use mir_interpreter::{InterpError, MirInterpreter, TraceEvent, DEFAULT_STEP_LIMIT};
