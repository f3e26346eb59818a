//! Mid-level Intermediate Representation (MIR)
//!
//! This module defines a low-level, platform-independent intermediate representation
//! together with the analyses and transformations that operate on it. The IR is:
//! - Simple and explicit (no implicit operations)
//! - Strongly typed, with a type recorded for every register
//! - In SSA form, with phi nodes at the top of blocks
//! - Serializable, so functions can be snapshotted and reloaded
//!
//! The main optimization living here is the aggressive loop unroller in
//! [`loop_unroll`]; everything else is the toolbox it is built from.

pub mod types;
pub mod instructions;
pub mod blocks;
pub mod functions;
pub mod modules;
pub mod builder;
pub mod dump;
pub mod validation;
pub mod loop_analysis;
pub mod optimization;
pub mod cloning;
pub mod reg2mem;
pub mod mem2reg;
pub mod cost_model;
pub mod loop_unroll;

pub use types::*;
pub use instructions::*;
pub use blocks::*;
pub use functions::*;
pub use modules::*;
pub use builder::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for IR registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IrId(u32);

impl IrId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn invalid() -> Self {
        Self(u32::MAX)
    }

    pub fn is_valid(&self) -> bool {
        self.0 != u32::MAX
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for IrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// Linkage type for symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Linkage {
    /// Private to the module
    Private,
    /// Available within the package
    Internal,
    /// Publicly exported
    Public,
    /// External symbol (defined elsewhere)
    External,
}

impl Linkage {
    /// Whether callers outside the module can reach this symbol.
    pub fn is_exported(&self) -> bool {
        matches!(self, Linkage::Public | Linkage::External)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ir_id() {
        let id = IrId::new(42);
        assert_eq!(format!("{}", id), "$42");
        assert!(id.is_valid());

        let invalid = IrId::invalid();
        assert!(!invalid.is_valid());
    }

    #[test]
    fn test_linkage_export() {
        assert!(Linkage::Public.is_exported());
        assert!(!Linkage::Private.is_exported());
        assert!(!Linkage::Internal.is_exported());
    }
}
