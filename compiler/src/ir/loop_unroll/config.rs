//! Unroller configuration.
//!
//! Loaded from TOML with kebab-case keys, for example:
//!
//! ```toml
//! threshold = "no-limit"   # or an instruction budget such as 150
//! count = 8
//! and-guard = true
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Size budget used when the threshold is not configured.
pub const DEFAULT_THRESHOLD: u32 = 150;

/// Size budget for functions marked optimize-for-size, unless configured.
pub const OPT_SIZE_THRESHOLD: u32 = 50;

/// Unroll factor used when none is configured.
pub const DEFAULT_COUNT: u32 = 4;

/// Size budget for an unrolled loop body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ThresholdRepr", into = "ThresholdRepr")]
pub enum Threshold {
    /// `size * factor` may not exceed this many instructions
    Limit(u32),
    /// Unroll regardless of size
    NoLimit,
}

/// On-disk form: a number or the string `"no-limit"`
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ThresholdRepr {
    Limit(u32),
    Named(String),
}

impl TryFrom<ThresholdRepr> for Threshold {
    type Error = String;

    fn try_from(repr: ThresholdRepr) -> Result<Self, Self::Error> {
        match repr {
            ThresholdRepr::Limit(n) => Ok(Threshold::Limit(n)),
            ThresholdRepr::Named(name) => name.parse(),
        }
    }
}

impl From<Threshold> for ThresholdRepr {
    fn from(threshold: Threshold) -> Self {
        match threshold {
            Threshold::Limit(n) => ThresholdRepr::Limit(n),
            Threshold::NoLimit => ThresholdRepr::Named("no-limit".to_string()),
        }
    }
}

impl FromStr for Threshold {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no-limit" | "none" | "unlimited" => Ok(Threshold::NoLimit),
            other => other
                .parse::<u32>()
                .map(Threshold::Limit)
                .map_err(|_| format!("invalid threshold '{}', expected a number or \"no-limit\"", other)),
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::Limit(n) => write!(f, "{}", n),
            Threshold::NoLimit => write!(f, "no-limit"),
        }
    }
}

/// Named presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnrollProfile {
    /// Factor 4, remainder computed with an unsigned modulo
    Baseline,
    /// Factor 2, remainder computed with a bitmask
    Compact,
}

impl FromStr for UnrollProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "baseline" => Ok(UnrollProfile::Baseline),
            "compact" => Ok(UnrollProfile::Compact),
            other => Err(format!("unknown unroll profile '{}'", other)),
        }
    }
}

/// Loop unroller settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UnrollConfig {
    /// Skip the pass entirely
    pub disable: bool,

    /// Size budget; `None` means "not set by the user"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<Threshold>,

    /// Requested unroll factor
    pub count: u32,

    /// Shrink the factor to fit the threshold instead of giving up
    pub allow_partial: bool,

    /// Use `trip & (factor - 1)` for power-of-two factors
    pub and_guard: bool,

    /// Skip demoting phis to slots before cloning
    pub disable_reg2mem: bool,

    /// Skip promoting slots back to SSA after cloning
    pub disable_mem2reg: bool,

    /// Dump the function at every stage boundary
    pub trace: bool,

    /// Validate SSA after each unrolled loop
    pub verify: bool,
}

impl Default for UnrollConfig {
    fn default() -> Self {
        Self {
            disable: false,
            threshold: None,
            count: DEFAULT_COUNT,
            allow_partial: true,
            and_guard: false,
            disable_reg2mem: false,
            disable_mem2reg: false,
            trace: false,
            verify: cfg!(debug_assertions),
        }
    }
}

impl UnrollConfig {
    /// Settings for a named preset
    pub fn profile(profile: UnrollProfile) -> Self {
        match profile {
            UnrollProfile::Baseline => Self::default(),
            UnrollProfile::Compact => Self {
                count: 2,
                and_guard: true,
                ..Self::default()
            },
        }
    }

    pub fn with_threshold(mut self, threshold: Threshold) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn with_allow_partial(mut self, allow: bool) -> Self {
        self.allow_partial = allow;
        self
    }

    pub fn with_and_guard(mut self, enabled: bool) -> Self {
        self.and_guard = enabled;
        self
    }

    pub fn with_trace(mut self, enabled: bool) -> Self {
        self.trace = enabled;
        self
    }

    pub fn with_verify(mut self, enabled: bool) -> Self {
        self.verify = enabled;
        self
    }

    pub fn with_disable_reg2mem(mut self, disabled: bool) -> Self {
        self.disable_reg2mem = disabled;
        self
    }

    pub fn with_disable_mem2reg(mut self, disabled: bool) -> Self {
        self.disable_mem2reg = disabled;
        self
    }

    /// Threshold in force for a function. An unset threshold falls back to
    /// the default, or the smaller budget under optimize-for-size.
    pub fn effective_threshold(&self, optimize_size: bool) -> Threshold {
        match self.threshold {
            Some(threshold) => threshold,
            None if optimize_size => Threshold::Limit(OPT_SIZE_THRESHOLD),
            None => Threshold::Limit(DEFAULT_THRESHOLD),
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Render as a TOML document
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }
}

/// Configuration loading failure
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Io { path: String, message: String },
    Parse(String),
    Serialize(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, message } => write!(f, "cannot read {}: {}", path, message),
            ConfigError::Parse(msg) => write!(f, "invalid unroll configuration: {}", msg),
            ConfigError::Serialize(msg) => write!(f, "cannot render configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
