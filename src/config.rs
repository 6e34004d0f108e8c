//! Generator configuration
//!
//! All optimizer thresholds live here rather than as hard-coded constants:
//! the exact numeric defaults are tuning knobs, not load-bearing semantics.

use crate::runtime;

/// Configuration for code generation and the local optimizer
#[derive(Debug, Clone)]
pub struct Config {
    /// Run the local optimizer (sync lowering, null-check canonicalization,
    /// devirtualization, inlining) before emission
    pub optimize: bool,

    /// Absolute cap on a caller's statement count after inlining
    pub inline_abs_cap: usize,

    /// Growth-ratio cap relative to the caller's original statement count,
    /// applied only once both caller and callee exceed their size floors
    pub inline_ratio_cap: f32,

    /// Caller size floor below which the ratio cap is not applied
    pub inline_caller_floor: usize,

    /// Callee size floor below which the ratio cap is not applied
    pub inline_callee_floor: usize,

    /// Interface-method hash table size; must agree with the runtime library
    pub iface_hash_size: usize,

    /// Instanceof hash table size; must agree with the runtime library
    pub instanceof_hash_size: usize,

    /// Emit `/* line N */` markers next to line-table entries
    pub line_comments: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            optimize: true,
            inline_abs_cap: 60,
            inline_ratio_cap: 2.0,
            inline_caller_floor: 16,
            inline_callee_floor: 8,
            iface_hash_size: runtime::IFACE_HASH_SIZE,
            instanceof_hash_size: runtime::INSTANCEOF_HASH_SIZE,
            line_comments: true,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable the local optimizer
    pub fn without_optimizer(mut self) -> Self {
        self.optimize = false;
        self
    }

    /// Override the inliner thresholds
    pub fn with_inline_caps(
        mut self,
        abs_cap: usize,
        ratio_cap: f32,
        caller_floor: usize,
        callee_floor: usize,
    ) -> Self {
        self.inline_abs_cap = abs_cap;
        self.inline_ratio_cap = ratio_cap;
        self.inline_caller_floor = caller_floor;
        self.inline_callee_floor = callee_floor;
        self
    }
}
