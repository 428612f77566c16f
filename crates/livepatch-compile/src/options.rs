//! Compilation options

use serde::{Deserialize, Serialize};

/// Optimization level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    /// Lower bodies as written
    #[default]
    Debug,
    /// Fold constant expressions
    Release,
}

/// Options applied to every compilation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Optimization level
    pub optimization: OptimizationLevel,
    /// Accept `unsafe fn` declarations
    pub allow_unsafe: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            optimization: OptimizationLevel::Debug,
            allow_unsafe: true,
        }
    }
}

impl CompileOptions {
    /// Default options
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the optimization level
    #[inline]
    #[must_use]
    pub fn with_optimization(mut self, optimization: OptimizationLevel) -> Self {
        self.optimization = optimization;
        self
    }

    /// Allow or reject `unsafe fn`
    #[inline]
    #[must_use]
    pub fn with_allow_unsafe(mut self, allow: bool) -> Self {
        self.allow_unsafe = allow;
        self
    }

    /// Whether constant folding is enabled
    #[inline]
    #[must_use]
    pub fn folds_constants(&self) -> bool {
        self.optimization == OptimizationLevel::Release
    }
}
