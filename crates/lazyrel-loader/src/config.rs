//! Loader configuration.

use lazyrel_query::TopNStrategy;
use serde::{Deserialize, Serialize};

/// Configuration shared by every registry a scope creates.
///
/// Can be embedded in a host configuration file; missing keys take their
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// How the per-parent limit is rendered.
    pub strategy: TopNStrategy,
    /// Per-parent limit applied when the base query sets none.
    pub default_limit: Option<u64>,
    /// Upper bound on parents registered with one batch.
    pub max_parents: Option<usize>,
    /// Record child -> parent back-references when partitioning.
    pub back_references: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            strategy: TopNStrategy::Auto,
            default_limit: None,
            max_parents: None,
            back_references: true,
        }
    }
}

impl LoaderConfig {
    /// Create a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the SQL strategy.
    pub fn strategy(mut self, strategy: TopNStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the default per-parent limit.
    pub fn default_limit(mut self, n: u64) -> Self {
        self.default_limit = Some(n);
        self
    }

    /// Set the maximum number of parents per batch.
    pub fn max_parents(mut self, n: usize) -> Self {
        self.max_parents = Some(n);
        self
    }

    /// Enable or disable back-reference tracking.
    pub fn back_references(mut self, enabled: bool) -> Self {
        self.back_references = enabled;
        self
    }
}
