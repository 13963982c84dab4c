//! Configuration for aggregate trees and the forest that hosts them.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default branching parameter. Nodes hold between this many and twice this
/// many items.
pub const DEFAULT_MAX_NODE_SIZE: usize = 16;

/// Default number of retries for operations that hit a serialization conflict.
pub const DEFAULT_MAX_RETRIES: usize = 8;

/// Parameters of a single tree, used when a namespace is first written or cleared.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Minimum occupancy of non-root nodes; the maximum is twice this value.
    pub max_node_size: usize,
    /// Whether the root aggregate is computed on read instead of on write.
    pub root_lazy: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self { max_node_size: DEFAULT_MAX_NODE_SIZE, root_lazy: true }
    }
}

impl TreeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the node size.
    pub fn with_max_node_size(mut self, max_node_size: usize) -> Self {
        self.max_node_size = max_node_size;
        self
    }

    /// Sets the root aggregate strategy.
    pub fn with_root_lazy(mut self, root_lazy: bool) -> Self {
        self.root_lazy = root_lazy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_max_node_size(self.max_node_size)
    }
}

/// Checks that a node size can keep a balanced tree.
pub fn validate_max_node_size(max_node_size: usize) -> Result<()> {
    if max_node_size < 2 {
        return Err(Error::Config(format!(
            "max node size must be at least 2, got {}",
            max_node_size
        )));
    }
    Ok(())
}

/// Configuration of a `Forest`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Defaults for trees created implicitly by a first write.
    pub tree: TreeConfig,
    /// How many times an operation is re-run after a serialization conflict.
    pub max_retries: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self { tree: TreeConfig::default(), max_retries: DEFAULT_MAX_RETRIES }
    }
}

impl ForestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tree defaults.
    pub fn with_tree(mut self, tree: TreeConfig) -> Self {
        self.tree = tree;
        self
    }

    /// Sets the conflict retry limit.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.tree.validate()
    }
}
