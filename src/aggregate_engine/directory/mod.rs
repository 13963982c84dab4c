//! The tree directory: one record per namespace, pointing at its root.

mod directory;
mod tree;

pub use directory::*;
pub use tree::*;
