//! Stored tree nodes: items, summands, and the cached per-subtree aggregates.

mod item;
mod node;
mod store;
mod summand;

pub use item::*;
pub use node::*;
pub use store::*;
pub use summand::*;
