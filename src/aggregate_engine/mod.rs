//! Order-statistics B-trees stored as documents in MVCC transactions, one per namespace.

pub mod directory;
pub mod documents;
pub mod mutation;
pub mod node_store;
pub mod position;
pub mod query;
pub mod validate;
