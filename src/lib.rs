//! Order-statistics aggregate B-trees.
//!
//! Every node caches the count and sum of its subtree, so range counts and sums, ranks, and
//! order statistics run in time proportional to the tree height. Trees are partitioned by
//! namespace into a `Forest`, and stored as documents in an MVCC key/value store, so every
//! operation is a serializable transaction.
//!
//! ```
//! use aggtree::{Bounds, Entry, Forest, ForestConfig, Namespace};
//!
//! let forest = Forest::new(ForestConfig::default())?;
//! let scores = Namespace::new("scores");
//! for (id, score) in [("ann", 12i64), ("bob", 7), ("cid", 30)] {
//!     forest.insert(&scores, Entry::new(score, id).with_summand(score as f64))?;
//! }
//! assert_eq!(3, forest.count(&scores, &Bounds::all())?);
//! assert_eq!(Some(49.0), forest.sum(&scores, &Bounds::all())?.as_single());
//! assert_eq!(Some("bob"), forest.at(&scores, 0, &Bounds::all())?.position.id());
//! # Ok::<(), aggtree::Error>(())
//! ```

pub mod aggregate_engine;
pub mod config;
pub mod error;
pub mod forest;
pub mod storage_engine;

pub use aggregate_engine::directory::{Namespace, TreeId};
pub use aggregate_engine::mutation::Entry;
pub use aggregate_engine::node_store::{Item, SumMode, Summand, Tally};
pub use aggregate_engine::position::{Bounds, KeyBound, Position, RawBounds, Value};
pub use aggregate_engine::query::{Order, Page};
pub use config::{ForestConfig, TreeConfig};
pub use error::{Error, Result};
pub use forest::{
    AtQuery, ClearOptions, Forest, IndexOptions, NamespacePage, PageRequest, RangeQuery,
};
