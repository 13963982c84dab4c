use crate::{
    aggregate_engine::node_store::{NodeId, SumMode},
    aggregate_engine::position::Value,
};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use uuid::Uuid;

/// Handle of a tree record, the directory row of one namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TreeId(pub Uuid);

impl TreeId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tree:{}", self.0)
    }
}

/// A partition of the forest, each backed by its own tree. `Namespace::GLOBAL` is the single
/// implicit partition of an unpartitioned installation.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Namespace(pub Option<Value>);

impl Namespace {
    pub const GLOBAL: Namespace = Namespace(None);

    pub fn new(value: impl Into<Value>) -> Self {
        Self(Some(value.into()))
    }
}

impl From<Value> for Namespace {
    fn from(value: Value) -> Self {
        Self(Some(value))
    }
}

impl Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(v) => write!(f, "{}", v),
            None => write!(f, "<global>"),
        }
    }
}

/// The directory row of a namespace. `max_node_size` is fixed when the tree is created, and
/// `sum_mode` by its first insert; `root_lazy` can be toggled at any time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeRecord {
    pub id: TreeId,
    pub namespace: Namespace,
    pub root: NodeId,
    pub max_node_size: usize,
    pub root_lazy: bool,
    pub sum_mode: Option<SumMode>,
}
