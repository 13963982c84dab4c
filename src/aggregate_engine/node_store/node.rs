use crate::{
    aggregate_engine::node_store::{Item, SumMode, Tally},
    aggregate_engine::position::Position,
    error::{Error, Result},
};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use uuid::Uuid;

/// Handle of a stored node. Parents refer to children by handle, never by ownership.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Allocates a fresh handle.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node:{}", self.0)
    }
}

/// A stored tree node. Leaves have no subtrees; internal nodes have one more subtree than items,
/// with every position under `subtrees[i]` below `items[i]`, and every position under
/// `subtrees[i + 1]` above it.
///
/// `aggregate` covers the whole subtree. It is only absent on a lazy root, where it is
/// recomputed from the children on demand.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub items: Vec<Item>,
    pub subtrees: Vec<NodeId>,
    pub aggregate: Option<Tally>,
}

impl NodeRecord {
    /// The root of an empty tree. An eager root starts out with a zero aggregate.
    pub fn empty_root(root_lazy: bool) -> Self {
        let aggregate = (!root_lazy).then(|| Tally::empty(SumMode::Single));
        Self { aggregate, ..Default::default() }
    }

    pub fn is_leaf(&self) -> bool {
        self.subtrees.is_empty()
    }

    /// Binary searches the node's items: `Ok(i)` if `items[i]` is at the position, otherwise
    /// `Err(i)` with `i` the index of the first item above it (and of the subtree covering it).
    pub fn search(&self, position: &Position) -> std::result::Result<usize, usize> {
        self.items.binary_search_by(|item| item.position.cmp(position))
    }

    /// The cached aggregate, which every non-root node carries.
    pub fn cached_tally(&self) -> Result<&Tally> {
        self.aggregate
            .as_ref()
            .ok_or_else(|| Error::Internal("Node has no cached aggregate".into()))
    }

    pub fn cached_tally_mut(&mut self) -> Result<&mut Tally> {
        self.aggregate
            .as_mut()
            .ok_or_else(|| Error::Internal("Node has no cached aggregate".into()))
    }
}
