use crate::{
    aggregate_engine::directory::TreeRecord,
    aggregate_engine::node_store::*,
    aggregate_engine::position::Position,
    error::Result,
    storage_engine::mvcc_storage::Transaction,
};
use serde::{Deserialize, Serialize};
use std::ops::Bound;

/// Scan direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

/// One page of a scan. `cursor` is the position of the last item returned, to be passed back for
/// the next page; `is_done` is set once no items remain after it.
#[derive(Clone, Debug, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
    pub cursor: Option<Position>,
    pub is_done: bool,
}

impl Page {
    pub fn done(cursor: Option<Position>) -> Self {
        Self { items: Vec::new(), cursor, is_done: true }
    }
}

/// Returns up to `limit` items of `[lower, upper)` in the given order, continuing strictly past
/// `cursor` when one is given. A limit of 0 is treated as 1.
pub fn paginate(
    txn: &Transaction,
    tree: &TreeRecord,
    lower: Option<&Position>,
    upper: Option<&Position>,
    order: Order,
    cursor: Option<&Position>,
    limit: usize,
) -> Result<Page> {
    let limit = limit.max(1);
    let mut start = lower.map_or(Bound::Unbounded, Bound::Included);
    let mut end = upper.map_or(Bound::Unbounded, Bound::Excluded);
    if let Some(cursor) = cursor {
        match order {
            Order::Asc => start = Bound::Excluded(cursor),
            Order::Desc => end = Bound::Excluded(cursor),
        }
    }

    // One item past the limit tells whether this is the last page.
    let mut items = Vec::with_capacity(limit + 1);
    let root = get_node(txn, tree.root)?;
    collect(txn, &root, start, end, order, limit + 1, &mut items)?;
    let is_done = items.len() <= limit;
    items.truncate(limit);
    let cursor = match items.last() {
        Some(item) => Some(item.position.clone()),
        None => cursor.cloned(),
    };
    Ok(Page { items, cursor, is_done })
}

/// Appends the node's items within the bounds to `out` in order, until it holds `want` items.
fn collect(
    txn: &Transaction,
    node: &NodeRecord,
    start: Bound<&Position>,
    end: Bound<&Position>,
    order: Order,
    want: usize,
    out: &mut Vec<Item>,
) -> Result<()> {
    if out.len() >= want {
        return Ok(());
    }
    let from = match start {
        Bound::Included(p) => node.items.partition_point(|item| &item.position < p),
        Bound::Excluded(p) => node.items.partition_point(|item| &item.position <= p),
        Bound::Unbounded => 0,
    };
    let to = match end {
        Bound::Included(p) => node.items.partition_point(|item| &item.position <= p),
        Bound::Excluded(p) => node.items.partition_point(|item| &item.position < p),
        Bound::Unbounded => node.items.len(),
    };
    if from > to {
        return Ok(());
    }
    let child_bounds = |index: usize| {
        (
            if index == from { start } else { Bound::Unbounded },
            if index == to { end } else { Bound::Unbounded },
        )
    };
    let visit = |index: usize, out: &mut Vec<Item>| -> Result<()> {
        if let Some(id) = node.subtrees.get(index) {
            let (start, end) = child_bounds(index);
            collect(txn, &get_node(txn, *id)?, start, end, order, want, out)?;
        }
        Ok(())
    };
    match order {
        Order::Asc => {
            for index in from..=to {
                visit(index, out)?;
                if index < to && out.len() < want {
                    out.push(node.items[index].clone());
                }
                if out.len() >= want {
                    break;
                }
            }
        }
        Order::Desc => {
            for index in (from..=to).rev() {
                visit(index, out)?;
                if index > from && out.len() < want {
                    out.push(node.items[index - 1].clone());
                }
                if out.len() >= want {
                    break;
                }
            }
        }
    }
    Ok(())
}
