use crate::{
    aggregate_engine::directory::TreeRecord,
    aggregate_engine::node_store::*,
    aggregate_engine::position::Position,
    error::{Error, Result},
    storage_engine::mvcc_storage::Transaction,
};

fn mode(tree: &TreeRecord) -> SumMode {
    tree.sum_mode.unwrap_or(SumMode::Single)
}

/// Counts and sums the items in `[lower, upper)`. Subtrees entirely inside the range contribute
/// their cached aggregates; only the children straddling a bound are descended into.
pub fn aggregate_between(
    txn: &Transaction,
    tree: &TreeRecord,
    lower: Option<&Position>,
    upper: Option<&Position>,
) -> Result<Tally> {
    tally_between(txn, &get_node(txn, tree.root)?, lower, upper, mode(tree))
}

fn tally_between(
    txn: &Transaction,
    node: &NodeRecord,
    lower: Option<&Position>,
    upper: Option<&Position>,
    mode: SumMode,
) -> Result<Tally> {
    if lower.is_none() && upper.is_none() {
        return subtree_tally(txn, node, mode);
    }
    let below = |p: &Position| node.items.partition_point(|item| &item.position < p);
    let start = lower.map_or(0, below);
    let end = upper.map_or(node.items.len(), below);
    let mut tally = Tally::empty(mode);
    if start > end {
        return Ok(tally);
    }
    for item in &node.items[start..end] {
        tally.add_summand(&item.summand)?;
    }
    if !node.is_leaf() {
        for index in start..=end {
            let child = get_node(txn, node.subtrees[index])?;
            let lower = if index == start { lower } else { None };
            let upper = if index == end { upper } else { None };
            tally.add(&tally_between(txn, &child, lower, upper, mode)?)?;
        }
    }
    Ok(tally)
}

/// The number of items in `[lower, position)`: the rank of the first item at or after
/// `position`, counted from the lower bound.
pub fn offset_of(
    txn: &Transaction,
    tree: &TreeRecord,
    position: &Position,
    lower: Option<&Position>,
) -> Result<u64> {
    Ok(aggregate_between(txn, tree, lower, Some(position))?.count)
}

/// The number of items in `[position, upper)`: the rank of the last item before `position`,
/// counted from the upper bound.
pub fn offset_until(
    txn: &Transaction,
    tree: &TreeRecord,
    position: &Position,
    upper: Option<&Position>,
) -> Result<u64> {
    Ok(aggregate_between(txn, tree, Some(position), upper)?.count)
}

/// The item at `offset` within `[lower, upper)`. Fails with `RangeError` unless there are more
/// than `offset` items in range.
pub fn at_offset(
    txn: &Transaction,
    tree: &TreeRecord,
    offset: u64,
    lower: Option<&Position>,
    upper: Option<&Position>,
) -> Result<Item> {
    let count = aggregate_between(txn, tree, lower, upper)?.count;
    if offset >= count {
        return Err(Error::RangeError { offset: offset as i64, count });
    }
    at_rank(txn, tree, offset, lower)
}

/// The item at `offset` counting back from the last one in `[lower, upper)`, so offset 0 is the
/// maximum. A `RangeError` reports the offset as the negative one it stands for.
pub fn at_negative_offset(
    txn: &Transaction,
    tree: &TreeRecord,
    offset: u64,
    lower: Option<&Position>,
    upper: Option<&Position>,
) -> Result<Item> {
    let count = aggregate_between(txn, tree, lower, upper)?.count;
    if offset >= count {
        return Err(Error::RangeError { offset: -(offset as i64) - 1, count });
    }
    at_rank(txn, tree, count - 1 - offset, lower)
}

/// Selects by global rank, after skipping the items below the lower bound.
fn at_rank(
    txn: &Transaction,
    tree: &TreeRecord,
    offset: u64,
    lower: Option<&Position>,
) -> Result<Item> {
    let before = match lower {
        Some(lower) => aggregate_between(txn, tree, None, Some(lower))?.count,
        None => 0,
    };
    select(txn, &get_node(txn, tree.root)?, before + offset)
}

fn select(txn: &Transaction, node: &NodeRecord, mut rank: u64) -> Result<Item> {
    if node.is_leaf() {
        return node
            .items
            .get(rank as usize)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("Rank {} beyond leaf", rank)));
    }
    for (index, id) in node.subtrees.iter().enumerate() {
        let child = get_node(txn, *id)?;
        let count = child.cached_tally()?.count;
        if rank < count {
            return select(txn, &child, rank);
        }
        rank -= count;
        if let Some(item) = node.items.get(index) {
            if rank == 0 {
                return Ok(item.clone());
            }
            rank -= 1;
        }
    }
    Err(Error::Internal(format!("Rank {} beyond subtree", rank)))
}

/// Looks up the item at an exact position.
pub fn get(txn: &Transaction, tree: &TreeRecord, position: &Position) -> Result<Option<Item>> {
    let mut node = get_node(txn, tree.root)?;
    loop {
        match node.search(position) {
            Ok(index) => return Ok(Some(node.items.swap_remove(index))),
            Err(_) if node.is_leaf() => return Ok(None),
            Err(index) => node = get_node(txn, node.subtrees[index])?,
        }
    }
}
