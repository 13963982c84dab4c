//! Full-tree consistency checks.

use crate::{
    aggregate_engine::directory::TreeRecord,
    aggregate_engine::node_store::*,
    aggregate_engine::position::Position,
    error::{Error, Result},
    storage_engine::mvcc_storage::Transaction,
};

/// Walks a whole tree and checks its structure: item order within nodes and against separators,
/// child counts, equal leaf depth, node occupancy, exact cached aggregates, the root aggregate
/// matching the lazy flag, and summands matching the sum mode. Returns the tree's aggregate.
pub fn validate(txn: &Transaction, tree: &TreeRecord) -> Result<Tally> {
    let mut validator = Validator { txn, tree, leaf_depth: None };
    let root = get_node(txn, tree.root)?;
    match (tree.root_lazy, &root.aggregate) {
        (true, Some(_)) => return validator.fail(tree.root, "lazy root has a cached aggregate"),
        (false, None) => return validator.fail(tree.root, "eager root has no cached aggregate"),
        _ => {}
    }
    if tree.sum_mode.is_none() && !root.items.is_empty() {
        return validator.fail(tree.root, "items in a tree without a sum mode");
    }
    validator.check(tree.root, &root, 0, None, None)
}

struct Validator<'a> {
    txn: &'a Transaction,
    tree: &'a TreeRecord,
    leaf_depth: Option<usize>,
}

impl<'a> Validator<'a> {
    fn fail<T>(&self, id: NodeId, problem: &str) -> Result<T> {
        Err(Error::Internal(format!("Invalid {}: {} {}", self.tree.id, id, problem)))
    }

    fn check<'n>(
        &mut self,
        id: NodeId,
        node: &'n NodeRecord,
        depth: usize,
        lower: Option<&'n Position>,
        upper: Option<&'n Position>,
    ) -> Result<Tally> {
        let is_root = depth == 0;
        let max = 2 * self.tree.max_node_size;
        if node.items.len() > max {
            return self.fail(id, &format!("holds {} items, over {}", node.items.len(), max));
        }
        if !is_root && node.items.len() < self.tree.max_node_size {
            return self.fail(id, &format!("holds {} items, under the minimum", node.items.len()));
        }
        if !is_root && node.aggregate.is_none() {
            return self.fail(id, "has no cached aggregate");
        }

        let mut previous = lower;
        for item in &node.items {
            if previous.map_or(false, |p| p >= &item.position) {
                return self.fail(id, &format!("has {} out of order", item.position));
            }
            if let Some(mode) = self.tree.sum_mode {
                if item.summand.mode() != mode {
                    let found = item.summand.mode();
                    let problem = format!("has a {} summand in a {} tree", found, mode);
                    return self.fail(id, &problem);
                }
            }
            previous = Some(&item.position);
        }
        if let (Some(last), Some(upper)) = (previous, upper) {
            if last >= upper {
                return self.fail(id, &format!("has {} above its separator", last));
            }
        }

        let mode = self.tree.sum_mode.unwrap_or(SumMode::Single);
        let mut tally = Tally::empty(mode);
        for item in &node.items {
            tally.add_summand(&item.summand)?;
        }
        if node.is_leaf() {
            match self.leaf_depth {
                Some(expected) if expected != depth => {
                    let problem = format!("is a leaf at depth {}, expected {}", depth, expected);
                    return self.fail(id, &problem);
                }
                _ => self.leaf_depth = Some(depth),
            }
        } else {
            if node.subtrees.len() != node.items.len() + 1 {
                return self.fail(
                    id,
                    &format!("has {} items but {} subtrees", node.items.len(), node.subtrees.len()),
                );
            }
            if node.items.is_empty() {
                return self.fail(id, "is an internal node without items");
            }
            for (index, child_id) in node.subtrees.iter().enumerate() {
                let child = get_node(self.txn, *child_id)?;
                let lower = if index == 0 { lower } else { Some(&node.items[index - 1].position) };
                let upper = node.items.get(index).map(|item| &item.position).or(upper);
                tally.add(&self.check(*child_id, &child, depth + 1, lower, upper)?)?;
            }
        }

        if let Some(cached) = &node.aggregate {
            if cached.count != tally.count || !cached.sum.approx_eq(&tally.sum) {
                return self.fail(id, &format!("caches {:?}, actual {:?}", cached, tally));
            }
        }
        Ok(tally)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aggregate_engine::directory::{must_get_tree, put_tree, Namespace},
        aggregate_engine::mutation::{insert, Entry},
        config::TreeConfig,
        storage_engine::key_value_storage::KvMemory,
        storage_engine::mvcc_storage::MVCC,
    };
    use pretty_assertions::assert_eq;

    fn populated(txn: &mut Transaction) -> Result<TreeRecord> {
        let config = TreeConfig::new().with_max_node_size(2);
        for key in 0..12i64 {
            insert(txn, &Namespace::GLOBAL, Entry::new(key, "x").with_summand(1.0), &config)?;
        }
        must_get_tree(txn, &Namespace::GLOBAL)
    }

    fn first_child(txn: &Transaction, tree: &TreeRecord) -> Result<(NodeId, NodeRecord)> {
        let id = get_node(txn, tree.root)?.subtrees[0];
        Ok((id, get_node(txn, id)?))
    }

    #[test]
    fn valid_tree() -> Result<()> {
        let mvcc = MVCC::new(Box::new(KvMemory::new()));
        let mut txn = mvcc.begin()?;
        let tree = populated(&mut txn)?;
        assert_eq!(Some(12.0), validate(&txn, &tree)?.sum.as_single());
        txn.rollback()
    }

    #[test]
    fn detects_stale_aggregate() -> Result<()> {
        let mvcc = MVCC::new(Box::new(KvMemory::new()));
        let mut txn = mvcc.begin()?;
        let tree = populated(&mut txn)?;
        let (id, mut child) = first_child(&txn, &tree)?;
        child.cached_tally_mut()?.count += 1;
        patch_node(&mut txn, id, &child)?;
        assert!(matches!(validate(&txn, &tree), Err(Error::Internal(_))));
        txn.rollback()
    }

    #[test]
    fn detects_misordered_items() -> Result<()> {
        let mvcc = MVCC::new(Box::new(KvMemory::new()));
        let mut txn = mvcc.begin()?;
        let tree = populated(&mut txn)?;
        let (id, mut child) = first_child(&txn, &tree)?;
        child.items.swap(0, 1);
        patch_node(&mut txn, id, &child)?;
        assert!(matches!(validate(&txn, &tree), Err(Error::Internal(_))));
        txn.rollback()
    }

    #[test]
    fn detects_root_strategy_mismatch() -> Result<()> {
        let mvcc = MVCC::new(Box::new(KvMemory::new()));
        let mut txn = mvcc.begin()?;
        let mut tree = populated(&mut txn)?;
        tree.root_lazy = false;
        put_tree(&mut txn, &tree)?;
        assert!(matches!(validate(&txn, &tree), Err(Error::Internal(_))));
        txn.rollback()
    }
}
