use crate::{
    aggregate_engine::directory::{
        get_or_create_tree, must_get_tree, put_tree, Namespace, TreeRecord,
    },
    aggregate_engine::node_store::*,
    aggregate_engine::position::{Position, Value},
    config::TreeConfig,
    error::{Error, Result},
    storage_engine::mvcc_storage::Transaction,
};
use log::debug;

/// Applies mutations to a single tree within a transaction.
///
/// Non-root nodes hold between `max_node_size` and twice that many items, and always carry an
/// exact cached aggregate. A node is only written when its items, children, or aggregate change,
/// so under a lazy root a write that does not restructure the root never touches it.
pub struct Writer<'a> {
    txn: &'a mut Transaction,
    tree: TreeRecord,
}

/// What an insertion did to a node, as seen by its parent.
enum Insertion {
    Unchanged,
    /// Modified in place, must be written.
    Changed,
    /// Overflowed and split: the median item and the new right sibling go into the parent. The
    /// left half stays in the node, which must be written.
    Split(Item, NodeId),
}

/// The item a removal descends towards.
#[derive(Clone, Copy)]
enum Target<'p> {
    At(&'p Position),
    Last,
}

impl<'a> Writer<'a> {
    /// Opens the tree of a namespace, creating it with the given defaults if needed.
    pub fn open(
        txn: &'a mut Transaction,
        namespace: &Namespace,
        defaults: &TreeConfig,
    ) -> Result<Self> {
        let tree = get_or_create_tree(txn, namespace, defaults)?;
        Ok(Self { txn, tree })
    }

    /// Opens the tree of a namespace, failing with `TreeNotFound` if there is none.
    pub fn existing(txn: &'a mut Transaction, namespace: &Namespace) -> Result<Self> {
        let tree = must_get_tree(txn, namespace)?;
        Ok(Self { txn, tree })
    }

    fn mode(&self) -> SumMode {
        self.tree.sum_mode.unwrap_or(SumMode::Single)
    }

    /// Inserts an item, failing with `DuplicateKey` if its position is taken. A missing summand
    /// counts as zero in the tree's mode.
    pub fn insert(
        &mut self,
        position: Position,
        value: Value,
        summand: Option<Summand>,
    ) -> Result<()> {
        let summand = self.admit(summand)?;
        let root_id = self.tree.root;
        let mut root = get_node(self.txn, root_id)?;
        match self.insert_into(&mut root, Item::new(position, value, summand))? {
            Insertion::Unchanged => Ok(()),
            Insertion::Changed => patch_node(self.txn, root_id, &root),
            Insertion::Split(median, right) => {
                patch_node(self.txn, root_id, &root)?;
                self.grow(median, right)
            }
        }
    }

    /// Checks a summand against the tree's sum mode, fixing the mode on the first insert.
    fn admit(&mut self, summand: Option<Summand>) -> Result<Summand> {
        if let Some(mode) = self.tree.sum_mode {
            let summand = summand.unwrap_or_else(|| Summand::zero(mode));
            summand.check_mode(mode)?;
            return Ok(summand);
        }
        let summand = summand.unwrap_or_default();
        let mode = summand.mode();
        self.tree.sum_mode = Some(mode);
        put_tree(self.txn, &self.tree)?;
        // Nothing was inserted yet, so an eager root only has to switch its zero.
        let mut root = get_node(self.txn, self.tree.root)?;
        if root.aggregate.as_ref().map_or(false, |t| t.sum.mode() != mode) {
            root.aggregate = Some(Tally::empty(mode));
            patch_node(self.txn, self.tree.root, &root)?;
        }
        debug!("Fixed sum mode of {} to {}", self.tree.id, mode);
        Ok(summand)
    }

    fn insert_into(&mut self, node: &mut NodeRecord, item: Item) -> Result<Insertion> {
        let index = match node.search(&item.position) {
            Ok(_) => return Err(Error::DuplicateKey(item.position.to_string())),
            Err(index) => index,
        };
        let mut changed = match &mut node.aggregate {
            Some(tally) => {
                tally.add_summand(&item.summand)?;
                true
            }
            None => false,
        };
        if node.is_leaf() {
            node.items.insert(index, item);
            changed = true;
        } else {
            let child_id = node.subtrees[index];
            let mut child = get_node(self.txn, child_id)?;
            match self.insert_into(&mut child, item)? {
                Insertion::Unchanged => {}
                Insertion::Changed => patch_node(self.txn, child_id, &child)?,
                Insertion::Split(median, right) => {
                    patch_node(self.txn, child_id, &child)?;
                    node.items.insert(index, median);
                    node.subtrees.insert(index + 1, right);
                    changed = true;
                }
            }
        }
        if node.items.len() > 2 * self.tree.max_node_size {
            let (median, right) = self.split(node)?;
            return Ok(Insertion::Split(median, right));
        }
        Ok(if changed { Insertion::Changed } else { Insertion::Unchanged })
    }

    /// Splits an overflowing node around its median. Both halves get exact aggregates, since
    /// neither of them is the root afterwards.
    fn split(&mut self, node: &mut NodeRecord) -> Result<(Item, NodeId)> {
        let at = self.tree.max_node_size;
        let items = node.items.split_off(at + 1);
        let median = node
            .items
            .pop()
            .ok_or_else(|| Error::Internal("Cannot split an empty node".into()))?;
        let subtrees = if node.is_leaf() { Vec::new() } else { node.subtrees.split_off(at + 1) };
        let mut right = NodeRecord { items, subtrees, aggregate: None };
        let mode = self.mode();
        right.aggregate = Some(compute_tally(self.txn, &right, mode)?);
        node.aggregate = Some(compute_tally(self.txn, node, mode)?);
        let right_id = create_node(self.txn, &right)?;
        debug!(
            "Split node of {} into {} and {} items",
            self.tree.id,
            node.items.len(),
            right.items.len()
        );
        Ok((median, right_id))
    }

    /// Puts a new root above a split root, growing the tree by one level.
    fn grow(&mut self, median: Item, right: NodeId) -> Result<()> {
        let subtrees = vec![self.tree.root, right];
        let mut root = NodeRecord { items: vec![median], subtrees, aggregate: None };
        if !self.tree.root_lazy {
            root.aggregate = Some(compute_tally(self.txn, &root, self.mode())?);
        }
        self.tree.root = create_node(self.txn, &root)?;
        put_tree(self.txn, &self.tree)?;
        debug!("Grew {} with new root {}", self.tree.id, self.tree.root);
        Ok(())
    }

    /// Removes the item at a position, returning it, or `None` if there is no such item.
    pub fn delete(&mut self, position: &Position) -> Result<Option<Item>> {
        let root_id = self.tree.root;
        let mut root = get_node(self.txn, root_id)?;
        let (removed, changed) = match self.remove_from(&mut root, Target::At(position))? {
            Some(removal) => removal,
            None => return Ok(None),
        };
        if root.items.is_empty() && !root.is_leaf() {
            self.shrink(root_id, root)?;
        } else if changed {
            patch_node(self.txn, root_id, &root)?;
        }
        Ok(Some(removed))
    }

    /// Replaces a root left without items by its only child, shrinking the tree by one level.
    fn shrink(&mut self, root_id: NodeId, root: NodeRecord) -> Result<()> {
        let child_id = root.subtrees[0];
        delete_node(self.txn, root_id)?;
        if self.tree.root_lazy {
            let mut child = get_node(self.txn, child_id)?;
            child.aggregate = None;
            patch_node(self.txn, child_id, &child)?;
        }
        self.tree.root = child_id;
        put_tree(self.txn, &self.tree)?;
        debug!("Shrunk {} to new root {}", self.tree.id, child_id);
        Ok(())
    }

    /// Removes the target item from the node's subtree, rebalancing the children it passes
    /// through. Returns the removed item and whether the node itself changed, or `None` if the
    /// target is not found. The caller writes the node.
    fn remove_from(
        &mut self,
        node: &mut NodeRecord,
        target: Target,
    ) -> Result<Option<(Item, bool)>> {
        let found = match target {
            Target::At(position) => node.search(position),
            Target::Last => Err(node.items.len()),
        };
        let (removed, mut changed) = if node.is_leaf() {
            match (found, target) {
                (Ok(index), _) => (node.items.remove(index), true),
                (Err(_), Target::Last) => match node.items.pop() {
                    Some(item) => (item, true),
                    None => return Err(Error::Internal("Cannot remove from an empty leaf".into())),
                },
                (Err(_), Target::At(_)) => return Ok(None),
            }
        } else {
            // An item found in an internal node is swapped with its predecessor, the last item
            // of the subtree to its left.
            let (index, target) = match found {
                Ok(index) => (index, Target::Last),
                Err(index) => (index, target),
            };
            let child_id = node.subtrees[index];
            let mut child = get_node(self.txn, child_id)?;
            let removed = match self.remove_from(&mut child, target)? {
                Some((item, _)) => item,
                None if found.is_ok() => {
                    return Err(Error::Internal(format!("{} has an empty subtree", child_id)))
                }
                None => return Ok(None),
            };
            let removed = match found {
                Ok(index) => std::mem::replace(&mut node.items[index], removed),
                Err(_) => removed,
            };
            let restructured = self.rebalance(node, index, child_id, child)?;
            (removed, found.is_ok() || restructured)
        };
        if let Some(tally) = &mut node.aggregate {
            tally.subtract_summand(&removed.summand)?;
            changed = true;
        }
        Ok(Some((removed, changed)))
    }

    /// Writes a child after a removal below it, first refilling it from a sibling if it dropped
    /// below the minimum occupancy. Returns whether the parent's items or children changed.
    fn rebalance(
        &mut self,
        parent: &mut NodeRecord,
        index: usize,
        child_id: NodeId,
        mut child: NodeRecord,
    ) -> Result<bool> {
        let min = self.tree.max_node_size;
        if child.items.len() >= min {
            patch_node(self.txn, child_id, &child)?;
            return Ok(false);
        }

        let mut left = match index.checked_sub(1).map(|i| parent.subtrees[i]) {
            Some(left_id) => Some((left_id, get_node(self.txn, left_id)?)),
            None => None,
        };
        if let Some((left_id, left)) = &mut left {
            if left.items.len() > min {
                self.rotate_right(parent, index, left, &mut child)?;
                patch_node(self.txn, *left_id, left)?;
                patch_node(self.txn, child_id, &child)?;
                debug!("Moved an item from {} into {}", left_id, child_id);
                return Ok(true);
            }
        }

        let mut right = match parent.subtrees.get(index + 1) {
            Some(&right_id) => Some((right_id, get_node(self.txn, right_id)?)),
            None => None,
        };
        if let Some((right_id, right)) = &mut right {
            if right.items.len() > min {
                self.rotate_left(parent, index, &mut child, right)?;
                patch_node(self.txn, *right_id, right)?;
                patch_node(self.txn, child_id, &child)?;
                debug!("Moved an item from {} into {}", right_id, child_id);
                return Ok(true);
            }
        }

        match (left, right) {
            (_, Some((right_id, right))) => {
                self.merge(parent, index, child_id, child, right_id, right)?
            }
            (Some((left_id, left)), None) => {
                self.merge(parent, index - 1, left_id, left, child_id, child)?
            }
            (None, None) => return Err(Error::Internal(format!("{} has no siblings", child_id))),
        }
        Ok(true)
    }

    /// The aggregate moved with an item and the subtree travelling alongside it.
    fn moved_tally(&self, item: &Item, subtree: Option<NodeId>) -> Result<Tally> {
        let mut tally = Tally::of(&item.summand);
        if let Some(id) = subtree {
            tally.add(get_node(self.txn, id)?.cached_tally()?)?;
        }
        Ok(tally)
    }

    /// Moves the last item of the left sibling up into the parent, and the parent's separator
    /// down to the front of the child.
    fn rotate_right(
        &mut self,
        parent: &mut NodeRecord,
        index: usize,
        left: &mut NodeRecord,
        child: &mut NodeRecord,
    ) -> Result<()> {
        let lent = left.items.pop().ok_or_else(|| Error::Internal("Empty sibling".into()))?;
        let subtree = left.subtrees.pop();
        left.cached_tally_mut()?.subtract(&self.moved_tally(&lent, subtree)?)?;
        let separator = std::mem::replace(&mut parent.items[index - 1], lent);
        child.cached_tally_mut()?.add(&self.moved_tally(&separator, subtree)?)?;
        child.items.insert(0, separator);
        if let Some(id) = subtree {
            child.subtrees.insert(0, id);
        }
        Ok(())
    }

    /// Moves the first item of the right sibling up into the parent, and the parent's separator
    /// down to the end of the child.
    fn rotate_left(
        &mut self,
        parent: &mut NodeRecord,
        index: usize,
        child: &mut NodeRecord,
        right: &mut NodeRecord,
    ) -> Result<()> {
        if right.items.is_empty() {
            return Err(Error::Internal("Empty sibling".into()));
        }
        let lent = right.items.remove(0);
        let subtree = if right.is_leaf() { None } else { Some(right.subtrees.remove(0)) };
        right.cached_tally_mut()?.subtract(&self.moved_tally(&lent, subtree)?)?;
        let separator = std::mem::replace(&mut parent.items[index], lent);
        child.cached_tally_mut()?.add(&self.moved_tally(&separator, subtree)?)?;
        child.items.push(separator);
        child.subtrees.extend(subtree);
        Ok(())
    }

    /// Merges the subtrees on either side of `parent.items[index]`, with the separator between
    /// them, into the left one.
    fn merge(
        &mut self,
        parent: &mut NodeRecord,
        index: usize,
        left_id: NodeId,
        mut left: NodeRecord,
        right_id: NodeId,
        right: NodeRecord,
    ) -> Result<()> {
        let separator = parent.items.remove(index);
        parent.subtrees.remove(index + 1);
        let tally = left.cached_tally_mut()?;
        tally.add_summand(&separator.summand)?;
        tally.add(right.cached_tally()?)?;
        left.items.push(separator);
        left.items.extend(right.items);
        left.subtrees.extend(right.subtrees);
        patch_node(self.txn, left_id, &left)?;
        delete_node(self.txn, right_id)?;
        debug!("Merged {} into {} ({} items)", right_id, left_id, left.items.len());
        Ok(())
    }
}
