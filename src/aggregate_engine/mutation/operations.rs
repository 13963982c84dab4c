use crate::{
    aggregate_engine::directory::{create_tree, get_tree, put_tree, Namespace, TreeRecord},
    aggregate_engine::mutation::Writer,
    aggregate_engine::node_store::*,
    aggregate_engine::query,
    aggregate_engine::position::{Position, Value},
    config::{validate_max_node_size, TreeConfig},
    error::{Error, Result},
    storage_engine::mvcc_storage::Transaction,
};
use log::{debug, info};

/// A new item for a tree: where it goes, what it stores, and what it adds to sums.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub position: Position,
    pub value: Value,
    pub summand: Option<Summand>,
}

impl Entry {
    /// An entry storing its id as the value, with no summand.
    pub fn new(key: impl Into<Value>, id: impl Into<String>) -> Self {
        let id = id.into();
        let position = Position::new(key.into(), id.clone());
        Self { position, value: Value::String(id), summand: None }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_summand(mut self, summand: impl Into<Summand>) -> Self {
        self.summand = Some(summand.into());
        self
    }
}

/// Inserts an entry, creating the namespace's tree if needed. Fails with `DuplicateKey` if the
/// position is taken.
pub fn insert(
    txn: &mut Transaction,
    namespace: &Namespace,
    entry: Entry,
    defaults: &TreeConfig,
) -> Result<()> {
    Writer::open(txn, namespace, defaults)?.insert(entry.position, entry.value, entry.summand)
}

/// Inserts an entry unless its position is taken, in which case nothing changes, whatever the
/// entry's summand. Returns whether the entry was inserted.
pub fn insert_if_absent(
    txn: &mut Transaction,
    namespace: &Namespace,
    entry: Entry,
    defaults: &TreeConfig,
) -> Result<bool> {
    if let Some(tree) = get_tree(txn, namespace)? {
        if query::get(txn, &tree, &entry.position)?.is_some() {
            return Ok(false);
        }
    }
    insert(txn, namespace, entry, defaults)?;
    Ok(true)
}

/// Deletes the item at a position, failing with `NotFound` if there is none.
pub fn delete(txn: &mut Transaction, namespace: &Namespace, position: &Position) -> Result<Item> {
    Writer::existing(txn, namespace)?
        .delete(position)?
        .ok_or_else(|| Error::NotFound(position.to_string()))
}

/// Deletes the item at a position if there is one, returning it.
pub fn delete_if_exists(
    txn: &mut Transaction,
    namespace: &Namespace,
    position: &Position,
) -> Result<Option<Item>> {
    if get_tree(txn, namespace)?.is_none() {
        return Ok(None);
    }
    Writer::existing(txn, namespace)?.delete(position)
}

/// Moves an item to a new position, possibly in another namespace. Fails with `NotFound` if the
/// old position is empty and with `DuplicateKey` if the new one is taken. Both changes happen in
/// the given transaction.
pub fn replace(
    txn: &mut Transaction,
    namespace: &Namespace,
    position: &Position,
    new_namespace: &Namespace,
    entry: Entry,
    defaults: &TreeConfig,
) -> Result<()> {
    delete(txn, namespace, position)?;
    insert(txn, new_namespace, entry, defaults)
}

/// Like `replace`, but removes whatever is at either position and inserts regardless.
pub fn replace_or_insert(
    txn: &mut Transaction,
    namespace: &Namespace,
    position: &Position,
    new_namespace: &Namespace,
    entry: Entry,
    defaults: &TreeConfig,
) -> Result<()> {
    delete_if_exists(txn, namespace, position)?;
    delete_if_exists(txn, new_namespace, &entry.position)?;
    insert(txn, new_namespace, entry, defaults)
}

/// Empties a namespace's tree, deleting all its nodes, or creates it if it does not exist.
/// Parameters that are not given keep their previous values, or come from the defaults for a
/// new tree. The sum mode is reset, and fixed again by the next insert.
pub fn clear(
    txn: &mut Transaction,
    namespace: &Namespace,
    max_node_size: Option<usize>,
    root_lazy: Option<bool>,
    defaults: &TreeConfig,
) -> Result<TreeRecord> {
    let mut tree = match get_tree(txn, namespace)? {
        Some(tree) => tree,
        None => {
            return create_tree(
                txn,
                namespace,
                max_node_size.unwrap_or(defaults.max_node_size),
                root_lazy.unwrap_or(defaults.root_lazy),
            )
        }
    };
    let max_node_size = max_node_size.unwrap_or(tree.max_node_size);
    validate_max_node_size(max_node_size)?;
    let deleted = delete_subtree(txn, tree.root)?;
    tree.max_node_size = max_node_size;
    tree.root_lazy = root_lazy.unwrap_or(tree.root_lazy);
    tree.sum_mode = None;
    tree.root = create_node(txn, &NodeRecord::empty_root(tree.root_lazy))?;
    put_tree(txn, &tree)?;
    info!("Cleared namespace {}, deleting {} nodes", namespace, deleted);
    Ok(tree)
}

/// Deletes a node and everything below it, returning the number of nodes deleted.
fn delete_subtree(txn: &mut Transaction, id: NodeId) -> Result<usize> {
    let node = get_node(txn, id)?;
    let mut deleted = 1;
    for child in node.subtrees {
        deleted += delete_subtree(txn, child)?;
    }
    delete_node(txn, id)?;
    Ok(deleted)
}

/// Switches a namespace between a lazy and an eager root, creating its tree if needed. Going
/// eager computes the root aggregate before returning.
pub fn set_root_lazy(
    txn: &mut Transaction,
    namespace: &Namespace,
    lazy: bool,
    defaults: &TreeConfig,
) -> Result<()> {
    let mut tree = match get_tree(txn, namespace)? {
        Some(tree) => tree,
        None => {
            create_tree(txn, namespace, defaults.max_node_size, lazy)?;
            return Ok(());
        }
    };
    let mut root = get_node(txn, tree.root)?;
    match (lazy, root.aggregate.is_some()) {
        (true, true) => {
            root.aggregate = None;
            patch_node(txn, tree.root, &root)?;
        }
        (false, false) => {
            let mode = tree.sum_mode.unwrap_or(SumMode::Single);
            root.aggregate = Some(compute_tally(txn, &root, mode)?);
            patch_node(txn, tree.root, &root)?;
        }
        _ => {}
    }
    if tree.root_lazy != lazy {
        tree.root_lazy = lazy;
        put_tree(txn, &tree)?;
        debug!("Set root of namespace {} to {}", namespace, if lazy { "lazy" } else { "eager" });
    }
    Ok(())
}
