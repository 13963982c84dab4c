use crate::{
    aggregate_engine::directory::{Namespace, TreeId, TreeRecord},
    aggregate_engine::documents::{get_doc, put_doc, DocKey},
    aggregate_engine::node_store::{create_node, NodeRecord},
    config::{validate_max_node_size, TreeConfig},
    error::{Error, Result},
    storage_engine::mvcc_storage::{deserialize, serialize, Transaction},
};
use log::info;

fn namespace_key(namespace: &Namespace) -> Result<DocKey> {
    Ok(DocKey::Namespace(serialize(namespace)?))
}

/// Looks up the tree of a namespace, if it was ever initialized.
pub fn get_tree(txn: &Transaction, namespace: &Namespace) -> Result<Option<TreeRecord>> {
    match get_doc::<TreeId>(txn, &namespace_key(namespace)?)? {
        Some(id) => get_doc(txn, &DocKey::Tree(id))?
            .map(Some)
            .ok_or_else(|| Error::Internal(format!("{} indexed but missing", id))),
        None => Ok(None),
    }
}

/// Looks up the tree of a namespace, failing with `TreeNotFound` if there is none.
pub fn must_get_tree(txn: &Transaction, namespace: &Namespace) -> Result<TreeRecord> {
    get_tree(txn, namespace)?.ok_or_else(|| Error::TreeNotFound(namespace.to_string()))
}

/// Creates an empty tree for a namespace that has none.
pub fn create_tree(
    txn: &mut Transaction,
    namespace: &Namespace,
    max_node_size: usize,
    root_lazy: bool,
) -> Result<TreeRecord> {
    validate_max_node_size(max_node_size)?;
    let tree = TreeRecord {
        id: TreeId::generate(),
        namespace: namespace.clone(),
        root: create_node(txn, &NodeRecord::empty_root(root_lazy))?,
        max_node_size,
        root_lazy,
        sum_mode: None,
    };
    put_doc(txn, &namespace_key(namespace)?, &tree.id)?;
    put_tree(txn, &tree)?;
    info!(
        "Created {} for namespace {} (max node size {}, lazy root {})",
        tree.id, namespace, max_node_size, root_lazy
    );
    Ok(tree)
}

/// Returns the tree of a namespace, creating it with the given defaults if needed.
pub fn get_or_create_tree(
    txn: &mut Transaction,
    namespace: &Namespace,
    defaults: &TreeConfig,
) -> Result<TreeRecord> {
    match get_tree(txn, namespace)? {
        Some(tree) => Ok(tree),
        None => create_tree(txn, namespace, defaults.max_node_size, defaults.root_lazy),
    }
}

pub fn put_tree(txn: &mut Transaction, tree: &TreeRecord) -> Result<()> {
    put_doc(txn, &DocKey::Tree(tree.id), tree)
}

/// Lists up to `limit` tree records in id order, starting after `after`. Also returns whether
/// the listing reached the last tree.
pub fn scan_trees(
    txn: &Transaction,
    after: Option<TreeId>,
    limit: usize,
) -> Result<(Vec<TreeRecord>, bool)> {
    let mut trees = Vec::new();
    for (key, value) in txn.scan_prefix(&DocKey::tree_prefix())? {
        let id = DocKey::decode_tree(&key)?;
        if after.map_or(false, |after| id <= after) {
            continue;
        }
        if trees.len() == limit {
            return Ok((trees, false));
        }
        trees.push(deserialize(&value)?);
    }
    Ok((trees, true))
}
