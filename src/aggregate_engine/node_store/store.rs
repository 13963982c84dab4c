use crate::{
    aggregate_engine::documents::{delete_doc, get_doc, put_doc, DocKey},
    aggregate_engine::node_store::{NodeId, NodeRecord, SumMode, Tally},
    error::{Error, Result},
    storage_engine::mvcc_storage::Transaction,
};

/// Fetches a node, which must exist.
pub fn get_node(txn: &Transaction, id: NodeId) -> Result<NodeRecord> {
    get_doc(txn, &DocKey::Node(id))?
        .ok_or_else(|| Error::Internal(format!("{} referenced but missing", id)))
}

/// Stores a new node under a fresh handle.
pub fn create_node(txn: &mut Transaction, node: &NodeRecord) -> Result<NodeId> {
    let id = NodeId::generate();
    put_doc(txn, &DocKey::Node(id), node)?;
    Ok(id)
}

/// Replaces the stored contents of an existing node.
pub fn patch_node(txn: &mut Transaction, id: NodeId, node: &NodeRecord) -> Result<()> {
    put_doc(txn, &DocKey::Node(id), node)
}

pub fn delete_node(txn: &mut Transaction, id: NodeId) -> Result<()> {
    delete_doc(txn, &DocKey::Node(id))
}

/// The aggregate of a node's whole subtree: the cached one, or one recomputed from the node's
/// items and its children.
pub fn subtree_tally(txn: &Transaction, node: &NodeRecord, mode: SumMode) -> Result<Tally> {
    match &node.aggregate {
        Some(tally) => Ok(tally.clone()),
        None => compute_tally(txn, node, mode),
    }
}

/// Recomputes a node's aggregate, ignoring the one cached on the node itself.
pub fn compute_tally(txn: &Transaction, node: &NodeRecord, mode: SumMode) -> Result<Tally> {
    let mut tally = Tally::empty(mode);
    for item in &node.items {
        tally.add_summand(&item.summand)?;
    }
    for id in &node.subtrees {
        tally.add(&subtree_tally(txn, &get_node(txn, *id)?, mode)?)?;
    }
    Ok(tally)
}
