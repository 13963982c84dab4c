//! Typed documents on top of MVCC transactions: node records, tree records, and the namespace
//! index, each under its own key prefix.

use crate::{
    aggregate_engine::directory::TreeId,
    aggregate_engine::node_store::NodeId,
    error::{Error, Result},
    storage_engine::encoding::*,
    storage_engine::mvcc_storage::{deserialize, serialize, Transaction},
};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

const NODE_PREFIX: u8 = 0x10;
const TREE_PREFIX: u8 = 0x20;
const NAMESPACE_PREFIX: u8 = 0x21;

/// Document keys. Tree keys encode the id bytes as is, so trees scan in id order.
#[derive(Clone, Debug, PartialEq)]
pub enum DocKey {
    Node(NodeId),
    Tree(TreeId),
    /// Namespace index entry, keyed by the serialized namespace and pointing at its tree.
    Namespace(Vec<u8>),
}

impl DocKey {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Node(id) => [&[NODE_PREFIX][..], id.0.as_bytes()].concat(),
            Self::Tree(id) => [&[TREE_PREFIX][..], id.0.as_bytes()].concat(),
            Self::Namespace(ns) => [&[NAMESPACE_PREFIX][..], &encode_bytes(ns)].concat(),
        }
    }

    /// The prefix shared by all tree documents.
    pub fn tree_prefix() -> Vec<u8> {
        vec![TREE_PREFIX]
    }

    /// Decodes a tree document key.
    pub fn decode_tree(bytes: &[u8]) -> Result<TreeId> {
        let mut bytes = bytes;
        match take_byte(&mut bytes)? {
            TREE_PREFIX => Uuid::from_slice(bytes)
                .map(TreeId)
                .map_err(|e| Error::Internal(format!("Invalid tree key: {}", e))),
            b => Err(Error::Internal(format!("Expected tree key prefix, got {:x?}", b))),
        }
    }
}

pub fn get_doc<T: DeserializeOwned>(txn: &Transaction, key: &DocKey) -> Result<Option<T>> {
    txn.get(&key.encode())?.map(|bytes| deserialize(&bytes)).transpose()
}

pub fn put_doc<T: Serialize>(txn: &mut Transaction, key: &DocKey, doc: &T) -> Result<()> {
    txn.set(&key.encode(), serialize(doc)?)
}

pub fn delete_doc(txn: &mut Transaction, key: &DocKey) -> Result<()> {
    txn.delete(&key.encode())
}
