use crate::{
    error::{Error, Result},
    storage_engine::key_value_storage::Scan as KvScan,
    storage_engine::mvcc_storage::{deserialize, Key, Snapshot},
};
use std::collections::BTreeMap;

/// A scan over the latest versions visible to a snapshot. Deleted records are skipped. The scan
/// is materialized up front, so it does not hold a lock on the store.
pub struct Scan {
    items: std::collections::btree_map::IntoIter<Vec<u8>, Vec<u8>>,
}

impl Scan {
    /// Collects the visible records of an underlying scan over `Key::Record` keys.
    pub fn new(mut scan: KvScan, snapshot: Snapshot) -> Result<Self> {
        let mut latest: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();
        while let Some((k, v)) = scan.next().transpose()? {
            match Key::decode(&k)? {
                // Versions of a key are scanned in ascending order, so the last visible one wins.
                Key::Record(key, version) => {
                    if snapshot.is_visible(version) {
                        latest.insert(key.into_owned(), deserialize(&v)?);
                    }
                }
                k => return Err(Error::Internal(format!("Expected Record, got {:?}", k))),
            }
        }
        let items: BTreeMap<Vec<u8>, Vec<u8>> =
            latest.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))).collect();
        Ok(Self { items: items.into_iter() })
    }
}

impl Iterator for Scan {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        self.items.next()
    }
}
