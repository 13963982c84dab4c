use crate::{
    error::Result,
    storage_engine::key_value_storage::{KvStore, Range, Scan},
};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::ops::Bound;

/// In-memory key-value store over an ordered map. Scans materialize the
/// requested range, so iterators don't hold on to the store.
#[derive(Default)]
pub struct KvMemory {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl Display for KvMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "memory")
    }
}

impl KvMemory {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for KvMemory {
    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.data.remove(key);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.get(key).cloned())
    }

    fn scan(&self, range: Range) -> Scan {
        // BTreeMap::range() panics on inverted ranges, which simply contain nothing.
        let inverted = match (&range.start, &range.end) {
            (Bound::Excluded(s), Bound::Excluded(e)) => s >= e,
            (Bound::Included(s) | Bound::Excluded(s), Bound::Included(e) | Bound::Excluded(e)) => {
                s > e
            }
            _ => false,
        };
        if inverted {
            return Box::new(std::iter::empty());
        }
        let items: Vec<Result<(Vec<u8>, Vec<u8>)>> =
            self.data.range(range).map(|(k, v)| Ok((k.clone(), v.clone()))).collect();
        Box::new(items.into_iter())
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.data.insert(key.to_vec(), value);
        Ok(())
    }
}
