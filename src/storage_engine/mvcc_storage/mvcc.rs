use crate::{
    error::Result,
    storage_engine::key_value_storage::{KvStore, Range},
    storage_engine::mvcc_storage::{deserialize, Key, Mode, Status, Transaction},
};
use std::sync::{Arc, RwLock};

/// An MVCC-based transactional key-value store.
pub struct MVCC {
    /// The underlying KV store. It is protected by a lock so it can be shared between txns.
    store: Arc<RwLock<Box<dyn KvStore>>>,
}

impl Clone for MVCC {
    fn clone(&self) -> Self {
        MVCC { store: self.store.clone() }
    }
}

impl MVCC {
    /// Creates a new MVCC key-value store with the given key-value store for storage.
    pub fn new(store: Box<dyn KvStore>) -> Self {
        Self { store: Arc::new(RwLock::new(store)) }
    }

    /// Begins a new transaction in read-write mode.
    pub fn begin(&self) -> Result<Transaction> {
        Transaction::begin(self.store.clone(), Mode::ReadWrite)
    }

    /// Begins a new transaction in the given mode.
    pub fn begin_with_mode(&self, mode: Mode) -> Result<Transaction> {
        Transaction::begin(self.store.clone(), mode)
    }

    /// Returns engine status
    pub fn status(&self) -> Result<Status> {
        let store = self.store.read()?;
        let txns = match store.get(&Key::TxnNext.encode())? {
            Some(ref v) => deserialize::<u64>(v)?,
            None => 1,
        } - 1;
        let txns_active = store
            .scan(Range::from(Key::TxnActive(0).encode()..Key::TxnActive(u64::MAX).encode()))
            .try_fold(0, |count, r| r.map(|_| count + 1))?;
        let keys = store.scan(Range::from(..)).try_fold(0, |count, r| r.map(|_| count + 1))?;
        Ok(Status { txns, txns_active, keys, storage: store.to_string() })
    }
}
