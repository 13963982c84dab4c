use crate::{
    error::{Error, Result},
    storage_engine::key_value_storage::{KvStore, Range},
    storage_engine::mvcc_storage::{
        collect_garbage, deserialize, serialize, Key, Mode, Scan, Snapshot,
    },
};
use log::debug;
use std::collections::HashSet;
use std::ops::{Bound, RangeBounds};
use std::sync::{Arc, Mutex, RwLock};

/// An MVCC transaction.
///
/// Reads see the snapshot taken at begin, plus the transaction's own writes. Writes are stored as
/// new record versions tagged with the transaction ID, and stay invisible to other transactions
/// until commit. A read-write transaction fails with `Error::Serialization` if it writes a key
/// that a concurrent transaction has written, or (at commit) if a concurrent transaction wrote a
/// key it read.
pub struct Transaction {
    /// The underlying store for the transaction. Shared between transactions using a lock.
    store: Arc<RwLock<Box<dyn KvStore>>>,
    /// The unique transaction ID.
    id: u64,
    /// The transaction mode.
    mode: Mode,
    /// The snapshot that the transaction is running in.
    snapshot: Snapshot,
    /// Keys read by the transaction, validated at commit.
    reads: Mutex<HashSet<Vec<u8>>>,
}

impl Transaction {
    /// Begins a new transaction in the given mode.
    pub fn begin(store: Arc<RwLock<Box<dyn KvStore>>>, mode: Mode) -> Result<Self> {
        let mut session = store.write()?;

        let id = match session.get(&Key::TxnNext.encode())? {
            Some(ref v) => deserialize(v)?,
            None => 1,
        };
        session.set(&Key::TxnNext.encode(), serialize(&(id + 1))?)?;
        session.set(&Key::TxnActive(id).encode(), serialize(&mode)?)?;
        let snapshot = Snapshot::take(&mut **session, id)?;
        std::mem::drop(session);

        Ok(Self { store, id, mode, snapshot, reads: Mutex::new(HashSet::new()) })
    }

    /// Returns the transaction ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Commits the transaction, by validating its reads and removing the txn from the active set.
    /// A failed validation rolls the transaction back.
    pub fn commit(self) -> Result<()> {
        let mut session = self.store.write()?;
        if self.mode.mutable() {
            let reads = std::mem::take(&mut *self.reads.lock()?);
            for key in reads.iter() {
                if self.has_concurrent_version(&**session, key)? {
                    debug!("Txn {} read key {:x?} written concurrently, aborting", self.id, key);
                    std::mem::drop(session);
                    self.rollback()?;
                    return Err(Error::Serialization);
                }
            }
        }
        self.finish(&mut **session)
    }

    /// Rolls back the transaction, by removing all updated entries.
    pub fn rollback(self) -> Result<()> {
        let mut session = self.store.write()?;
        if self.mode.mutable() {
            let mut rollback = Vec::new();
            let mut scan = session.scan(Range::from(
                Key::TxnUpdate(self.id, vec![].into()).encode()
                    ..Key::TxnUpdate(self.id + 1, vec![].into()).encode(),
            ));
            while let Some((key, _)) = scan.next().transpose()? {
                match Key::decode(&key)? {
                    Key::TxnUpdate(_, updated_key) => rollback.push(updated_key.into_owned()),
                    k => return Err(Error::Internal(format!("Expected TxnUpdate, got {:?}", k))),
                };
                rollback.push(key);
            }
            std::mem::drop(scan);
            for key in rollback.into_iter() {
                session.delete(&key)?;
            }
        }
        self.finish(&mut **session)
    }

    /// Removes the txn from the active set and drops its snapshot, then prunes the versions that
    /// no remaining snapshot can see.
    fn finish(&self, session: &mut dyn KvStore) -> Result<()> {
        session.delete(&Key::TxnActive(self.id).encode())?;
        session.delete(&Key::TxnSnapshot(self.id).encode())?;
        collect_garbage(session)?;
        session.flush()
    }

    /// Deletes a key.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.write(key, None)
    }

    /// Fetches a key.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.mode.mutable() {
            self.reads.lock()?.insert(key.to_vec());
        }
        let session = self.store.read()?;
        let mut scan = session
            .scan(Range::from(
                Key::Record(key.into(), 0).encode()..=Key::Record(key.into(), self.id).encode(),
            ))
            .rev();
        while let Some((k, v)) = scan.next().transpose()? {
            match Key::decode(&k)? {
                Key::Record(_, version) => {
                    if self.snapshot.is_visible(version) {
                        return deserialize(&v);
                    }
                }
                k => return Err(Error::Internal(format!("Expected Txn::Record, got {:?}", k))),
            };
        }
        Ok(None)
    }

    /// Scans a key range.
    pub fn scan(&self, range: impl RangeBounds<Vec<u8>>) -> Result<Scan> {
        let start = match range.start_bound() {
            Bound::Excluded(k) => Bound::Excluded(Key::Record(k.into(), u64::MAX).encode()),
            Bound::Included(k) => Bound::Included(Key::Record(k.into(), 0).encode()),
            Bound::Unbounded => Bound::Included(Key::Record(vec![].into(), 0).encode()),
        };
        let end = match range.end_bound() {
            Bound::Excluded(k) => Bound::Excluded(Key::Record(k.into(), 0).encode()),
            Bound::Included(k) => Bound::Included(Key::Record(k.into(), u64::MAX).encode()),
            Bound::Unbounded => Bound::Unbounded,
        };
        let scan = self.store.read()?.scan(Range::from((start, end)));
        Scan::new(scan, self.snapshot.clone())
    }

    /// Scans keys under a given prefix.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Scan> {
        if prefix.is_empty() {
            return Err(Error::Internal("Scan prefix cannot be empty".into()));
        }
        let start = prefix.to_vec();
        let mut end = start.clone();
        for i in (0..end.len()).rev() {
            match end[i] {
                0xff if i == 0 => return Err(Error::Internal("Invalid prefix scan range".into())),
                0xff => {
                    end[i] = 0x00;
                    continue;
                }
                v => {
                    end[i] = v + 1;
                    break;
                }
            }
        }
        self.scan(start..end)
    }

    /// Sets a key.
    pub fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.write(key, Some(value))
    }

    /// Writes a value for a key. None is used for deletion.
    fn write(&self, key: &[u8], value: Option<Vec<u8>>) -> Result<()> {
        if !self.mode.mutable() {
            return Err(Error::ReadOnly);
        }
        let mut session = self.store.write()?;

        // Check if the key is dirty, i.e. if it has any uncommitted changes or changes committed
        // after our snapshot.
        if self.has_concurrent_version(&**session, key)? {
            return Err(Error::Serialization);
        }

        // Write the key and its update record.
        let key = Key::Record(key.into(), self.id).encode();
        let update = Key::TxnUpdate(self.id, (&key).into()).encode();
        session.set(&update, vec![])?;
        session.set(&key, serialize(&value)?)
    }

    /// Checks whether a key has a version written by another transaction that is invisible to
    /// our snapshot.
    fn has_concurrent_version(&self, session: &dyn KvStore, key: &[u8]) -> Result<bool> {
        let min = self.snapshot.min_invisible();
        let mut scan = session.scan(Range::from(
            Key::Record(key.into(), min).encode()..=Key::Record(key.into(), u64::MAX).encode(),
        ));
        while let Some((k, _)) = scan.next().transpose()? {
            match Key::decode(&k)? {
                Key::Record(_, version) => {
                    if version != self.id && !self.snapshot.is_visible(version) {
                        return Ok(true);
                    }
                }
                k => return Err(Error::Internal(format!("Expected Txn::Record, got {:?}", k))),
            };
        }
        Ok(false)
    }
}
