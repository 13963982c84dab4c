use crate::{
    error::{Error, Result},
    storage_engine::key_value_storage::{KvStore, Range},
    storage_engine::mvcc_storage::{deserialize, Key, Snapshot},
};
use log::debug;
use std::collections::BTreeSet;

/// Returns the lowest version that an active or future snapshot may not see. Every committed
/// version below it is visible to all of them.
pub fn horizon(session: &dyn KvStore) -> Result<u64> {
    let mut horizon = match session.get(&Key::TxnNext.encode())? {
        Some(ref v) => deserialize(v)?,
        None => 1,
    };
    let mut active = Vec::new();
    let mut scan =
        session.scan(Range::from(Key::TxnActive(0).encode()..Key::TxnActive(u64::MAX).encode()));
    while let Some((key, _)) = scan.next().transpose()? {
        match Key::decode(&key)? {
            Key::TxnActive(id) => active.push(id),
            k => return Err(Error::Internal(format!("Expected TxnActive, got {:?}", k))),
        };
    }
    std::mem::drop(scan);
    for id in active {
        let snapshot = Snapshot::restore(session, id)?;
        horizon = horizon.min(id).min(snapshot.min_invisible());
    }
    Ok(horizon)
}

/// Removes the record versions superseded by transactions below the horizon, along with their
/// update markers. Returns the number of versions removed.
///
/// Update markers of a committed transaction stay until its writes fall below the horizon, so
/// versions kept alive by a long-running snapshot are reclaimed once it finishes.
pub fn collect_garbage(session: &mut dyn KvStore) -> Result<usize> {
    let horizon = horizon(session)?;
    let mut markers = Vec::new();
    let mut keys = BTreeSet::new();
    let mut scan = session.scan(Range::from(
        Key::TxnUpdate(0, vec![].into()).encode()..Key::TxnUpdate(horizon, vec![].into()).encode(),
    ));
    while let Some((marker, _)) = scan.next().transpose()? {
        let record = match Key::decode(&marker)? {
            Key::TxnUpdate(_, record) => record.into_owned(),
            k => return Err(Error::Internal(format!("Expected TxnUpdate, got {:?}", k))),
        };
        match Key::decode(&record)? {
            Key::Record(key, _) => keys.insert(key.into_owned()),
            k => return Err(Error::Internal(format!("Expected Record, got {:?}", k))),
        };
        markers.push(marker);
    }
    std::mem::drop(scan);

    let mut removed = 0;
    for key in keys.iter() {
        removed += prune(session, key, horizon)?;
    }
    for marker in markers.iter() {
        session.delete(marker)?;
    }
    if removed > 0 {
        debug!("Pruned {} versions of {} keys below version {}", removed, keys.len(), horizon);
    }
    Ok(removed)
}

/// Deletes the versions of a key below the horizon, except the newest one if it is live. Every
/// snapshot sees that version or a later one, and a deleted newest version reads the same as no
/// version at all.
fn prune(session: &mut dyn KvStore, key: &[u8], horizon: u64) -> Result<usize> {
    let range = Key::Record(key.into(), 0).encode()..Key::Record(key.into(), horizon).encode();
    let versions = session.scan(Range::from(range)).collect::<Result<Vec<_>>>()?;
    let live = match versions.last() {
        Some((_, v)) => deserialize::<Option<Vec<u8>>>(v)?.is_some(),
        None => false,
    };
    let removed = versions.len() - usize::from(live);
    for (version, _) in versions.iter().take(removed) {
        session.delete(version)?;
    }
    Ok(removed)
}
