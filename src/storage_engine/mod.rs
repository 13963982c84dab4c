//! The storage substrate: an ordered key/value store with MVCC transactions on top.

pub mod encoding;
pub mod key_value_storage;
pub mod mvcc_storage;
