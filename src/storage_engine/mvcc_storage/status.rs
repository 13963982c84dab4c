use serde::{Deserialize, Serialize};

/// MVCC status
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// Transactions started so far.
    pub txns: u64,
    /// Transactions neither committed nor rolled back.
    pub txns_active: u64,
    /// Keys held by the underlying store, versions and metadata included.
    pub keys: u64,
    /// Description of the underlying key/value store.
    pub storage: String,
}
