use serde::{Deserialize, Serialize};

/// An MVCC transaction mode.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Mode {
    /// A read-write transaction. Its reads are validated at commit, so committed read-write
    /// transactions are serializable.
    ReadWrite,
    /// A read-only transaction, reading a consistent snapshot. It never conflicts.
    ReadOnly,
}

impl Mode {
    /// Checks whether the transaction mode can mutate data.
    pub fn mutable(&self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}
