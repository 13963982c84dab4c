use thiserror::Error;

/// Result returning the crate error.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors surfaced by the storage substrate and the aggregate trees.
///
/// Tree errors are detected locally and never retried internally. Only
/// `Serialization` is transient, and retrying it is up to the caller (see
/// `Forest`, which retries it a bounded number of times).
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
    /// The exact position is already present in the tree.
    #[error("key {0} already exists")]
    DuplicateKey(String),
    /// No item exists at the exact position.
    #[error("key {0} not found")]
    NotFound(String),
    /// Scalar and multi-metric summands mixed in one namespace.
    #[error("summand mode conflict: tree sums {expected} values, got {found}")]
    ModeConflict { expected: String, found: String },
    /// Offset outside `[0, count)`.
    #[error("offset {offset} out of range for {count} items")]
    RangeError { offset: i64, count: u64 },
    #[error("invalid bounds: {0}")]
    InvalidBounds(String),
    /// The namespace has never been initialized.
    #[error("tree not found for namespace {0}")]
    TreeNotFound(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("internal error: {0}")]
    Internal(String),
    /// A write attempted in a read-only transaction.
    #[error("read-only transaction")]
    ReadOnly,
    /// The transaction conflicted with a concurrent transaction.
    #[error("serialization failure, retry transaction")]
    Serialization,
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display() {
        assert_eq!("key 7 not found", Error::NotFound("7".into()).to_string());
        assert_eq!(
            "offset -3 out of range for 2 items",
            Error::RangeError { offset: -3, count: 2 }.to_string()
        );
    }

    #[test]
    fn bincode_conversion() {
        let err: Error = bincode::deserialize::<u64>(&[0x01]).unwrap_err().into();
        assert!(matches!(err, Error::Internal(_)));
    }
}
