use crate::aggregate_engine::position::Value;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// A value extended with sentinels that sort before and after every real value. Variant order
/// is the sort order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Marker<T> {
    BeforeAll,
    Is(T),
    AfterAll,
}

/// One slot of an exploded tuple key. Tuple components alternate with gap slots, and range
/// bounds put sentinels into a gap slot to cover every key sharing a leading sub-tuple.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Part {
    BeforeAll,
    Gap,
    Key(Value),
    AfterAll,
}

/// A key as stored in positions. Scalars pass through; tuples are exploded to
/// `[Gap, k0, Gap, k1, ..., Gap]`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExplodedKey {
    Scalar(Value),
    Tuple(Vec<Part>),
}

impl ExplodedKey {
    pub fn explode(key: Value) -> Self {
        match key {
            Value::Array(values) => {
                let mut parts = Vec::with_capacity(values.len() * 2 + 1);
                parts.push(Part::Gap);
                for v in values {
                    parts.push(Part::Key(v));
                    parts.push(Part::Gap);
                }
                Self::Tuple(parts)
            }
            key => Self::Scalar(key),
        }
    }

    /// Recovers the original key. Sentinel slots only occur in bound positions, and are dropped.
    pub fn implode(&self) -> Value {
        match self {
            Self::Scalar(v) => v.clone(),
            Self::Tuple(parts) => Value::Array(
                parts
                    .iter()
                    .filter_map(|p| match p {
                        Part::Key(v) => Some(v.clone()),
                        _ => None,
                    })
                    .collect(),
            ),
        }
    }
}

/// The totally ordered stand-in for a `(key, id)` pair. Real items have `id = Is(id)` and
/// `edge = Is(())`; bounds use sentinels in `id` and `edge`, so a bound never equals a real
/// position.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub key: ExplodedKey,
    pub id: Marker<String>,
    pub edge: Marker<()>,
}

impl Position {
    /// Encodes a key and tie-breaking id as a position.
    pub fn new(key: Value, id: impl Into<String>) -> Self {
        Self { key: ExplodedKey::explode(key), id: Marker::Is(id.into()), edge: Marker::Is(()) }
    }

    /// The original key.
    pub fn key(&self) -> Value {
        self.key.implode()
    }

    /// The tie-breaking id, if this is a real item position.
    pub fn id(&self) -> Option<&str> {
        match &self.id {
            Marker::Is(id) => Some(id),
            _ => None,
        }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Marker::Is(id) => write!(f, "{}/{:?}", self.key(), id),
            Marker::BeforeAll => write!(f, "{}/-inf", self.key()),
            Marker::AfterAll => write!(f, "{}/+inf", self.key()),
        }
    }
}
