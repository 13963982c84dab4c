use crate::{
    aggregate_engine::position::{ExplodedKey, Marker, Part, Position, Value},
    error::{Error, Result},
};
use serde::{Deserialize, Serialize};

/// Which end of a range a bound sits at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Lower,
    Upper,
}

/// One end of a key range. Without an id, the bound covers every id at `key`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyBound {
    pub key: Value,
    pub id: Option<String>,
    pub inclusive: bool,
}

impl KeyBound {
    pub fn inclusive(key: impl Into<Value>) -> Self {
        Self { key: key.into(), id: None, inclusive: true }
    }

    pub fn exclusive(key: impl Into<Value>) -> Self {
        Self { key: key.into(), id: None, inclusive: false }
    }

    /// Restricts the bound to a single id at its key.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Range restriction for queries, either explicit ends or a tuple key prefix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Bounds {
    Range { lower: Option<KeyBound>, upper: Option<KeyBound> },
    Prefix(Vec<Value>),
}

impl Default for Bounds {
    fn default() -> Self {
        Self::all()
    }
}

impl Bounds {
    /// No restriction.
    pub fn all() -> Self {
        Self::Range { lower: None, upper: None }
    }

    pub fn between(lower: KeyBound, upper: KeyBound) -> Self {
        Self::Range { lower: Some(lower), upper: Some(upper) }
    }

    pub fn lower(lower: KeyBound) -> Self {
        Self::Range { lower: Some(lower), upper: None }
    }

    pub fn upper(upper: KeyBound) -> Self {
        Self::Range { lower: None, upper: Some(upper) }
    }

    pub fn prefix(prefix: Vec<Value>) -> Self {
        Self::Prefix(prefix)
    }

    /// Converts the bounds into a `[lower, upper)` pair of positions. Bound positions always
    /// contain sentinels, so they never coincide with an item.
    pub fn to_positions(&self) -> (Option<Position>, Option<Position>) {
        match self {
            Self::Range { lower, upper } => (
                lower.as_ref().map(|b| bound_to_position(Side::Lower, b)),
                upper.as_ref().map(|b| bound_to_position(Side::Upper, b)),
            ),
            Self::Prefix(prefix) => {
                let mut parts = Vec::with_capacity(prefix.len() * 2 + 1);
                for v in prefix {
                    parts.push(Part::Gap);
                    parts.push(Part::Key(v.clone()));
                }
                let mut low = parts.clone();
                low.push(Part::BeforeAll);
                parts.push(Part::AfterAll);
                (
                    Some(Position {
                        key: ExplodedKey::Tuple(low),
                        id: Marker::BeforeAll,
                        edge: Marker::BeforeAll,
                    }),
                    Some(Position {
                        key: ExplodedKey::Tuple(parts),
                        id: Marker::AfterAll,
                        edge: Marker::AfterAll,
                    }),
                )
            }
        }
    }
}

/// Converts one end of a range into a position. A lower bound that is inclusive starts before
/// every id at its key, an exclusive one after every id, and upper bounds mirror this.
pub fn bound_to_position(side: Side, bound: &KeyBound) -> Position {
    let before = match side {
        Side::Lower => bound.inclusive,
        Side::Upper => !bound.inclusive,
    };
    let (default_id, edge) = match before {
        true => (Marker::BeforeAll, Marker::BeforeAll),
        false => (Marker::AfterAll, Marker::AfterAll),
    };
    Position {
        key: ExplodedKey::explode(bound.key.clone()),
        id: bound.id.clone().map(Marker::Is).unwrap_or(default_id),
        edge,
    }
}

/// Loosely shaped bounds, as they arrive from outside: either ends or a prefix may be given,
/// not both.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawBounds {
    pub lower: Option<KeyBound>,
    pub upper: Option<KeyBound>,
    pub prefix: Option<Vec<Value>>,
}

impl TryFrom<RawBounds> for Bounds {
    type Error = Error;

    fn try_from(raw: RawBounds) -> Result<Self> {
        match raw {
            RawBounds { prefix: Some(_), lower: Some(_), .. }
            | RawBounds { prefix: Some(_), upper: Some(_), .. } => Err(Error::InvalidBounds(
                "prefix cannot be combined with lower or upper bounds".into(),
            )),
            RawBounds { prefix: Some(prefix), .. } => Ok(Bounds::Prefix(prefix)),
            RawBounds { lower, upper, prefix: None } => Ok(Bounds::Range { lower, upper }),
        }
    }
}
