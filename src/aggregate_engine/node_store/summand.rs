use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display};

/// Whether a tree sums plain numbers or per-metric numbers. Fixed by the first write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SumMode {
    Single,
    Multi,
}

impl Display for SumMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Multi => write!(f, "multi"),
        }
    }
}

/// The value an item contributes to sums: a number, or a number per metric name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Summand {
    Single(f64),
    Multi(BTreeMap<String, f64>),
}

impl Default for Summand {
    fn default() -> Self {
        Self::Single(0.0)
    }
}

impl From<f64> for Summand {
    fn from(v: f64) -> Self {
        Self::Single(v)
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Summand {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self::Multi(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl Summand {
    /// The additive identity in the given mode.
    pub fn zero(mode: SumMode) -> Self {
        match mode {
            SumMode::Single => Self::Single(0.0),
            SumMode::Multi => Self::Multi(BTreeMap::new()),
        }
    }

    pub fn mode(&self) -> SumMode {
        match self {
            Self::Single(_) => SumMode::Single,
            Self::Multi(_) => SumMode::Multi,
        }
    }

    /// Fails with `ModeConflict` unless the summand is in the given mode.
    pub fn check_mode(&self, mode: SumMode) -> Result<()> {
        if self.mode() != mode {
            return Err(Error::ModeConflict {
                expected: mode.to_string(),
                found: self.mode().to_string(),
            });
        }
        Ok(())
    }

    /// The plain sum, if this is a single-mode summand.
    pub fn as_single(&self) -> Option<f64> {
        match self {
            Self::Single(v) => Some(*v),
            Self::Multi(_) => None,
        }
    }

    /// The sum of one metric, if this is a multi-mode summand. Absent metrics sum to zero.
    pub fn metric(&self, name: &str) -> Option<f64> {
        match self {
            Self::Single(_) => None,
            Self::Multi(metrics) => Some(metrics.get(name).cloned().unwrap_or(0.0)),
        }
    }

    pub fn add(&mut self, other: &Summand) -> Result<()> {
        self.combine(other, 1.0)
    }

    pub fn subtract(&mut self, other: &Summand) -> Result<()> {
        self.combine(other, -1.0)
    }

    /// Compares summands up to float rounding. Absent metrics count as zero.
    pub fn approx_eq(&self, other: &Summand) -> bool {
        fn close(a: f64, b: f64) -> bool {
            a == b || (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
        }
        match (self, other) {
            (Self::Single(a), Self::Single(b)) => close(*a, *b),
            (Self::Multi(a), Self::Multi(b)) => a
                .keys()
                .chain(b.keys())
                .all(|k| close(*a.get(k).unwrap_or(&0.0), *b.get(k).unwrap_or(&0.0))),
            _ => false,
        }
    }

    fn combine(&mut self, other: &Summand, sign: f64) -> Result<()> {
        match (self, other) {
            (Self::Single(a), Self::Single(b)) => *a += sign * b,
            (Self::Multi(a), Self::Multi(b)) => {
                for (name, v) in b {
                    *a.entry(name.clone()).or_insert(0.0) += sign * v;
                }
            }
            (a, b) => {
                return Err(Error::ModeConflict {
                    expected: a.mode().to_string(),
                    found: b.mode().to_string(),
                })
            }
        }
        Ok(())
    }
}

/// A cached `{count, sum}` aggregate over a subtree or a range.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    pub count: u64,
    pub sum: Summand,
}

impl Tally {
    pub fn empty(mode: SumMode) -> Self {
        Self { count: 0, sum: Summand::zero(mode) }
    }

    /// A tally of a single summand.
    pub fn of(summand: &Summand) -> Self {
        Self { count: 1, sum: summand.clone() }
    }

    pub fn add(&mut self, other: &Tally) -> Result<()> {
        self.sum.add(&other.sum)?;
        self.count += other.count;
        Ok(())
    }

    pub fn subtract(&mut self, other: &Tally) -> Result<()> {
        self.sum.subtract(&other.sum)?;
        self.count = self.count.checked_sub(other.count).ok_or_else(|| {
            Error::Internal(format!("Tally count {} below {}", self.count, other.count))
        })?;
        Ok(())
    }

    pub fn add_summand(&mut self, summand: &Summand) -> Result<()> {
        self.add(&Tally::of(summand))
    }

    pub fn subtract_summand(&mut self, summand: &Summand) -> Result<()> {
        self.subtract(&Tally::of(summand))
    }
}
