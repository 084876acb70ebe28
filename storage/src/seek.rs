//! Seek results and boundary values used for range positioning.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Outcome of a binary search over a page or the whole index.
///
/// `P` is a slot index for page-level seeks and an [`ItemPointer`](crate::ItemPointer)
/// for index-level seeks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekResult<P> {
    /// The key is present at this position.
    Exact(P),
    /// The key is absent; this is the neighbouring position in the seek direction.
    Nearest(P),
    /// Nothing at or beyond the key in the seek direction.
    None,
}

impl<P> SeekResult<P> {
    pub fn position(self) -> Option<P> {
        match self {
            SeekResult::Exact(p) | SeekResult::Nearest(p) => Some(p),
            SeekResult::None => None,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, SeekResult::Exact(_))
    }

    pub fn map<Q>(self, f: impl FnOnce(P) -> Q) -> SeekResult<Q> {
        match self {
            SeekResult::Exact(p) => SeekResult::Exact(f(p)),
            SeekResult::Nearest(p) => SeekResult::Nearest(f(p)),
            SeekResult::None => SeekResult::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    pub fn invert(self) -> Self {
        match self {
            Direction::Positive => Direction::Negative,
            Direction::Negative => Direction::Positive,
        }
    }
}

/// Infinitesimal offset of an [`Entire::Value`] from its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shift {
    Exact,
    /// Just below the key: greater than every smaller key, less than the key itself.
    NegativeInfinitesimal,
    /// Just above the key.
    PositiveInfinitesimal,
}

impl Shift {
    fn rank(self) -> i8 {
        match self {
            Shift::NegativeInfinitesimal => -1,
            Shift::Exact => 0,
            Shift::PositiveInfinitesimal => 1,
        }
    }
}

/// A key extended with infinities and infinitesimal shifts.
///
/// Only ever compared against real keys (or other boundaries); a shifted value
/// never stands for an actual key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Entire<K> {
    NegativeInfinity,
    Value(K, Shift),
    PositiveInfinity,
}

impl<K> Entire<K> {
    pub fn exact(key: K) -> Self {
        Entire::Value(key, Shift::Exact)
    }

    pub fn above(key: K) -> Self {
        Entire::Value(key, Shift::PositiveInfinitesimal)
    }

    pub fn below(key: K) -> Self {
        Entire::Value(key, Shift::NegativeInfinitesimal)
    }

    /// Asymmetric comparison of this boundary against a real key.
    /// Only an unshifted value can compare equal.
    pub fn compare_key(&self, key: &K, compare: impl Fn(&K, &K) -> Ordering) -> Ordering {
        match self {
            Entire::NegativeInfinity => Ordering::Less,
            Entire::PositiveInfinity => Ordering::Greater,
            Entire::Value(value, shift) => match compare(value, key) {
                Ordering::Equal => shift.rank().cmp(&0),
                ordering => ordering,
            },
        }
    }

    pub fn compare(&self, other: &Entire<K>, compare: impl Fn(&K, &K) -> Ordering) -> Ordering {
        match (self, other) {
            (Entire::NegativeInfinity, Entire::NegativeInfinity)
            | (Entire::PositiveInfinity, Entire::PositiveInfinity) => Ordering::Equal,
            (Entire::NegativeInfinity, _) | (_, Entire::PositiveInfinity) => Ordering::Less,
            (Entire::PositiveInfinity, _) | (_, Entire::NegativeInfinity) => Ordering::Greater,
            (Entire::Value(a, a_shift), Entire::Value(b, b_shift)) => match compare(a, b) {
                Ordering::Equal => a_shift.rank().cmp(&b_shift.rank()),
                ordering => ordering,
            },
        }
    }
}

/// A boundary plus the direction in which a seek should settle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ray<K> {
    pub point: Entire<K>,
    pub direction: Direction,
}

impl<K> Ray<K> {
    pub fn new(point: Entire<K>, direction: Direction) -> Self {
        Self { point, direction }
    }
}

/// Binary search over `len` sorted slots; `probe(i)` orders the target against slot `i`.
///
/// Without an exact match, `Positive` settles on the first slot above the target
/// (`None` past the end) and `Negative` on the last slot below it (`None` before
/// the start).
pub(crate) fn seek_slots(
    len: usize,
    direction: Direction,
    probe: impl Fn(usize) -> Ordering,
) -> SeekResult<usize> {
    let mut low = 0;
    let mut high = len;
    while low < high {
        let mid = low + (high - low) / 2;
        match probe(mid) {
            Ordering::Greater => low = mid + 1,
            Ordering::Less => high = mid,
            Ordering::Equal => return SeekResult::Exact(mid),
        }
    }

    match direction {
        Direction::Positive if low < len => SeekResult::Nearest(low),
        Direction::Negative if low > 0 => SeekResult::Nearest(low - 1),
        _ => SeekResult::None,
    }
}

/// Range between two boundaries. Read forward when `first <= second`, backward otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange<K> {
    pub first: Entire<K>,
    pub second: Entire<K>,
}

impl<K> KeyRange<K> {
    pub fn new(first: Entire<K>, second: Entire<K>) -> Self {
        Self { first, second }
    }

    pub fn full() -> Self {
        Self::new(Entire::NegativeInfinity, Entire::PositiveInfinity)
    }

    /// Both endpoints included.
    pub fn closed(first: K, second: K) -> Self {
        Self::new(Entire::exact(first), Entire::exact(second))
    }

    pub fn direction(&self, compare: impl Fn(&K, &K) -> Ordering) -> Direction {
        match self.first.compare(&self.second, compare) {
            Ordering::Greater => Direction::Negative,
            _ => Direction::Positive,
        }
    }

    pub fn reversed(self) -> Self {
        Self::new(self.second, self.first)
    }
}
