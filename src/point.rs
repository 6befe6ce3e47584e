//! Points: the keys the database is partitioned and indexed by.
//!
//! A point is an index vector living on a sector, carrying the serial number
//! it was interned under (see [`crate::universe::PointUniverse`]). Equality and
//! hashing are structural on (sector, vector); the serial number is derived from
//! those by the universe and is never compared.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::id::{PointNumber, SectorId};

/// Index vector of a point.
pub type IndexVector = Vec<i16>;

/// An immutable, cheaply clonable point.
#[derive(Clone)]
pub struct Point {
    indices: Arc<[i16]>,
    sector: SectorId,
    number: PointNumber,
}

/// Sector a vector routes to: `1 + Σ 2^i` over the positive positions.
///
/// Vectors longer than 31 positions fold their tail into the top bit; the
/// reduction problems this is used for stay well below that.
pub fn sector_of(indices: &[i16]) -> SectorId {
    let mask = indices
        .iter()
        .enumerate()
        .filter(|(_, v)| **v > 0)
        .fold(0u32, |acc, (i, _)| acc | (1u32 << i.min(30)));
    mask + 1
}

impl Point {
    /// The distinguished zero point. It belongs to no sector (sector 0).
    pub fn zero() -> Self {
        Self {
            indices: Arc::from(Vec::new()),
            sector: 0,
            number: 0,
        }
    }

    /// Construct a point with an explicit sector and serial number.
    ///
    /// Callers outside the universe should go through
    /// [`crate::universe::PointUniverse::intern`] so numbers stay unique.
    pub(crate) fn from_parts(indices: Arc<[i16]>, sector: SectorId, number: PointNumber) -> Self {
        Self {
            indices,
            sector,
            number,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.sector == 0
    }

    pub fn sector(&self) -> SectorId {
        self.sector
    }

    /// Serial number for display.
    pub fn number(&self) -> PointNumber {
        self.number
    }

    /// Underlying index vector, used for orbit comparisons.
    pub fn vector(&self) -> &[i16] {
        &self.indices
    }

    fn positive_count(&self) -> usize {
        self.indices.iter().filter(|&&v| v > 0).count()
    }

    fn positive_sum(&self) -> i64 {
        self.indices.iter().filter(|&&v| v > 0).map(|&v| v as i64).sum()
    }

    fn negative_sum(&self) -> i64 {
        self.indices.iter().filter(|&&v| v < 0).map(|&v| -(v as i64)).sum()
    }
}

impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        self.sector == other.sector && self.indices == other.indices
    }
}

impl Eq for Point {}

impl Hash for Point {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sector.hash(state);
        self.indices.hash(state);
    }
}

/// Ascending specificity: simpler points first.
///
/// Zero point, then sector, number of positive indices, sum of positive
/// indices, sum of negated negative indices, and finally the vector itself.
impl Ord for Point {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sector
            .cmp(&other.sector)
            .then_with(|| self.positive_count().cmp(&other.positive_count()))
            .then_with(|| self.positive_sum().cmp(&other.positive_sum()))
            .then_with(|| self.negative_sum().cmp(&other.negative_sum()))
            .then_with(|| self.indices.cmp(&other.indices))
    }
}

impl PartialOrd for Point {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, v) in self.indices.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, "}}")
    }
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}{}", self.number, self.sector, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(v: &[i16], number: PointNumber) -> Point {
        Point::from_parts(Arc::from(v.to_vec()), sector_of(v), number)
    }

    #[test]
    fn test_sector_routing() {
        assert_eq!(sector_of(&[0, -1, 0]), 1);
        assert_eq!(sector_of(&[1, 0, 0]), 2);
        assert_eq!(sector_of(&[1, 1, 0]), 4);
        assert_eq!(sector_of(&[0, 2, 1]), 7);
    }

    #[test]
    fn test_equality_ignores_number() {
        assert_eq!(pt(&[1, 1], 3), pt(&[1, 1], 9));
    }

    #[test]
    fn test_order_simpler_first() {
        let a = pt(&[1, 1, 0], 1);
        let b = pt(&[2, 1, 0], 2);
        let c = pt(&[1, 1, -1], 3);
        assert!(a < b);
        assert!(a < c);
        assert!(Point::zero() < a);
    }

    #[test]
    fn test_display() {
        assert_eq!(pt(&[1, 0, -2], 1).to_string(), "{1,0,-2}");
    }
}
