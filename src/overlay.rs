//! Temp overlay: staged relations that never reach the persistent store.
//!
//! The consolidator stages every needed point's relation here (and an empty
//! relation for each master it references); the orbit remapper stages the
//! relations it synthesizes; the serializer reads only from here.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Registry (persisted, sector-partitioned)    │
//! └──────────────────────────────────────────────┘
//!                  │ copy on stage
//! ┌──────────────────────────────────────────────┐
//! │  TempOverlay (process lifetime, point-keyed) │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Staging keeps the first relation written for a point; later writes for the
//! same point are ignored.

use std::collections::BTreeMap;

use crate::coeff::Coefficient;
use crate::point::Point;
use crate::relation::Relation;

/// Point-keyed staging table.
#[derive(Clone, Debug)]
pub struct TempOverlay<C> {
    staged: BTreeMap<Point, Relation<C>>,
}

impl<C> Default for TempOverlay<C> {
    fn default() -> Self {
        Self {
            staged: BTreeMap::new(),
        }
    }
}

impl<C: Coefficient> TempOverlay<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `terms` for `point`. Returns false (and changes nothing) if the
    /// point already has a staged relation.
    pub fn set(&mut self, point: Point, terms: Relation<C>) -> bool {
        match self.staged.entry(point) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(terms);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Staged terms for `point`; empty if nothing was staged.
    pub fn get(&self, point: &Point) -> Relation<C> {
        self.staged.get(point).cloned().unwrap_or_default()
    }

    pub fn contains(&self, point: &Point) -> bool {
        self.staged.contains_key(point)
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Staged (point, relation) pairs in point order.
    pub fn iter(&self) -> impl Iterator<Item = (&Point, &Relation<C>)> {
        self.staged.iter()
    }

    /// Discard everything staged.
    pub fn clear(&mut self) {
        self.staged.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coeff::Rational;
    use crate::universe::PointUniverse;

    #[test]
    fn test_missing_is_empty() {
        let mut universe = PointUniverse::new();
        let p = universe.intern(&[1]);
        let overlay = TempOverlay::<Rational>::new();
        assert!(overlay.get(&p).is_empty());
        assert!(!overlay.contains(&p));
    }

    #[test]
    fn test_first_write_wins() {
        let mut universe = PointUniverse::new();
        let p = universe.intern(&[1]);
        let mut overlay = TempOverlay::<Rational>::new();
        assert!(overlay.set(p.clone(), Relation::unit(p.clone())));
        assert!(!overlay.set(p.clone(), Relation::empty()));
        assert_eq!(overlay.get(&p), Relation::unit(p));
    }
}
