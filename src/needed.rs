//! Needed sets and the placeholder resolver.
//!
//! The expansion rule deciding which points a request depends on belongs to
//! the reduction engine; it plugs in through [`NeededExpansion`]. This module
//! only materializes the result: for every needed sector, in ascending order,
//! a placeholder entry per needed point.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::coeff::Coefficient;
use crate::config::StorageMode;
use crate::error::Result;
use crate::id::{SectorId, SECTOR_NOT_DONE};
use crate::point::Point;
use crate::store::Registry;

/// Sector -> points that must have an entry before consolidation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NeededSet {
    sectors: BTreeMap<SectorId, BTreeSet<Point>>,
}

impl NeededSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from requested points through an expansion rule.
    pub fn expand<'a, E, I>(expansion: &E, requested: I) -> Self
    where
        E: NeededExpansion + ?Sized,
        I: IntoIterator<Item = &'a Point>,
    {
        let mut needed = Self::new();
        for point in requested {
            expansion.add_needed(&mut needed, point);
        }
        needed
    }

    /// Record `point` as needed in its own sector. Returns whether it was new.
    pub fn insert(&mut self, point: Point) -> bool {
        self.sectors.entry(point.sector()).or_default().insert(point)
    }

    pub fn contains(&self, point: &Point) -> bool {
        self.sectors
            .get(&point.sector())
            .is_some_and(|pts| pts.contains(point))
    }

    pub fn points_in(&self, sector: SectorId) -> Option<&BTreeSet<Point>> {
        self.sectors.get(&sector)
    }

    /// (sector, points) in ascending sector order.
    pub fn iter(&self) -> impl Iterator<Item = (SectorId, &BTreeSet<Point>)> {
        self.sectors.iter().map(|(&s, pts)| (s, pts))
    }

    pub fn sector_ids(&self) -> impl Iterator<Item = SectorId> + '_ {
        self.sectors.keys().copied()
    }

    /// All needed points, sector by sector.
    pub fn points(&self) -> impl Iterator<Item = &Point> {
        self.sectors.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.sectors.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.values().all(BTreeSet::is_empty)
    }

    /// One line per sector: `sector: count`, for listing what a run will touch.
    pub fn sector_listing(&self) -> String {
        self.sectors
            .iter()
            .map(|(s, pts)| format!("{}: {}", s, pts.len()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Rule deciding which points a requested point depends on.
pub trait NeededExpansion {
    fn add_needed(&self, needed: &mut NeededSet, point: &Point);
}

/// Each requested point is needed in its own sector and nothing else.
#[derive(Clone, Copy, Debug, Default)]
pub struct Direct;

impl NeededExpansion for Direct {
    fn add_needed(&self, needed: &mut NeededSet, point: &Point) {
        if !point.is_zero() {
            needed.insert(point.clone());
        }
    }
}

/// What [`resolve`] did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// Sectors opened and given placeholders
    pub prepared: Vec<SectorId>,
    /// Sectors skipped because a prior run completed them
    pub skipped: Vec<SectorId>,
    /// Placeholders actually inserted (existing entries are left alone)
    pub inserted: usize,
}

/// Insert a placeholder for every needed point, sector by sector in ascending
/// order. In resume mode sectors whose resume marker is set are skipped.
pub fn resolve<C: Coefficient>(
    registry: &mut Registry<C>,
    needed: &NeededSet,
    storage: StorageMode,
) -> Result<ResolveReport> {
    let mut report = ResolveReport::default();

    for (sector, points) in needed.iter() {
        if storage.is_resume() && registry.read_status(sector)? != SECTOR_NOT_DONE {
            debug!(sector, "sector completed in a prior run, skipping");
            report.skipped.push(sector);
            continue;
        }

        registry.open(sector)?;
        for point in points {
            if registry.insert_placeholder(point)? {
                report.inserted += 1;
            }
        }
        registry.close(sector)?;
        report.prepared.push(sector);
    }

    info!(
        prepared = report.prepared.len(),
        skipped = report.skipped.len(),
        placeholders = report.inserted,
        "needed sectors resolved"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::PointUniverse;

    #[test]
    fn test_direct_expansion_routes_by_sector() {
        let mut universe = PointUniverse::new();
        let a = universe.intern(&[1, 0]);
        let b = universe.intern(&[0, 1]);
        let c = universe.intern(&[2, 0]);
        let needed = NeededSet::expand(&Direct, [&a, &b, &c, &Point::zero()]);
        assert_eq!(needed.sector_ids().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(needed.len(), 3);
        assert!(needed.contains(&c));
        assert_eq!(needed.sector_listing(), "2: 2\n3: 1");
    }
}
