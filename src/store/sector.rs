//! A single sector's reduction database.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::coeff::Coefficient;
use crate::id::{SectorId, SECTOR_NOT_DONE, STATUS_MASTER, STATUS_PLACEHOLDER};
use crate::point::Point;
use crate::relation::{Relation, Term};

/// Progress state of a reduction entry.
///
/// Only `Placeholder` and `Master` are interpreted here; engine codes are
/// carried through untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    /// Requested, not yet resolved by the engine (126)
    Placeholder,
    /// Confirmed master (127). Terminal.
    Master,
    /// Any other engine progress state
    Engine(u8),
}

impl Status {
    pub fn from_code(code: u8) -> Self {
        match code {
            STATUS_PLACEHOLDER => Self::Placeholder,
            STATUS_MASTER => Self::Master,
            other => Self::Engine(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Placeholder => STATUS_PLACEHOLDER,
            Self::Master => STATUS_MASTER,
            Self::Engine(code) => code,
        }
    }
}

/// What the database records for one point.
#[derive(Clone, Debug, PartialEq)]
pub struct ReductionEntry<C> {
    pub status: Status,
    /// Single-level relation, pivot last. Empty means no rule recorded.
    pub terms: Relation<C>,
}

impl<C: Coefficient> ReductionEntry<C> {
    pub fn placeholder() -> Self {
        Self {
            status: Status::Placeholder,
            terms: Relation::empty(),
        }
    }

    pub fn master() -> Self {
        Self {
            status: Status::Master,
            terms: Relation::empty(),
        }
    }

    /// An engine-resolved entry with its final status code.
    pub fn resolved(code: u8, terms: Relation<C>) -> Self {
        Self {
            status: Status::from_code(code),
            terms,
        }
    }
}

/// Per-sector state: the point map plus the engine's auxiliary indices.
#[derive(Debug)]
pub struct SectorDb<C> {
    pub(crate) sector: SectorId,
    /// Source of truth: point -> entry
    pub(crate) pmap: BTreeMap<Point, ReductionEntry<C>>,
    /// Engine auxiliary list, cleared during retention
    pub(crate) lower: Vec<Point>,
    /// Engine auxiliary lookup, cleared during retention
    pub(crate) umap: HashMap<Point, Vec<Point>>,
    /// Retain in memory across close
    pub(crate) keep: bool,
    /// Resume marker
    pub(crate) completion: u8,
    pub(crate) open: bool,
    pub(crate) dirty: bool,
    /// Whether `pmap` reflects the backing file (always true in memory)
    pub(crate) loaded: bool,
}

impl<C: Coefficient> SectorDb<C> {
    pub fn new(sector: SectorId) -> Self {
        Self {
            sector,
            pmap: BTreeMap::new(),
            lower: Vec::new(),
            umap: HashMap::new(),
            keep: false,
            completion: SECTOR_NOT_DONE,
            open: false,
            dirty: false,
            loaded: true,
        }
    }

    pub fn sector(&self) -> SectorId {
        self.sector
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn keep(&self) -> bool {
        self.keep
    }

    pub fn set_keep(&mut self, keep: bool) {
        self.keep = keep;
    }

    pub fn completion(&self) -> u8 {
        self.completion
    }

    pub fn len(&self) -> usize {
        self.pmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pmap.is_empty()
    }

    pub fn entry(&self, point: &Point) -> Option<&ReductionEntry<C>> {
        self.pmap.get(point)
    }

    /// Iterate entries in point order.
    pub fn entries(&self) -> impl Iterator<Item = (&Point, &ReductionEntry<C>)> {
        self.pmap.iter()
    }

    /// Engine-owned auxiliary list.
    pub fn lower_mut(&mut self) -> &mut Vec<Point> {
        self.dirty = true;
        &mut self.lower
    }

    /// Engine-owned auxiliary lookup.
    pub fn umap_mut(&mut self) -> &mut HashMap<Point, Vec<Point>> {
        self.dirty = true;
        &mut self.umap
    }

    /// Drop everything the sector holds in memory.
    pub fn clear(&mut self) {
        self.pmap.clear();
        self.lower.clear();
        self.umap.clear();
    }

    /// Drop the engine's auxiliary indices, keeping the point map.
    ///
    /// Memory only: the archive keeps the indices.
    pub fn drop_auxiliary(&mut self) {
        self.lower = Vec::new();
        self.umap.clear();
    }

    /// Replace the serial number on every point the sector mentions with the
    /// one `assign` hands out. Points are visited in map order, then terms,
    /// then the auxiliary indices. Returns how many numbers changed.
    pub fn renumber(&mut self, mut assign: impl FnMut(&Point) -> Point) -> usize {
        let mut changed = 0usize;
        let mut fix = |point: Point| {
            if point.is_zero() {
                return point;
            }
            let renumbered = assign(&point);
            if renumbered.number() != point.number() {
                changed += 1;
            }
            renumbered
        };

        let pmap = std::mem::take(&mut self.pmap);
        for (point, entry) in pmap {
            let point = fix(point);
            let terms = entry
                .terms
                .into_terms()
                .into_iter()
                .map(|t| Term::new(fix(t.point), t.coeff))
                .collect();
            self.pmap.insert(
                point,
                ReductionEntry {
                    status: entry.status,
                    terms: Relation::new(terms),
                },
            );
        }

        self.lower = std::mem::take(&mut self.lower).into_iter().map(&mut fix).collect();

        let mut umap: Vec<(Point, Vec<Point>)> = self.umap.drain().collect();
        umap.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, values) in umap {
            let key = fix(key);
            let values = values.into_iter().map(&mut fix).collect();
            self.umap.insert(key, values);
        }

        if changed > 0 {
            self.dirty = true;
        }
        changed
    }

    /// Keep only entries for `needed`; returns how many were erased.
    ///
    /// Memory only, like [`SectorDb::drop_auxiliary`]. A later flush of other
    /// changes would persist the trimmed map.
    pub fn retain_points(&mut self, needed: &BTreeSet<Point>) -> usize {
        let before = self.pmap.len();
        self.pmap.retain(|point, _| needed.contains(point));
        before - self.pmap.len()
    }
}
