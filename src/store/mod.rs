//! Sector-partitioned reduction database.
//!
//! This module holds the persistent source of truth for reduction rules: one
//! [`SectorDb`] per sector, owned by a [`Registry`] that is scoped to a single
//! run and passed explicitly to every component.
//!
//! # Lifecycle
//!
//! - A sector's database is created on first reference.
//! - [`Registry::open`] starts a mutation session, loading the persisted
//!   archive if there is one.
//! - [`Registry::close`] ends it. On-disk registries flush dirty sectors and
//!   then release the in-memory map unless the sector is marked `keep`.
//!   In-memory registries only drop the session flag.
//!
//! # Module structure
//!
//! - [`sector`]: per-sector map, entry and status types
//! - [`persist`]: rkyv archive format and atomic save/load

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::coeff::Coefficient;
use crate::error::{Error, Result};
use crate::id::{SectorId, SECTOR_DONE, SECTOR_NOT_DONE};
use crate::point::Point;
use crate::relation::Relation;
use crate::universe::PointUniverse;

pub mod persist;
pub mod sector;

pub use sector::{ReductionEntry, SectorDb, Status};

// ============================================================================
// REGISTRY
// ============================================================================

/// Owner of every sector database touched during a run.
#[derive(Debug)]
pub struct Registry<C> {
    /// Directory for sector archives (None = in-memory only)
    dir: Option<PathBuf>,
    sectors: BTreeMap<SectorId, SectorDb<C>>,
}

impl<C: Coefficient> Registry<C> {
    /// Create a registry that never touches the filesystem
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            sectors: BTreeMap::new(),
        }
    }

    /// Create a registry persisting sectors under `dir`
    pub fn on_disk(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir: Some(dir),
            sectors: BTreeMap::new(),
        })
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn is_persistent(&self) -> bool {
        self.dir.is_some()
    }

    fn archive_path(&self, sector: SectorId) -> Option<PathBuf> {
        self.dir.as_deref().map(|d| persist::sector_path(d, sector))
    }

    fn db_mut(&mut self, sector: SectorId) -> &mut SectorDb<C> {
        let persistent = self.dir.is_some();
        self.sectors.entry(sector).or_insert_with(|| {
            let mut db = SectorDb::new(sector);
            // On disk the archive is the truth until the first open
            db.loaded = !persistent;
            db
        })
    }

    fn open_db_mut(&mut self, sector: SectorId) -> Result<&mut SectorDb<C>> {
        match self.sectors.get_mut(&sector) {
            Some(db) if db.open => Ok(db),
            _ => Err(Error::storage(sector, "sector is not open")),
        }
    }

    // ========================================================================
    // SESSION BRACKETING
    // ========================================================================

    /// Begin a mutation session. Idempotent while open.
    pub fn open(&mut self, sector: SectorId) -> Result<()> {
        let path = self.archive_path(sector);
        let db = self.db_mut(sector);
        if db.open {
            return Ok(());
        }

        if !db.loaded {
            if let Some(path) = path.filter(|p| p.exists()) {
                let mut loaded = persist::load_sector::<C>(sector, &path)?;
                loaded.keep = db.keep;
                *db = loaded;
                debug!(sector, entries = db.pmap.len(), "loaded sector archive");
            }
            db.loaded = true;
        }

        db.open = true;
        Ok(())
    }

    /// End a mutation session. No-op for sectors that are not open.
    pub fn close(&mut self, sector: SectorId) -> Result<()> {
        let path = self.archive_path(sector);
        let Some(db) = self.sectors.get_mut(&sector) else {
            return Ok(());
        };
        if !db.open {
            return Ok(());
        }

        if let Some(path) = path {
            if db.dirty {
                persist::save_sector(db, &path)?;
                db.dirty = false;
                debug!(sector, entries = db.pmap.len(), "flushed sector archive");
            }
            if !db.keep {
                db.clear();
                db.loaded = false;
            }
        }

        db.open = false;
        Ok(())
    }

    /// Close every open sector, in ascending order.
    pub fn close_all(&mut self) -> Result<()> {
        let open: Vec<SectorId> = self
            .sectors
            .iter()
            .filter(|(_, db)| db.open)
            .map(|(&s, _)| s)
            .collect();
        for sector in open {
            self.close(sector)?;
        }
        Ok(())
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Whether persisted state for `sector` is present on the backing medium.
    ///
    /// In-memory registries report sectors that have been created.
    pub fn exists(&self, sector: SectorId) -> Result<bool> {
        match self.archive_path(sector) {
            Some(path) => match fs::metadata(&path) {
                Ok(meta) => Ok(meta.is_file()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                Err(e) => Err(Error::storage(sector, e.to_string())),
            },
            None => Ok(self.sectors.contains_key(&sector)),
        }
    }

    /// Resume marker: `0` unless a prior run completed this sector.
    pub fn read_status(&self, sector: SectorId) -> Result<u8> {
        if let Some(db) = self.sectors.get(&sector) {
            if db.loaded {
                return Ok(db.completion);
            }
        }
        match self.archive_path(sector) {
            Some(path) if path.exists() => persist::read_completion(sector, &path),
            _ => Ok(SECTOR_NOT_DONE),
        }
    }

    /// Recorded terms for `point`, or an empty relation if absent.
    pub fn get(&self, point: &Point) -> Relation<C> {
        self.entry(point)
            .map(|e| e.terms.clone())
            .unwrap_or_default()
    }

    pub fn entry(&self, point: &Point) -> Option<&ReductionEntry<C>> {
        self.sectors
            .get(&point.sector())
            .and_then(|db| db.entry(point))
    }

    pub fn sector(&self, sector: SectorId) -> Option<&SectorDb<C>> {
        self.sectors.get(&sector)
    }

    pub fn sector_mut(&mut self, sector: SectorId) -> Option<&mut SectorDb<C>> {
        self.sectors.get_mut(&sector)
    }

    /// Sectors known to this registry, ascending.
    pub fn sector_ids(&self) -> Vec<SectorId> {
        self.sectors.keys().copied().collect()
    }

    // ========================================================================
    // MUTATION (requires an open session)
    // ========================================================================

    /// Insert a `Placeholder` entry for `point` unless one exists.
    ///
    /// Returns whether an entry was inserted. Never overwrites.
    pub fn insert_placeholder(&mut self, point: &Point) -> Result<bool> {
        let db = self.open_db_mut(point.sector())?;
        if db.pmap.contains_key(point) {
            return Ok(false);
        }
        db.pmap.insert(point.clone(), ReductionEntry::placeholder());
        db.dirty = true;
        Ok(true)
    }

    /// Store an entry for `point`. A master entry is terminal: replacing it
    /// with anything else is an invariant violation.
    pub fn record(&mut self, point: &Point, entry: ReductionEntry<C>) -> Result<()> {
        let db = self.open_db_mut(point.sector())?;
        if let Some(existing) = db.pmap.get(point) {
            if existing.status == Status::Master && entry != *existing {
                return Err(Error::invariant(
                    format!("{:?}", point),
                    &entry.terms,
                    "master entries are terminal",
                ));
            }
        }
        db.pmap.insert(point.clone(), entry);
        db.dirty = true;
        Ok(())
    }

    /// Mark `sector` as completed for resumed runs.
    pub fn mark_complete(&mut self, sector: SectorId) -> Result<()> {
        let db = self.open_db_mut(sector)?;
        if db.completion != SECTOR_DONE {
            db.completion = SECTOR_DONE;
            db.dirty = true;
        }
        Ok(())
    }

    /// Release a sector's contents entirely (pmap and auxiliary indices).
    pub fn clear_sector(&mut self, sector: SectorId) {
        if let Some(db) = self.sectors.get_mut(&sector) {
            db.clear();
            db.keep = false;
            debug!(sector, "cleared unneeded sector");
        }
    }

    /// Drop every `keep` pin. On disk, closed sectors are unloaded so the next
    /// open reads the archive again.
    pub fn release(&mut self) {
        let persistent = self.dir.is_some();
        for db in self.sectors.values_mut() {
            db.keep = false;
            if persistent && !db.open {
                db.clear();
                db.loaded = false;
            }
        }
    }

    /// Archived sectors in the backing directory, ascending.
    pub fn archived_sectors(&self) -> Result<Vec<SectorId>> {
        let Some(dir) = &self.dir else {
            return Ok(Vec::new());
        };
        let mut sectors: Vec<SectorId> = fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| persist::parse_sector_file(&e.file_name().to_string_lossy()))
            .collect();
        sectors.sort_unstable();
        Ok(sectors)
    }

    /// Bring every archive's point numbers in line with `universe`.
    ///
    /// Archives store serial numbers, but only the universe hands them out.
    /// Each archived point is interned, and archives whose numbers disagree are
    /// rewritten. Must run before any sector is opened. Returns how many
    /// archives were rewritten.
    pub fn adopt_numbering(&mut self, universe: &mut PointUniverse) -> Result<usize> {
        let Some(dir) = self.dir.clone() else {
            return Ok(0);
        };
        if let Some((&sector, _)) = self.sectors.iter().find(|(_, db)| db.open) {
            return Err(Error::storage(sector, "cannot renumber while a sector is open"));
        }

        let mut rewritten = 0usize;
        for sector in self.archived_sectors()? {
            let path = persist::sector_path(&dir, sector);
            let mut db = persist::load_sector::<C>(sector, &path)?;
            let changed = db.renumber(|p| universe.intern_in_sector(p.vector(), p.sector()));
            if changed > 0 {
                persist::save_sector(&db, &path)?;
                rewritten += 1;
                warn!(sector, changed, "archived point numbers disagreed with the universe; rewrote archive");
            }
            if let Some(cached) = self.sectors.get_mut(&sector) {
                cached.clear();
                cached.loaded = false;
            }
        }
        Ok(rewritten)
    }

    /// Delete the backing directory. In-memory registries just forget all sectors.
    pub fn remove_all(&mut self) -> Result<()> {
        self.sectors.clear();
        if let Some(dir) = &self.dir {
            match fs::remove_dir_all(dir) {
                Ok(()) => info!(dir = %dir.display(), "removed database directory"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
