//! Sector serialization.
//!
//! Each sector is one rkyv archive `sector_<n>.bin`. Coefficients are stored
//! as their textual rendering so the archive format does not depend on the
//! coefficient backend. Loading validates the archive (`check_archived_root`)
//! and reports anything malformed as a storage error for that sector.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use rkyv::ser::serializers::AllocSerializer;
use rkyv::ser::Serializer;
use rkyv::{check_archived_root, Archive, Deserialize, Serialize};

use crate::coeff::Coefficient;
use crate::error::{Error, Result};
use crate::id::SectorId;
use crate::point::Point;
use crate::relation::{Relation, Term};

use super::sector::{ReductionEntry, SectorDb, Status};

// ============================================================================
// SERIALIZABLE DATA TYPES
// ============================================================================

/// Serializable form of a point
#[derive(Archive, Deserialize, Serialize, Debug, Clone)]
#[archive(check_bytes)]
pub struct PointData {
    pub sector: u32,
    pub number: u64,
    pub indices: Vec<i16>,
}

/// Serializable form of a relation term
#[derive(Archive, Deserialize, Serialize, Debug, Clone)]
#[archive(check_bytes)]
pub struct TermData {
    pub point: PointData,
    pub coeff: String,
}

/// Serializable form of a reduction entry
#[derive(Archive, Deserialize, Serialize, Debug, Clone)]
#[archive(check_bytes)]
pub struct EntryData {
    pub point: PointData,
    pub status: u8,
    pub terms: Vec<TermData>,
}

/// Serializable form of a sector database
#[derive(Archive, Deserialize, Serialize, Debug, Clone)]
#[archive(check_bytes)]
pub struct SectorData {
    pub sector: u32,
    pub completion: u8,
    pub entries: Vec<EntryData>,
    pub lower: Vec<PointData>,
    pub umap: Vec<(PointData, Vec<PointData>)>,
}

impl PointData {
    fn from_point(point: &Point) -> Self {
        Self {
            sector: point.sector(),
            number: point.number(),
            indices: point.vector().to_vec(),
        }
    }

    /// The archived number is provisional; [`Registry::adopt_numbering`]
    /// reconciles it with the point universe.
    ///
    /// [`Registry::adopt_numbering`]: super::Registry::adopt_numbering
    fn to_point(&self) -> Point {
        if self.sector == 0 {
            return Point::zero();
        }
        Point::from_parts(Arc::from(self.indices.clone()), self.sector, self.number)
    }
}

impl SectorData {
    pub fn from_sector<C: Coefficient>(db: &SectorDb<C>) -> Self {
        let entries = db
            .pmap
            .iter()
            .map(|(point, entry)| EntryData {
                point: PointData::from_point(point),
                status: entry.status.code(),
                terms: entry
                    .terms
                    .terms()
                    .iter()
                    .map(|t| TermData {
                        point: PointData::from_point(&t.point),
                        coeff: t.coeff.to_string(),
                    })
                    .collect(),
            })
            .collect();

        let mut umap: Vec<(PointData, Vec<PointData>)> = db
            .umap
            .iter()
            .map(|(k, v)| (PointData::from_point(k), v.iter().map(PointData::from_point).collect()))
            .collect();
        // HashMap order is not stable; keep archives byte-identical across runs
        umap.sort_by(|a, b| (a.0.sector, &a.0.indices).cmp(&(b.0.sector, &b.0.indices)));

        Self {
            sector: db.sector,
            completion: db.completion,
            entries,
            lower: db.lower.iter().map(PointData::from_point).collect(),
            umap,
        }
    }

    /// Rebuild the in-memory sector. The result is closed and clean.
    pub fn to_sector<C: Coefficient>(&self) -> Result<SectorDb<C>> {
        let mut pmap = BTreeMap::new();
        for entry in &self.entries {
            let terms = entry
                .terms
                .iter()
                .map(|t| {
                    C::parse(&t.coeff)
                        .map(|c| Term::new(t.point.to_point(), c))
                        .map_err(|e| Error::storage(self.sector, e.to_string()))
                })
                .collect::<Result<Vec<_>>>()?;
            pmap.insert(
                entry.point.to_point(),
                ReductionEntry {
                    status: Status::from_code(entry.status),
                    terms: Relation::new(terms),
                },
            );
        }

        let umap: HashMap<Point, Vec<Point>> = self
            .umap
            .iter()
            .map(|(k, v)| (k.to_point(), v.iter().map(PointData::to_point).collect()))
            .collect();

        let mut db = SectorDb::new(self.sector);
        db.pmap = pmap;
        db.lower = self.lower.iter().map(PointData::to_point).collect();
        db.umap = umap;
        db.completion = self.completion;
        Ok(db)
    }
}

// ============================================================================
// SAVE / LOAD FUNCTIONS
// ============================================================================

/// File holding the archive for `sector` inside `dir`.
pub fn sector_path(dir: &Path, sector: SectorId) -> PathBuf {
    dir.join(format!("sector_{}.bin", sector))
}

/// Inverse of [`sector_path`] on a bare file name.
pub fn parse_sector_file(name: &str) -> Option<SectorId> {
    name.strip_prefix("sector_")?.strip_suffix(".bin")?.parse().ok()
}

/// Save a sector to a file, atomically (temp file + rename).
pub fn save_sector<C: Coefficient>(db: &SectorDb<C>, path: &Path) -> Result<()> {
    let sector = db.sector;
    let data = SectorData::from_sector(db);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::storage(sector, format!("Failed to create directory: {}", e)))?;
    }

    let mut serializer = AllocSerializer::<4096>::default();
    serializer
        .serialize_value(&data)
        .map_err(|e| Error::storage(sector, format!("Failed to serialize sector: {}", e)))?;
    let bytes = serializer.into_serializer().into_inner();

    let temp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&temp_path)
            .map_err(|e| Error::storage(sector, format!("Failed to create temp file: {}", e)))?;
        file.write_all(&bytes)
            .map_err(|e| Error::storage(sector, format!("Failed to write file: {}", e)))?;
        file.sync_all()
            .map_err(|e| Error::storage(sector, format!("Failed to sync file: {}", e)))?;
    }

    fs::rename(&temp_path, path)
        .map_err(|e| Error::storage(sector, format!("Failed to rename file: {}", e)))?;

    Ok(())
}

fn map_file(sector: SectorId, path: &Path) -> Result<Mmap> {
    let file = File::open(path)
        .map_err(|e| Error::storage(sector, format!("Failed to open {}: {}", path.display(), e)))?;
    let mmap = unsafe { Mmap::map(&file) }
        .map_err(|e| Error::storage(sector, format!("Failed to mmap {}: {}", path.display(), e)))?;
    if mmap.is_empty() {
        return Err(Error::storage(sector, "Empty sector file"));
    }
    Ok(mmap)
}

/// Load a sector from a file into memory.
pub fn load_sector<C: Coefficient>(sector: SectorId, path: &Path) -> Result<SectorDb<C>> {
    let mmap = map_file(sector, path)?;

    let archived = check_archived_root::<SectorData>(&mmap)
        .map_err(|e| Error::storage(sector, format!("Failed to validate archive: {}", e)))?;

    let data: SectorData = archived
        .deserialize(&mut rkyv::Infallible)
        .map_err(|_| Error::storage(sector, "Failed to deserialize sector"))?;

    if data.sector != sector {
        return Err(Error::storage(
            sector,
            format!("archive belongs to sector {}", data.sector),
        ));
    }

    data.to_sector()
}

/// Read only the resume marker, without deserializing the entries.
pub fn read_completion(sector: SectorId, path: &Path) -> Result<u8> {
    let mmap = map_file(sector, path)?;
    let archived = check_archived_root::<SectorData>(&mmap)
        .map_err(|e| Error::storage(sector, format!("Failed to validate archive: {}", e)))?;
    Ok(archived.completion)
}
