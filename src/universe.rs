//! Point universe: serial numbering for (sector, vector) keys
//!
//! Every point that enters the store is interned here once and receives a
//! compact serial number. Numbers are handed out sequentially starting at 1
//! (0 is the zero point), so a fixed request order always yields the same
//! numbering, and persisting the universe next to the database keeps numbers
//! stable across resumed runs.

use crate::id::{PointNumber, SectorId};
use crate::point::{sector_of, Point};
use indexmap::IndexSet;
use memmap2::Mmap;
use rkyv::ser::Serializer;
use rkyv::ser::serializers::AllocSerializer;
use rkyv::{Archive, Deserialize, Serialize, check_archived_root};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

type Key = (SectorId, Arc<[i16]>);

/// Bidirectional mapping between points and serial numbers.
///
/// - `intern(vector)` → Point (get or create, sector derived from the vector)
/// - `intern_in_sector(vector, sector)` → Point on an explicit sector
/// - `get(number)` → Point
/// - `lookup(vector, sector)` → Option<Point>
#[derive(Debug)]
pub struct PointUniverse {
    /// Number - 1 is the position in this set
    index: IndexSet<Key>,
    /// Path to the universe file (if persistent)
    path: Option<PathBuf>,
    /// Whether there are unsaved changes
    dirty: bool,
}

/// Serializable form of the universe for persistence
#[derive(Archive, Deserialize, Serialize)]
#[archive(check_bytes)]
struct UniverseData {
    entries: Vec<(u32, Vec<i16>)>,
}

impl PointUniverse {
    /// Create a new empty universe (in-memory only)
    pub fn new() -> Self {
        Self {
            index: IndexSet::new(),
            path: None,
            dirty: false,
        }
    }

    /// Create a new universe with a persistence path
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            index: IndexSet::new(),
            path: Some(path.into()),
            dirty: false,
        }
    }

    /// Load a universe from disk, or create empty if the file doesn't exist
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, String> {
        let path = path.into();

        if !path.exists() {
            return Ok(Self::with_path(path));
        }

        let file = File::open(&path).map_err(|e| format!("Failed to open universe file: {}", e))?;

        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| format!("Failed to mmap universe file: {}", e))?;

        if mmap.is_empty() {
            return Ok(Self::with_path(path));
        }

        let archived = check_archived_root::<UniverseData>(&mmap)
            .map_err(|e| format!("Failed to validate universe archive: {}", e))?;

        let data: UniverseData = archived
            .deserialize(&mut rkyv::Infallible)
            .map_err(|_| "Failed to deserialize universe")?;

        let index: IndexSet<Key> = data
            .entries
            .into_iter()
            .map(|(sector, indices)| (sector, Arc::from(indices)))
            .collect();

        debug!(points = index.len(), path = %path.display(), "loaded point universe");

        Ok(Self {
            index,
            path: Some(path),
            dirty: false,
        })
    }

    /// Save the universe to disk
    pub fn save(&mut self) -> Result<(), String> {
        let path = self
            .path
            .as_ref()
            .ok_or("Universe has no persistence path")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create universe directory: {}", e))?;
        }

        let data = UniverseData {
            entries: self
                .index
                .iter()
                .map(|(sector, indices)| (*sector, indices.to_vec()))
                .collect(),
        };

        let mut serializer = AllocSerializer::<1024>::default();
        serializer
            .serialize_value(&data)
            .map_err(|e| format!("Failed to serialize universe: {}", e))?;
        let bytes = serializer.into_serializer().into_inner();

        // Write atomically by writing to temp file then renaming
        let temp_path = path.with_extension("universe.tmp");
        {
            let mut file = File::create(&temp_path)
                .map_err(|e| format!("Failed to create temp universe file: {}", e))?;
            file.write_all(&bytes)
                .map_err(|e| format!("Failed to write universe file: {}", e))?;
            file.sync_all()
                .map_err(|e| format!("Failed to sync universe file: {}", e))?;
        }

        fs::rename(&temp_path, path)
            .map_err(|e| format!("Failed to rename universe file: {}", e))?;

        self.dirty = false;
        Ok(())
    }

    /// Intern a vector on the sector it routes to
    pub fn intern(&mut self, vector: &[i16]) -> Point {
        self.intern_in_sector(vector, sector_of(vector))
    }

    /// Intern a vector on an explicit sector, bypassing routing
    pub fn intern_in_sector(&mut self, vector: &[i16], sector: SectorId) -> Point {
        let key: Key = (sector, Arc::from(vector.to_vec()));
        let (idx, inserted) = self.index.insert_full(key);
        if inserted {
            self.dirty = true;
        }
        let (sector, indices) = &self.index[idx];
        Point::from_parts(Arc::clone(indices), *sector, idx as PointNumber + 1)
    }

    /// Get the point for a serial number
    pub fn get(&self, number: PointNumber) -> Option<Point> {
        if number == 0 {
            return Some(Point::zero());
        }
        let idx = usize::try_from(number - 1).ok()?;
        self.index
            .get_index(idx)
            .map(|(sector, indices)| Point::from_parts(Arc::clone(indices), *sector, number))
    }

    /// Look up an already interned vector on a sector
    pub fn lookup(&self, vector: &[i16], sector: SectorId) -> Option<Point> {
        let key: Key = (sector, Arc::from(vector.to_vec()));
        self.index
            .get_index_of(&key)
            .map(|idx| Point::from_parts(key.1.clone(), sector, idx as PointNumber + 1))
    }

    /// Number of interned points
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Check if there are unsaved changes
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Get the persistence path (if any)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Default for PointUniverse {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PointUniverse {
    fn drop(&mut self) {
        // Auto-save on drop if dirty and has a path
        if self.dirty && self.path.is_some() {
            let _ = self.save(); // Ignore errors on drop
        }
    }
}

// Property tests live in tests/proptest_universe.rs
