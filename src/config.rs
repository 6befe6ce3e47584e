//! Run configuration and job descriptions.
//!
//! Both are TOML files:
//!
//! ```toml
//! # run.toml
//! mode = "full"            # or "only_masters"
//! storage = "disk"         # "memory" | "disk" | "resume"
//! database = "db/box"
//! output = "box.tables"
//! dialect = "legacy"       # or "uniform"
//! max_sector = 64
//! ```
//!
//! ```toml
//! # job.toml
//! points = [[1, 1, 0], [1, 1, -1]]
//!
//! [[orbits]]
//! original = [1, 0, 1]
//! resolved = [1, 1, 0]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::{SectorId, FIRST_SCANNED_SECTOR};
use crate::point::IndexVector;
use crate::render::Dialect;

/// Which classification runs after the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Relations for every needed point, plus orbit remapping
    #[default]
    Full,
    /// Only list confirmed masters
    OnlyMasters,
}

/// Where sector databases live and whether completed sectors are reused.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    #[default]
    Memory,
    Disk,
    /// Disk, skipping sectors whose resume marker is set
    Resume,
}

impl StorageMode {
    pub fn is_persistent(self) -> bool {
        !matches!(self, Self::Memory)
    }

    pub fn is_resume(self) -> bool {
        matches!(self, Self::Resume)
    }
}

/// Settings for one run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub mode: Mode,
    pub storage: StorageMode,
    /// Directory for sector archives (required unless `storage = "memory"`)
    pub database: Option<PathBuf>,
    pub output: PathBuf,
    pub dialect: Dialect,
    /// Highest sector scanned in only-masters mode
    pub max_sector: SectorId,
    /// Skip the run when the output already exists
    pub skip_if_exists: bool,
    /// Delete the database directory after a successful publish
    pub remove_database: bool,
    /// Directory for the fallback publish; defaults to the output's parent
    pub scratch_dir: Option<PathBuf>,
    /// Appended as `-suffix` to the database directory and output file stem
    pub suffix: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Full,
            storage: StorageMode::Memory,
            database: None,
            output: PathBuf::from("out.tables"),
            dialect: Dialect::Legacy,
            max_sector: 1 << 12,
            skip_if_exists: false,
            remove_database: false,
            scratch_dir: None,
            suffix: None,
        }
    }
}

impl RunConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.is_persistent() && self.database.is_none() {
            return Err(Error::config(format!(
                "storage = {:?} requires a database directory",
                self.storage
            )));
        }
        if self.mode == Mode::OnlyMasters && self.max_sector < FIRST_SCANNED_SECTOR {
            return Err(Error::config(format!(
                "max_sector must be at least {} in only_masters mode",
                FIRST_SCANNED_SECTOR
            )));
        }
        if self.output.as_os_str().is_empty() {
            return Err(Error::config("output path is empty"));
        }
        Ok(())
    }

    /// Output path with the suffix applied.
    pub fn output_path(&self) -> PathBuf {
        apply_suffix(&self.output, self.suffix.as_deref())
    }

    /// Database directory with the suffix applied.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database
            .as_deref()
            .map(|d| apply_suffix(d, self.suffix.as_deref()))
    }

    /// Fallback directory for the atomic publish.
    pub fn scratch_path(&self) -> PathBuf {
        match &self.scratch_dir {
            Some(dir) => dir.clone(),
            None => self
                .output_path()
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

fn apply_suffix(path: &Path, suffix: Option<&str>) -> PathBuf {
    let Some(suffix) = suffix.filter(|s| !s.is_empty()) else {
        return path.to_path_buf();
    };
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}-{}", stem, suffix),
    };
    path.with_file_name(name)
}

/// One externally supplied orbit pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrbitSpec {
    /// The caller's original vector
    pub original: IndexVector,
    /// The canonical vector the engine used; ignored when `resolved_zero`
    #[serde(default)]
    pub resolved: IndexVector,
    /// The original vector was mapped to zero
    #[serde(default)]
    pub resolved_zero: bool,
}

/// What to reduce.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Job {
    /// Requested index vectors
    pub points: Vec<IndexVector>,
    pub orbits: Vec<OrbitSpec>,
}

impl Job {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::config(e.to_string()))
    }
}
