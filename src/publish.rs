//! Crash-safe publishing of the rendered table.
//!
//! The table is first written straight to the target and read back; the
//! first whitespace-delimited token must be `{`. If the write fails, the
//! check fails, or the target is missing afterwards, the same bytes go to a
//! temporary file in the scratch directory which is then renamed onto the
//! target. The rename is atomic, so after the fallback the target holds either
//! its previous content or the complete new table.
//!
//! The scratch directory must be on the same filesystem as the target for the
//! rename to succeed.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Which path the publish took.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Written and verified in place
    Direct,
    /// Written to scratch and renamed onto the target
    Fallback,
}

/// Publishes rendered tables to a target path.
#[derive(Clone, Debug)]
pub struct Publisher {
    target: PathBuf,
    scratch: PathBuf,
}

impl Publisher {
    pub fn new(target: impl Into<PathBuf>, scratch: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            scratch: scratch.into(),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Write `contents`, falling back to scratch-and-rename when needed.
    pub fn publish(&self, contents: &str) -> Result<PublishOutcome> {
        match self.write_direct(contents) {
            Ok(()) if self.verify()? => {
                debug!(path = %self.target.display(), "published table");
                return Ok(PublishOutcome::Direct);
            }
            Ok(()) => warn!(path = %self.target.display(), "published table failed verification"),
            Err(e) => warn!(path = %self.target.display(), error = %e, "direct write failed"),
        }

        let staged = self.stage(contents)?;
        self.commit(staged)?;
        debug!(path = %self.target.display(), scratch = %self.scratch.display(), "published table via scratch file");
        Ok(PublishOutcome::Fallback)
    }

    fn write_direct(&self, contents: &str) -> io::Result<()> {
        let mut file = fs::File::create(&self.target)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()
    }

    /// The target can be read back and its first token is the opening
    /// bracket. Any read error counts as a failed check.
    pub fn verify(&self) -> Result<bool> {
        match fs::read_to_string(&self.target) {
            Ok(text) => Ok(text.split_whitespace().next() == Some("{")),
            Err(e) => {
                debug!(path = %self.target.display(), error = %e, "could not read back published table");
                Ok(false)
            }
        }
    }

    /// Write `contents` to a fresh temporary file in the scratch directory.
    ///
    /// Dropping the returned file without [`Publisher::commit`] deletes it and
    /// leaves the target untouched.
    pub fn stage(&self, contents: &str) -> Result<NamedTempFile> {
        fs::create_dir_all(&self.scratch).map_err(|e| Error::write(&self.scratch, e))?;
        let mut tmp = NamedTempFile::new_in(&self.scratch).map_err(|e| Error::write(&self.scratch, e))?;
        tmp.write_all(contents.as_bytes())
            .map_err(|e| Error::write(tmp.path().to_path_buf(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| Error::write(tmp.path().to_path_buf(), e))?;
        Ok(tmp)
    }

    /// Atomically rename a staged file onto the target.
    pub fn commit(&self, staged: NamedTempFile) -> Result<()> {
        staged
            .persist(&self.target)
            .map(|_| ())
            .map_err(|e| Error::write(&self.target, e.error))
    }
}

/// Publish `contents` to `target` using `scratch` for the fallback.
pub fn publish(target: &Path, contents: &str, scratch: &Path) -> Result<PublishOutcome> {
    Publisher::new(target, scratch).publish(contents)
}
