//! Error types for sectordb
//!
//! Absence is never an error here: a missing overlay entry or an empty
//! needed set means "no relation known". Only storage, output and data
//! integrity problems surface as [`Error`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::id::SectorId;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while preparing, consolidating or publishing.
#[derive(Debug, Error)]
pub enum Error {
    /// Backing medium for a sector is unreadable or corrupt.
    #[error("storage error in sector {sector}: {message}")]
    Storage { sector: SectorId, message: String },

    /// Writing the output table failed, including the fallback path.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A relation breaks an assumption the consolidator relies on.
    ///
    /// `point` and `terms` carry the offending data for the diagnostic dump.
    #[error("invariant violation at {point}: {reason}; terms = [{terms}]")]
    InvariantViolation {
        point: String,
        terms: String,
        reason: String,
    },

    /// Configuration or job description is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// The point universe file is unreadable or corrupt.
    #[error("point universe error: {0}")]
    Universe(String),

    /// A coefficient, point or rule could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a storage error for `sector`.
    pub fn storage(sector: SectorId, message: impl Into<String>) -> Self {
        Self::Storage {
            sector,
            message: message.into(),
        }
    }

    /// Create an invariant violation carrying a rendering of the offending data.
    pub fn invariant(
        point: impl ToString,
        terms: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvariantViolation {
            point: point.to_string(),
            terms: terms.to_string(),
            reason: reason.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_message_names_sector() {
        let err = Error::storage(7, "bad archive");
        assert_eq!(err.to_string(), "storage error in sector 7: bad archive");
    }

    #[test]
    fn test_invariant_dump() {
        let err = Error::invariant("{1,0}", "{1,0}*2", "pivot mismatch");
        let text = err.to_string();
        assert!(text.contains("{1,0}"));
        assert!(text.contains("pivot mismatch"));
    }
}
