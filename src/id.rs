//! Identifier types and status codes shared across the store
//!
//! Sectors are numbered from 1. Sector 1 is the trivial sector (no positive
//! indices); higher sectors encode the set of positive positions as a bitmask
//! offset by one.

/// Sector number. A point routes to exactly one sector.
pub type SectorId = u32;

/// Serial number of a point, used for display and in the output table.
/// `0` is reserved for the zero point.
pub type PointNumber = u64;

/// The "no constraints" sector that zero-mapped orbit points are placed on.
pub const TRIVIAL_SECTOR: SectorId = 1;

/// First sector scanned when collecting masters without relations.
pub const FIRST_SCANNED_SECTOR: SectorId = 2;

/// Raw status code: requested but not yet resolved by the engine.
pub const STATUS_PLACEHOLDER: u8 = 126;

/// Raw status code: confirmed master.
pub const STATUS_MASTER: u8 = 127;

/// Resume marker value meaning "sector not completed in a prior run".
pub const SECTOR_NOT_DONE: u8 = 0;

/// Resume marker value written once the engine has finished a sector.
pub const SECTOR_DONE: u8 = 1;
