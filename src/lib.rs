//! Sectordb: a sector-partitioned reduction database
//!
//! Points (integer index vectors) are routed to sectors and stored with the
//! reduction rule an external engine derived for them. After the engine runs,
//! the needed points are consolidated into master integrals plus single-level
//! relations, orbit-equivalent vectors are remapped, and the result is
//! published as a nested-bracket table.

pub mod coeff;
pub mod config;
pub mod consolidate;
pub mod engine;
pub mod error;
pub mod id;
pub mod needed;
pub mod orbit;
pub mod overlay;
pub mod pipeline;
pub mod point;
pub mod publish;
pub mod relation;
pub mod render;
pub mod store;
pub mod universe;

pub use coeff::{Coefficient, PrimeField, Rational};
pub use config::{Job, Mode, OrbitSpec, RunConfig, StorageMode};
pub use engine::{ReductionEngine, TableEngine};
pub use error::{Error, Result};
pub use needed::{NeededExpansion, NeededSet};
pub use overlay::TempOverlay;
pub use pipeline::{Run, RunSummary};
pub use point::Point;
pub use relation::{Relation, Term};
pub use render::Dialect;
pub use store::Registry;
pub use universe::PointUniverse;
