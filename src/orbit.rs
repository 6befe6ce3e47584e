//! Orbit remapping.
//!
//! The engine may replace a requested vector by an equivalent canonical point
//! (a permutation or sign flip of the indices), or find that it vanishes. The
//! caller still wants answers keyed by its own vectors, so each such pair gets
//! a synthesized point with a relation staged in the overlay:
//!
//! - resolved to zero: a point on the trivial sector with the unit relation
//!   `{(new, 1)}`
//! - resolved to a different vector: the resolved point's relation with its
//!   pivot redirected to the new point, or `{(resolved, -1), (new, 1)}` when
//!   the resolved point is a master
//! - same vector: the resolved point itself

use std::collections::BTreeSet;

use tracing::debug;

use crate::coeff::Coefficient;
use crate::config::OrbitSpec;
use crate::consolidate::MasterSet;
use crate::error::{Error, Result};
use crate::id::TRIVIAL_SECTOR;
use crate::overlay::TempOverlay;
use crate::point::{IndexVector, Point};
use crate::relation::Relation;
use crate::universe::PointUniverse;

/// A caller-supplied vector and the point the engine actually used for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrbitPair {
    pub original: IndexVector,
    pub resolved: Point,
}

impl OrbitPair {
    pub fn new(original: IndexVector, resolved: Point) -> Self {
        Self { original, resolved }
    }
}

/// Intern the resolved side of each orbit spec.
pub fn pairs_from_specs(specs: &[OrbitSpec], universe: &mut PointUniverse) -> Vec<OrbitPair> {
    specs
        .iter()
        .map(|spec| {
            let resolved = if spec.resolved_zero {
                Point::zero()
            } else {
                universe.intern(&spec.resolved)
            };
            OrbitPair::new(spec.original.clone(), resolved)
        })
        .collect()
}

/// Patch the output set for every orbit pair.
///
/// Starts from `masters` and returns the full set of points to publish.
pub fn remap<C: Coefficient>(
    pairs: &[OrbitPair],
    overlay: &mut TempOverlay<C>,
    universe: &mut PointUniverse,
    masters: MasterSet,
) -> Result<BTreeSet<Point>> {
    let mut output = masters;

    for pair in pairs {
        let resolved = &pair.resolved;

        if resolved.is_zero() {
            let new_point = universe.intern_in_sector(&pair.original, TRIVIAL_SECTOR);
            overlay.set(new_point.clone(), Relation::unit(new_point.clone()));
            debug!(point = ?new_point, "orbit vector maps to zero");
            output.insert(new_point);
        } else if pair.original.as_slice() != resolved.vector() {
            let new_point = universe.intern(&pair.original);
            let mut terms = overlay.get(resolved);
            if terms.is_empty() {
                terms = Relation::equivalence(resolved.clone(), new_point.clone());
            } else {
                let pivot_ok = terms.pivot().is_some_and(|t| t.point == *resolved);
                if !pivot_ok {
                    return Err(Error::invariant(
                        format!("{:?}", resolved),
                        &terms,
                        "cannot redirect a relation whose pivot is another point",
                    ));
                }
                terms.redirect_pivot(new_point.clone());
            }
            debug!(original = ?new_point, resolved = ?resolved, "orbit vector remapped");
            overlay.set(new_point.clone(), terms);
            output.insert(new_point);
        } else {
            output.insert(resolved.clone());
        }
    }

    Ok(output)
}
