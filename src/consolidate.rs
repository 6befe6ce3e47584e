//! Master classification and consolidation.
//!
//! After the engine has filled the database, every needed point is either a
//! master (no relation recorded) or reducible (a single-level relation whose
//! other terms are all masters). Full mode stages those relations into the
//! overlay; only-masters mode just collects entries whose status is `Master`.
//!
//! Membership in the master set depends only on database contents, the needed
//! set and the mode. Iteration order only affects logging.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::coeff::Coefficient;
use crate::config::Mode;
use crate::error::{Error, Result};
use crate::id::{SectorId, FIRST_SCANNED_SECTOR};
use crate::needed::NeededSet;
use crate::overlay::TempOverlay;
use crate::point::Point;
use crate::relation::Relation;
use crate::store::{Registry, Status};

/// Masters, in point order.
pub type MasterSet = BTreeSet<Point>;

/// Outcome of [`retain_needed`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetentionReport {
    /// Sectors with no needed point, emptied
    pub cleared: Vec<SectorId>,
    /// Sectors with needed points, pinned in memory
    pub kept: Vec<SectorId>,
    /// Entries erased from kept sectors
    pub erased: usize,
}

/// Bound memory before consolidation.
///
/// Sectors without needed points are cleared entirely. Sectors with needed
/// points lose their auxiliary indices and every non-needed entry, and are
/// marked `keep` so closing them leaves the map in memory.
pub fn retain_needed<C: Coefficient>(
    registry: &mut Registry<C>,
    needed: &NeededSet,
) -> Result<RetentionReport> {
    let mut report = RetentionReport::default();

    let sectors: BTreeSet<SectorId> = registry
        .sector_ids()
        .into_iter()
        .chain(needed.sector_ids())
        .collect();

    for sector in sectors {
        let Some(points) = needed.points_in(sector) else {
            registry.clear_sector(sector);
            report.cleared.push(sector);
            continue;
        };

        registry.open(sector)?;
        if let Some(db) = registry.sector_mut(sector) {
            db.set_keep(true);
            db.drop_auxiliary();
            report.erased += db.retain_points(points);
        }
        registry.close(sector)?;
        report.kept.push(sector);
    }

    info!(
        cleared = report.cleared.len(),
        kept = report.kept.len(),
        erased = report.erased,
        "retention pass done"
    );
    Ok(report)
}

fn check_pivot<C: Coefficient>(point: &Point, terms: &Relation<C>) -> Result<()> {
    match terms.pivot() {
        Some(pivot) if pivot.point == *point => Ok(()),
        Some(pivot) => Err(Error::invariant(
            format!("{:?}", point),
            terms,
            format!("relation pivot is {:?}, not the owning point", pivot.point),
        )),
        None => Ok(()),
    }
}

/// Full-mode classification. Stages every needed point's relation, and an
/// empty relation for each master it references.
///
/// Relations are assumed single-level: every point a relation refers to must
/// itself have no relation. This is checked, and a violation is fatal.
pub fn classify_full<C: Coefficient>(
    registry: &Registry<C>,
    needed: &NeededSet,
    overlay: &mut TempOverlay<C>,
) -> Result<MasterSet> {
    let mut masters = MasterSet::new();
    let mut unresolved = 0usize;

    for (_, points) in needed.iter() {
        for point in points {
            if registry.entry(point).map(|e| e.status) == Some(Status::Placeholder) {
                unresolved += 1;
            }

            let terms = registry.get(point);
            if terms.is_empty() {
                masters.insert(point.clone());
                continue;
            }

            check_pivot(point, &terms)?;
            for referenced in terms.references(point) {
                masters.insert(referenced.clone());
                overlay.set(referenced.clone(), Relation::empty());
            }
            overlay.set(point.clone(), terms);
        }
    }

    // Master closure
    for master in &masters {
        let staged = overlay.get(master);
        let recorded = registry.get(master);
        if !staged.is_empty() || !recorded.is_empty() {
            let terms = if staged.is_empty() { recorded } else { staged };
            return Err(Error::invariant(
                format!("{:?}", master),
                &terms,
                "referenced as a master but has a relation of its own",
            ));
        }
    }

    if unresolved > 0 {
        warn!(unresolved, "needed points still hold placeholders; treating them as masters");
    }
    info!(masters = masters.len(), staged = overlay.len(), "master integrals identified");
    Ok(masters)
}

/// Only-masters classification: every entry with status `Master` in sectors
/// `2..=max_sector` that exist on the backing medium.
pub fn classify_only_masters<C: Coefficient>(
    registry: &mut Registry<C>,
    max_sector: SectorId,
) -> Result<MasterSet> {
    let mut masters = MasterSet::new();

    for sector in FIRST_SCANNED_SECTOR..=max_sector {
        if !registry.exists(sector)? {
            continue;
        }
        registry.open(sector)?;
        if let Some(db) = registry.sector(sector) {
            let before = masters.len();
            masters.extend(
                db.entries()
                    .filter(|(_, e)| e.status == Status::Master)
                    .map(|(p, _)| p.clone()),
            );
            debug!(sector, found = masters.len() - before, "scanned sector for masters");
        }
        registry.close(sector)?;
    }

    info!(masters = masters.len(), "master integrals identified");
    Ok(masters)
}

/// Run the classification selected by `mode`. Full mode runs the retention
/// pass first.
pub fn consolidate<C: Coefficient>(
    registry: &mut Registry<C>,
    needed: &NeededSet,
    overlay: &mut TempOverlay<C>,
    mode: Mode,
    max_sector: SectorId,
) -> Result<MasterSet> {
    match mode {
        Mode::Full => {
            retain_needed(registry, needed)?;
            classify_full(registry, needed, overlay)
        }
        Mode::OnlyMasters => classify_only_masters(registry, max_sector),
    }
}
