//! Run orchestration.
//!
//! A [`Run`] owns everything scoped to one invocation: the configuration, the
//! sector registry, the point universe and the temporary overlay. Executing a
//! job goes through these stages in order:
//!
//! 1. skip if the output already exists and the config asks for it
//! 2. intern requested points and orbit pairs, expand the needed set
//! 3. insert placeholders for every needed point
//! 4. let the engine reduce, then mark the prepared sectors complete
//! 5. consolidate into a master set (and staged relations, in full mode)
//! 6. remap orbit vectors (full mode only)
//! 7. render and publish the table
//! 8. close everything and optionally remove the database directory

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::coeff::Coefficient;
use crate::config::{Job, Mode, RunConfig, StorageMode};
use crate::consolidate::consolidate;
use crate::engine::ReductionEngine;
use crate::error::{Error, Result};
use crate::needed::{resolve, NeededExpansion, NeededSet};
use crate::orbit::{pairs_from_specs, remap, OrbitPair};
use crate::overlay::TempOverlay;
use crate::point::Point;
use crate::publish::{publish, PublishOutcome};
use crate::render::render_table;
use crate::store::Registry;
use crate::universe::PointUniverse;

/// File name of the persisted point universe inside the database directory.
pub const UNIVERSE_FILE: &str = "points.universe";

/// Points a job touches, before anything is written.
#[derive(Clone, Debug, Default)]
pub struct Plan {
    /// Requested points, in job order, without duplicates
    pub requested: Vec<Point>,
    /// One pair per requested point, then the job's explicit orbits
    pub pairs: Vec<OrbitPair>,
    pub needed: NeededSet,
}

impl Plan {
    /// Intern the job's vectors and expand the needed set.
    ///
    /// Every requested point gets an identity orbit pair so reducible points
    /// reach the output alongside the masters. The resolved side of each
    /// explicit orbit is requested as well.
    pub fn build<E>(job: &Job, expansion: &E, universe: &mut PointUniverse) -> Self
    where
        E: NeededExpansion + ?Sized,
    {
        fn push_unique(requested: &mut Vec<Point>, point: Point) {
            if !point.is_zero() && !requested.contains(&point) {
                requested.push(point);
            }
        }

        let mut requested: Vec<Point> = Vec::new();
        for vector in &job.points {
            push_unique(&mut requested, universe.intern(vector));
        }
        let explicit = pairs_from_specs(&job.orbits, universe);
        for pair in &explicit {
            push_unique(&mut requested, pair.resolved.clone());
        }

        let pairs = requested
            .iter()
            .map(|p| OrbitPair::new(p.vector().to_vec(), p.clone()))
            .chain(explicit)
            .collect();
        let needed = NeededSet::expand(expansion, &requested);

        Self {
            requested,
            pairs,
            needed,
        }
    }
}

/// What a finished run produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub output: PathBuf,
    /// `None` when the run was skipped because the output already existed
    pub outcome: Option<PublishOutcome>,
    pub needed: usize,
    pub masters: usize,
    /// Rows in the published table
    pub published: usize,
}

impl RunSummary {
    pub fn skipped(&self) -> bool {
        self.outcome.is_none()
    }
}

/// State for one invocation.
pub struct Run<C> {
    config: RunConfig,
    registry: Registry<C>,
    universe: PointUniverse,
    overlay: TempOverlay<C>,
}

impl<C: Coefficient> Run<C> {
    /// Prepare storage according to `config`.
    ///
    /// `disk` starts from an empty database directory; `resume` keeps what a
    /// prior run left, including the point numbering. Archived sectors are
    /// renumbered from the universe so a lost or stale number file cannot
    /// hand out a number twice.
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;

        let (registry, universe) = match config.database_path() {
            Some(dir) if config.storage.is_persistent() => {
                if config.storage == StorageMode::Disk {
                    match fs::remove_dir_all(&dir) {
                        Ok(()) => info!(dir = %dir.display(), "discarded previous database"),
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                let mut registry = Registry::on_disk(&dir)?;
                let mut universe = PointUniverse::load(dir.join(UNIVERSE_FILE)).map_err(Error::Universe)?;
                let rewritten = registry.adopt_numbering(&mut universe)?;
                if universe.is_dirty() {
                    universe.save().map_err(Error::Universe)?;
                }
                debug!(points = universe.len(), rewritten, "point universe ready");
                (registry, universe)
            }
            _ => (Registry::in_memory(), PointUniverse::new()),
        };

        Ok(Self {
            config,
            registry,
            universe,
            overlay: TempOverlay::new(),
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry<C> {
        &self.registry
    }

    pub fn universe(&self) -> &PointUniverse {
        &self.universe
    }

    /// Relations staged by the last execution.
    pub fn overlay(&self) -> &TempOverlay<C> {
        &self.overlay
    }

    /// Reduce `job` with `engine` and publish the table.
    pub fn execute<E>(&mut self, job: &Job, engine: &mut E) -> Result<RunSummary>
    where
        E: ReductionEngine<C>,
    {
        let output = self.config.output_path();
        if self.config.skip_if_exists && output.exists() {
            info!(path = %output.display(), "output exists, skipping");
            return Ok(RunSummary {
                output,
                outcome: None,
                needed: 0,
                masters: 0,
                published: 0,
            });
        }

        self.overlay.clear();
        let plan = Plan::build(job, &*engine, &mut self.universe);
        info!(
            requested = plan.requested.len(),
            needed = plan.needed.len(),
            sectors = plan.needed.sector_ids().count(),
            "job planned"
        );

        // Numbers must be on disk before any archive that carries them
        self.checkpoint_universe()?;
        let prepared = resolve(&mut self.registry, &plan.needed, self.config.storage)?;
        if !plan.requested.is_empty() {
            engine.reduce(&mut self.universe, &mut self.registry, &plan.needed)?;
            self.checkpoint_universe()?;
        }
        for &sector in &prepared.prepared {
            self.registry.open(sector)?;
            self.registry.mark_complete(sector)?;
            self.registry.close(sector)?;
        }

        let masters = consolidate(
            &mut self.registry,
            &plan.needed,
            &mut self.overlay,
            self.config.mode,
            self.config.max_sector,
        )?;
        let master_count = masters.len();

        let points = match self.config.mode {
            Mode::Full => remap(&plan.pairs, &mut self.overlay, &mut self.universe, masters)?,
            Mode::OnlyMasters => masters,
        };

        let table = render_table(&points, &self.overlay, self.config.dialect)?;
        let outcome = publish(&output, &table, &self.config.scratch_path())?;
        info!(path = %output.display(), rows = points.len(), ?outcome, "table published");

        self.finish()?;

        Ok(RunSummary {
            output,
            outcome: Some(outcome),
            needed: plan.needed.len(),
            masters: master_count,
            published: points.len(),
        })
    }

    /// Persist new point numbers, if the universe has a file.
    fn checkpoint_universe(&mut self) -> Result<()> {
        if self.universe.path().is_some() && self.universe.is_dirty() {
            self.universe.save().map_err(Error::Universe)?;
        }
        Ok(())
    }

    /// Flush and release storage after a successful publish.
    fn finish(&mut self) -> Result<()> {
        self.checkpoint_universe()?;
        self.registry.close_all()?;
        self.registry.release();
        if self.config.remove_database && self.registry.is_persistent() {
            self.registry.remove_all()?;
        }
        Ok(())
    }
}

/// Needed-sector listing for a job, without touching any storage.
pub fn sector_listing<E>(job: &Job, expansion: &E) -> String
where
    E: NeededExpansion + ?Sized,
{
    let mut universe = PointUniverse::new();
    Plan::build(job, expansion, &mut universe).needed.sector_listing()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::needed::Direct;

    #[test]
    fn test_plan_adds_identity_pairs() {
        let job = Job::from_toml("points = [[0, 1], [0, 1], [1, 0]]").unwrap();
        let mut universe = PointUniverse::new();
        let plan = Plan::build(&job, &Direct, &mut universe);
        assert_eq!(plan.requested.len(), 2);
        assert_eq!(plan.pairs.len(), 2);
        assert!(plan.pairs.iter().all(|p| p.original == p.resolved.vector()));
    }

    #[test]
    fn test_plan_requests_orbit_targets() {
        let job = Job::from_toml(
            "points = []\n\n[[orbits]]\noriginal = [1, 0]\nresolved = [0, 1]\n\n[[orbits]]\noriginal = [2, 0]\nresolved_zero = true\n",
        )
        .unwrap();
        let mut universe = PointUniverse::new();
        let plan = Plan::build(&job, &Direct, &mut universe);
        assert_eq!(plan.requested.len(), 1);
        assert_eq!(plan.requested[0].vector(), &[0, 1]);
        assert_eq!(plan.pairs.len(), 3);
        assert_eq!(plan.needed.len(), 1);
    }

    #[test]
    fn test_listing() {
        let job = Job::from_toml("points = [[0, 1], [0, 2], [1, 1]]").unwrap();
        assert_eq!(sector_listing(&job, &Direct), "3: 2\n4: 1");
    }
}
