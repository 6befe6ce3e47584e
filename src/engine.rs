//! Reduction engine seam.
//!
//! The engine that actually derives reduction rules is external. It sees the
//! registry after placeholders are in place and must leave every needed entry
//! either resolved (a single-level relation) or marked as a master.
//!
//! [`TableEngine`] replays a precomputed rule table:
//!
//! ```json
//! [
//!   { "point": [0, 1], "status": 5, "terms": [[[0, 2], "3"], [[0, 1], "2"]] }
//! ]
//! ```
//!
//! Terms are listed pivot last. Needed points missing from the table become
//! masters.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::coeff::Coefficient;
use crate::error::{Error, Result};
use crate::needed::{Direct, NeededExpansion, NeededSet};
use crate::point::{IndexVector, Point};
use crate::relation::{Relation, Term};
use crate::store::{ReductionEntry, Registry, Status};
use crate::universe::PointUniverse;

/// Status code recorded for table rules that do not name one.
pub const DEFAULT_RULE_STATUS: u8 = 1;

/// What an engine did to the registry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineReport {
    /// Placeholders replaced by a relation
    pub reduced: usize,
    /// Placeholders confirmed as masters
    pub masters: usize,
}

/// An external reducer.
///
/// The needed-set expansion rule belongs to the engine, hence the supertrait.
pub trait ReductionEngine<C: Coefficient>: NeededExpansion {
    fn reduce(
        &mut self,
        universe: &mut PointUniverse,
        registry: &mut Registry<C>,
        needed: &NeededSet,
    ) -> Result<EngineReport>;
}

/// One row of a rule table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub point: IndexVector,
    #[serde(default = "default_status")]
    pub status: u8,
    /// `(vector, coefficient)` pairs, pivot last
    pub terms: Vec<(IndexVector, String)>,
}

fn default_status() -> u8 {
    DEFAULT_RULE_STATUS
}

/// Engine that fills placeholders from a precomputed table.
#[derive(Debug)]
pub struct TableEngine<C> {
    rules: HashMap<IndexVector, RuleSpec>,
    _coeff: PhantomData<C>,
}

impl<C> Default for TableEngine<C> {
    fn default() -> Self {
        Self {
            rules: HashMap::new(),
            _coeff: PhantomData,
        }
    }
}

impl<C: Coefficient> TableEngine<C> {
    /// An empty table: every needed point becomes a master.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: impl IntoIterator<Item = RuleSpec>) -> Self {
        Self {
            rules: rules.into_iter().map(|r| (r.point.clone(), r)).collect(),
            _coeff: PhantomData,
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let rules: Vec<RuleSpec> =
            serde_json::from_str(text).map_err(|e| Error::parse(format!("rule table: {}", e)))?;
        Ok(Self::from_rules(rules))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn relation(&self, rule: &RuleSpec, universe: &mut PointUniverse) -> Result<Relation<C>> {
        rule.terms
            .iter()
            .map(|(vector, coeff)| {
                let point = if vector.is_empty() {
                    Point::zero()
                } else {
                    universe.intern(vector)
                };
                Ok(Term::new(point, C::parse(coeff)?))
            })
            .collect::<Result<Vec<_>>>()
            .map(Relation::new)
    }
}

impl<C: Coefficient> NeededExpansion for TableEngine<C> {
    fn add_needed(&self, needed: &mut NeededSet, point: &Point) {
        Direct.add_needed(needed, point);
    }
}

impl<C: Coefficient> ReductionEngine<C> for TableEngine<C> {
    fn reduce(
        &mut self,
        universe: &mut PointUniverse,
        registry: &mut Registry<C>,
        needed: &NeededSet,
    ) -> Result<EngineReport> {
        let mut report = EngineReport::default();

        for (sector, points) in needed.iter() {
            registry.open(sector)?;
            for point in points {
                // Entries from a resumed run are already final
                if registry.entry(point).map(|e| e.status) != Some(Status::Placeholder) {
                    continue;
                }
                let entry = match self.rules.get(point.vector()) {
                    Some(rule) => {
                        report.reduced += 1;
                        ReductionEntry::resolved(rule.status, self.relation(rule, universe)?)
                    }
                    None => {
                        report.masters += 1;
                        ReductionEntry::master()
                    }
                };
                registry.record(point, entry)?;
            }
            registry.close(sector)?;
            debug!(sector, points = points.len(), "sector reduced from table");
        }

        info!(reduced = report.reduced, masters = report.masters, "table engine done");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coeff::Rational;

    const RULES: &str = r#"[
        { "point": [0, 1], "status": 5, "terms": [[[0, 2], "3"], [[0, 1], "2"]] }
    ]"#;

    #[test]
    fn test_table_fills_placeholders() {
        let mut universe = PointUniverse::new();
        let p1 = universe.intern(&[0, 1]);
        let p3 = universe.intern(&[0, 3]);
        let mut registry = Registry::<Rational>::in_memory();
        let needed = NeededSet::expand(&Direct, [&p1, &p3]);
        crate::needed::resolve(&mut registry, &needed, Default::default()).unwrap();

        let mut engine = TableEngine::<Rational>::from_json(RULES).unwrap();
        let report = engine.reduce(&mut universe, &mut registry, &needed).unwrap();
        assert_eq!(report, EngineReport { reduced: 1, masters: 1 });

        let entry = registry.entry(&p1).unwrap();
        assert_eq!(entry.status, Status::Engine(5));
        assert_eq!(entry.terms.pivot().map(|t| &t.point), Some(&p1));
        assert_eq!(registry.entry(&p3).unwrap().status, Status::Master);
    }

    #[test]
    fn test_status_defaults() {
        let engine =
            TableEngine::<Rational>::from_json(r#"[{ "point": [1], "terms": [[[1], "1"]] }]"#).unwrap();
        assert_eq!(engine.rules[&vec![1]].status, DEFAULT_RULE_STATUS);
    }

    #[test]
    fn test_bad_json_is_parse_error() {
        let err = TableEngine::<Rational>::from_json("{").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }
}
