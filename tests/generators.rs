//! Proptest generators for sectordb data structures
//!
//! Provides `Strategy` implementations for index vectors, coefficients and
//! small consistent rule tables used across the property tests.

#![allow(dead_code)]

use proptest::collection::{btree_set, vec};
use proptest::prelude::*;
use sectordb::coeff::{PrimeField, Rational};
use sectordb::config::Job;
use sectordb::engine::RuleSpec;
use sectordb::point::IndexVector;

// ============================================================================
// Index vectors
// ============================================================================

/// A single index in the range the reduction problems use.
pub fn arb_index() -> impl Strategy<Value = i16> {
    -2i16..=3
}

/// An index vector of exactly `len` positions.
pub fn arb_vector(len: usize) -> impl Strategy<Value = IndexVector> {
    vec(arb_index(), len..=len)
}

/// Distinct vectors of a common length.
pub fn arb_unique_vectors(len: usize, count: std::ops::Range<usize>) -> impl Strategy<Value = Vec<IndexVector>> {
    btree_set(arb_vector(len), count).prop_map(|set| set.into_iter().collect())
}

// ============================================================================
// Coefficients
// ============================================================================

pub fn arb_nonzero() -> impl Strategy<Value = i64> {
    prop_oneof![-1000i64..=-1, 1i64..=1000]
}

pub fn arb_rational() -> impl Strategy<Value = Rational> {
    (arb_nonzero(), 1i64..=50).prop_map(|(n, d)| Rational::new(n, d))
}

pub fn arb_residue() -> impl Strategy<Value = PrimeField<101>> {
    (1u64..101).prop_map(PrimeField::new)
}

// ============================================================================
// Rule tables
// ============================================================================

/// A job together with a rule table consistent with it.
///
/// Every requested vector is either a master (no rule) or reduces, in one
/// step, to a combination of masters. The first vector is always a master.
#[derive(Clone, Debug)]
pub struct TableJob {
    pub job: Job,
    pub rules: Vec<RuleSpec>,
}

impl TableJob {
    pub fn masters(&self) -> Vec<&IndexVector> {
        self.job
            .points
            .iter()
            .filter(|v| !self.rules.iter().any(|r| &r.point == *v))
            .collect()
    }
}

const MAX_POINTS: usize = 8;

pub fn arb_table_job() -> impl Strategy<Value = TableJob> {
    (
        arb_unique_vectors(3, 2..MAX_POINTS),
        vec(any::<bool>(), MAX_POINTS),
        vec(arb_nonzero(), MAX_POINTS * 3),
    )
        .prop_map(|(points, reducible, coeffs)| {
            let is_master = |i: usize| i == 0 || !reducible[i];
            let masters: Vec<IndexVector> = points
                .iter()
                .enumerate()
                .filter(|(i, _)| is_master(*i))
                .map(|(_, v)| v.clone())
                .collect();

            let mut rules = Vec::new();
            for (i, point) in points.iter().enumerate() {
                if is_master(i) {
                    continue;
                }
                let first = &masters[i % masters.len()];
                let second = &masters[(i + 1) % masters.len()];
                let mut terms = vec![(first.clone(), coeffs[3 * i].to_string())];
                if second != first {
                    terms.push((second.clone(), coeffs[3 * i + 1].to_string()));
                }
                terms.push((point.clone(), coeffs[3 * i + 2].to_string()));
                rules.push(RuleSpec {
                    point: point.clone(),
                    status: 5,
                    terms,
                });
            }

            TableJob {
                job: Job {
                    points,
                    orbits: Vec::new(),
                },
                rules,
            }
        })
}
