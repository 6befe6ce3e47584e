//! Linear relations between points.
//!
//! A relation is an ordered list of (point, coefficient) terms whose last
//! element is the pivot. It reads as
//!
//! ```text
//! pivot = Σ_{i < last} (-c_i / c_last) · point_i
//! ```
//!
//! An empty relation means no rule is recorded.

use std::fmt;

use crate::coeff::Coefficient;
use crate::point::Point;

/// One (point, coefficient) pair of a relation.
#[derive(Clone, Debug, PartialEq)]
pub struct Term<C> {
    pub point: Point,
    pub coeff: C,
}

impl<C> Term<C> {
    pub fn new(point: Point, coeff: C) -> Self {
        Self { point, coeff }
    }
}

/// Ordered terms, pivot last. Staging into the overlay copies.
#[derive(Clone, Debug, PartialEq)]
pub struct Relation<C> {
    terms: Vec<Term<C>>,
}

impl<C> Default for Relation<C> {
    fn default() -> Self {
        Self { terms: Vec::new() }
    }
}

impl<C: Coefficient> Relation<C> {
    pub fn new(terms: Vec<Term<C>>) -> Self {
        Self { terms }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// `{(point, ONE)}`: the unit self-relation used for zero-mapped points.
    pub fn unit(point: Point) -> Self {
        Self::new(vec![Term::new(point, C::one())])
    }

    /// `{(old, MINUS_ONE), (new, ONE)}`: states that `new` equals `old`.
    pub fn equivalence(old: Point, new: Point) -> Self {
        Self::new(vec![Term::new(old, C::minus_one()), Term::new(new, C::one())])
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn terms(&self) -> &[Term<C>] {
        &self.terms
    }

    pub fn into_terms(self) -> Vec<Term<C>> {
        self.terms
    }

    pub fn pivot(&self) -> Option<&Term<C>> {
        self.terms.last()
    }

    /// Every term except the pivot.
    pub fn non_pivot(&self) -> &[Term<C>] {
        match self.terms.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }

    /// Points referenced by this relation other than `owner`.
    pub fn references<'a>(&'a self, owner: &'a Point) -> impl Iterator<Item = &'a Point> + 'a {
        self.terms
            .iter()
            .map(|t| &t.point)
            .filter(move |p| *p != owner)
    }

    /// Normalized right-hand side: `(point_i, -c_i / c_pivot)` for each
    /// non-pivot term. `None` if the relation is empty or the pivot
    /// coefficient is zero.
    pub fn normalized(&self) -> Option<Vec<(Point, C)>> {
        let pivot = self.pivot()?;
        self.non_pivot()
            .iter()
            .map(|t| t.coeff.div_neg(&pivot.coeff).map(|c| (t.point.clone(), c)))
            .collect()
    }

    /// Replace the pivot's point, keeping its coefficient.
    pub fn redirect_pivot(&mut self, point: Point) {
        if let Some(last) = self.terms.last_mut() {
            last.point = point;
        }
    }
}

impl<C: Coefficient> fmt::Display for Relation<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, t) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "({:?}, {})", t.point, t.coeff)?;
        }
        Ok(())
    }
}

impl<C: Coefficient> FromIterator<Term<C>> for Relation<C> {
    fn from_iter<I: IntoIterator<Item = Term<C>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coeff::Rational;
    use crate::universe::PointUniverse;

    #[test]
    fn test_normalized_scenario() {
        let mut universe = PointUniverse::new();
        let p1 = universe.intern(&[0, 1]);
        let p2 = universe.intern(&[0, 2]);
        let rel = Relation::new(vec![
            Term::new(p2.clone(), Rational::from(3)),
            Term::new(p1.clone(), Rational::from(2)),
        ]);
        assert_eq!(rel.pivot().map(|t| &t.point), Some(&p1));
        assert_eq!(rel.normalized(), Some(vec![(p2.clone(), Rational::new(-3, 2))]));
        assert_eq!(rel.references(&p1).collect::<Vec<_>>(), vec![&p2]);
    }

    #[test]
    fn test_redirect_pivot_keeps_coefficient() {
        let mut universe = PointUniverse::new();
        let a = universe.intern(&[1, 0]);
        let b = universe.intern(&[1, 1]);
        let c = universe.intern(&[1, 2]);
        let mut rel = Relation::new(vec![
            Term::new(a.clone(), Rational::from(5)),
            Term::new(b, Rational::from(7)),
        ]);
        rel.redirect_pivot(c.clone());
        assert_eq!(rel.pivot(), Some(&Term::new(c, Rational::from(7))));
        assert_eq!(rel.non_pivot(), &[Term::new(a, Rational::from(5))]);
    }

    #[test]
    fn test_empty_relation_has_no_normal_form() {
        assert!(Relation::<Rational>::empty().normalized().is_none());
    }
}
