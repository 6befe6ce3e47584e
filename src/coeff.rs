//! Coefficient backends.
//!
//! The consolidator only needs the field operations, negation and a textual
//! form; everything else about the scalar type is opaque. Two backends ship
//! with the crate:
//!
//! - [`Rational`]: exact rationals over arbitrary-precision integers
//! - [`PrimeField`]: residues modulo a fixed prime (the default is 2^61 - 1)
//!
//! Coefficients are persisted as their `Display` rendering and read back with
//! [`Coefficient::parse`], so the two must round-trip.

use std::fmt::{self, Debug, Display};
use std::str::FromStr;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Zero};

use crate::error::{Error, Result};

/// An algebraic scalar supporting the four field operations.
pub trait Coefficient: Clone + Debug + Display + PartialEq + Send + Sync + 'static {
    /// Whether the legacy output dialect renders the evaluated ratio
    /// `-c_i / c_n` for this backend instead of the symbolic form.
    const EVALUATES_RATIOS: bool;

    /// Additive identity
    fn zero() -> Self;

    /// Multiplicative identity
    fn one() -> Self;

    /// Additive inverse of one
    fn minus_one() -> Self {
        Self::one().neg()
    }

    fn add(&self, other: &Self) -> Self;

    fn sub(&self, other: &Self) -> Self;

    fn mul(&self, other: &Self) -> Self;

    /// Field division. `None` when `other` is zero.
    fn div(&self, other: &Self) -> Option<Self>;

    fn neg(&self) -> Self;

    fn is_zero(&self) -> bool {
        self == &Self::zero()
    }

    /// Parse the textual form produced by `Display` (and plain `a/b` fractions).
    fn parse(text: &str) -> Result<Self>;

    /// `-(self) / pivot`, the normalized coefficient of a non-pivot term.
    fn div_neg(&self, pivot: &Self) -> Option<Self> {
        self.div(pivot).map(|q| q.neg())
    }
}

// ============================================================================
// RATIONALS
// ============================================================================

/// Exact rational coefficient.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rational(pub BigRational);

impl Rational {
    pub fn new(numer: i64, denom: i64) -> Self {
        Self(BigRational::new(BigInt::from(numer), BigInt::from(denom)))
    }

    pub fn from_integer(value: i64) -> Self {
        Self(BigRational::from_integer(BigInt::from(value)))
    }
}

impl From<i64> for Rational {
    fn from(value: i64) -> Self {
        Self::from_integer(value)
    }
}

impl Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Coefficient for Rational {
    const EVALUATES_RATIOS: bool = false;

    fn zero() -> Self {
        Self(BigRational::zero())
    }

    fn one() -> Self {
        Self(BigRational::one())
    }

    fn add(&self, other: &Self) -> Self {
        Self(&self.0 + &other.0)
    }

    fn sub(&self, other: &Self) -> Self {
        Self(&self.0 - &other.0)
    }

    fn mul(&self, other: &Self) -> Self {
        Self(&self.0 * &other.0)
    }

    fn div(&self, other: &Self) -> Option<Self> {
        if other.0.is_zero() {
            None
        } else {
            Some(Self(&self.0 / &other.0))
        }
    }

    fn neg(&self) -> Self {
        Self(-&self.0)
    }

    fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    fn parse(text: &str) -> Result<Self> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        BigRational::from_str(&compact)
            .map(Self)
            .map_err(|e| Error::parse(format!("invalid rational '{}': {}", text, e)))
    }
}

// ============================================================================
// PRIME FIELD
// ============================================================================

/// The Mersenne prime 2^61 - 1.
pub const MERSENNE_61: u64 = (1 << 61) - 1;

/// Residue modulo the prime `P`. Always stored reduced to `0..P`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimeField<const P: u64 = MERSENNE_61>(u64);

impl<const P: u64> PrimeField<P> {
    pub fn new(value: u64) -> Self {
        Self(value % P)
    }

    pub fn from_i64(value: i64) -> Self {
        let r = (value as i128).rem_euclid(P as i128);
        Self(r as u64)
    }

    pub fn residue(self) -> u64 {
        self.0
    }

    fn inverse(self) -> Option<Self> {
        if self.0 == 0 {
            return None;
        }
        // Extended Euclid on (value, P)
        let (mut old_r, mut r) = (self.0 as i128, P as i128);
        let (mut old_s, mut s) = (1i128, 0i128);
        while r != 0 {
            let q = old_r / r;
            (old_r, r) = (r, old_r - q * r);
            (old_s, s) = (s, old_s - q * s);
        }
        Some(Self(old_s.rem_euclid(P as i128) as u64))
    }

    fn parse_integer(text: &str) -> Result<Self> {
        let value = BigInt::from_str(text)
            .map_err(|e| Error::parse(format!("invalid residue '{}': {}", text, e)))?;
        let reduced = ((value % BigInt::from(P)) + BigInt::from(P)) % BigInt::from(P);
        let digits = reduced.to_string();
        digits
            .parse::<u64>()
            .map(Self)
            .map_err(|e| Error::parse(format!("invalid residue '{}': {}", text, e)))
    }
}

impl<const P: u64> Display for PrimeField<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<const P: u64> Coefficient for PrimeField<P> {
    const EVALUATES_RATIOS: bool = true;

    fn zero() -> Self {
        Self(0)
    }

    fn one() -> Self {
        Self(1 % P)
    }

    fn add(&self, other: &Self) -> Self {
        Self(((self.0 as u128 + other.0 as u128) % P as u128) as u64)
    }

    fn sub(&self, other: &Self) -> Self {
        Self(((self.0 as u128 + P as u128 - other.0 as u128) % P as u128) as u64)
    }

    fn mul(&self, other: &Self) -> Self {
        Self(((self.0 as u128 * other.0 as u128) % P as u128) as u64)
    }

    fn div(&self, other: &Self) -> Option<Self> {
        other.inverse().map(|inv| self.mul(&inv))
    }

    fn neg(&self) -> Self {
        Self((P - self.0) % P)
    }

    fn parse(text: &str) -> Result<Self> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        match compact.split_once('/') {
            Some((numer, denom)) => {
                let numer = Self::parse_integer(numer)?;
                let denom = Self::parse_integer(denom)?;
                numer
                    .div(&denom)
                    .ok_or_else(|| Error::parse(format!("zero denominator in '{}'", text)))
            }
            None => Self::parse_integer(&compact),
        }
    }
}
