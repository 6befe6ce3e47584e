//! Fuzz coefficient parsing
//!
//! Both backends and both rendered dialects go through here. Malformed text
//! must come back as an error, never a panic, and anything that parses must
//! survive a display/parse round trip.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sectordb::coeff::{Coefficient, PrimeField, Rational};
use sectordb::render::parse_ratio;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(c) = Rational::parse(input) {
            assert_eq!(Rational::parse(&c.to_string()).ok(), Some(c));
        }
        if let Ok(c) = PrimeField::<101>::parse(input) {
            assert_eq!(PrimeField::<101>::parse(&c.to_string()).ok(), Some(c));
        }
        let _ = parse_ratio::<Rational>(input);
        let _ = parse_ratio::<PrimeField>(input);
    }
});
