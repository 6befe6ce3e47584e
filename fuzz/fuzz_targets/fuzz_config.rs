//! Fuzz run configuration, job and rule table parsing

#![no_main]

use libfuzzer_sys::fuzz_target;
use sectordb::coeff::Rational;
use sectordb::config::{Job, RunConfig};
use sectordb::engine::TableEngine;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let _ = RunConfig::from_toml(input);
        let _ = Job::from_toml(input);
        let _ = TableEngine::<Rational>::from_json(input);
    }
});
