//! End-to-end tests for a run: placeholders, engine, consolidation, remap, publish

use sectordb::coeff::{PrimeField, Rational};
use sectordb::config::{Job, Mode, RunConfig, StorageMode};
use sectordb::engine::TableEngine;
use sectordb::error::Error;
use sectordb::id::TRIVIAL_SECTOR;
use sectordb::pipeline::{Run, UNIVERSE_FILE};
use sectordb::publish::PublishOutcome;
use sectordb::Relation;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const RULES: &str = r#"[
    { "point": [0, 1], "status": 5, "terms": [[[0, 2], "3"], [[0, 1], "2"]] }
]"#;

const SCENARIO: &str = "{
    {
        {1,
            {
                {2,\"-(3)/(2)\"}
            }
        },
        {2,
            {
{2,\"1\"}}}
    },
    {
        {1,{0,1}},
        {2,{0,2}}
    }
}
";

fn memory_config(dir: &Path) -> RunConfig {
    RunConfig {
        output: dir.join("out.tables"),
        ..RunConfig::default()
    }
}

fn disk_config(dir: &Path, storage: StorageMode) -> RunConfig {
    RunConfig {
        storage,
        database: Some(dir.join("db")),
        ..memory_config(dir)
    }
}

#[test]
fn test_scenario_end_to_end() {
    let dir = tempdir().unwrap();
    let job = Job::from_toml("points = [[0, 1]]").unwrap();
    let mut engine = TableEngine::<Rational>::from_json(RULES).unwrap();

    let mut run = Run::new(memory_config(dir.path())).unwrap();
    let summary = run.execute(&job, &mut engine).unwrap();

    assert_eq!(summary.outcome, Some(PublishOutcome::Direct));
    assert_eq!(summary.masters, 1);
    assert_eq!(summary.published, 2);
    assert_eq!(fs::read_to_string(&summary.output).unwrap(), SCENARIO);
}

#[test]
fn test_without_rules_everything_is_master() {
    let dir = tempdir().unwrap();
    let job = Job::from_toml("points = [[1, 1], [0, 1]]").unwrap();
    let mut engine = TableEngine::<Rational>::new();

    let mut run = Run::new(memory_config(dir.path())).unwrap();
    let summary = run.execute(&job, &mut engine).unwrap();

    assert_eq!(summary.masters, 2);
    let text = fs::read_to_string(&summary.output).unwrap();
    assert!(text.contains("{1,\"1\"}}}"));
    assert!(text.contains("{2,\"1\"}}}"));
}

#[test]
fn test_zero_orbit_maps_to_trivial_sector() {
    let dir = tempdir().unwrap();
    let job = Job::from_toml(
        "points = [[0, 1]]\n\n[[orbits]]\noriginal = [1, 1]\nresolved_zero = true\n",
    )
    .unwrap();
    let mut engine = TableEngine::<Rational>::new();

    let mut run = Run::new(memory_config(dir.path())).unwrap();
    let summary = run.execute(&job, &mut engine).unwrap();

    let zero_mapped = run.universe().lookup(&[1, 1], TRIVIAL_SECTOR).unwrap();
    assert_eq!(run.overlay().get(&zero_mapped), Relation::unit(zero_mapped.clone()));
    assert_eq!(summary.published, 2);
    let text = fs::read_to_string(&summary.output).unwrap();
    assert!(text.contains(&format!("{{{},{{1,1}}}}", zero_mapped.number())));
}

#[test]
fn test_orbit_redirects_reduced_point() {
    let dir = tempdir().unwrap();
    // [1, 0] was canonicalized to [0, 1] before reduction
    let job = Job::from_toml("points = []\n\n[[orbits]]\noriginal = [1, 0]\nresolved = [0, 1]\n").unwrap();
    let mut engine = TableEngine::<Rational>::from_json(RULES).unwrap();

    let mut run = Run::new(memory_config(dir.path())).unwrap();
    let summary = run.execute(&job, &mut engine).unwrap();

    let resolved = run.universe().lookup(&[0, 1], 3).unwrap();
    let original = run.universe().lookup(&[1, 0], 2).unwrap();
    let redirected = run.overlay().get(&original);
    assert_eq!(redirected.pivot().unwrap().point, original);
    assert_eq!(redirected.pivot().unwrap().coeff, Rational::from(2));
    assert_eq!(redirected.non_pivot(), run.overlay().get(&resolved).non_pivot());
    // master, resolved point and the original vector
    assert_eq!(summary.published, 3);
}

#[test]
fn test_orbit_to_master_gets_equivalence() {
    let dir = tempdir().unwrap();
    let job = Job::from_toml("points = []\n\n[[orbits]]\noriginal = [2, 0]\nresolved = [0, 2]\n").unwrap();
    let mut engine = TableEngine::<Rational>::new();

    let mut run = Run::new(memory_config(dir.path())).unwrap();
    run.execute(&job, &mut engine).unwrap();

    let master = run.universe().lookup(&[0, 2], 3).unwrap();
    let original = run.universe().lookup(&[2, 0], 2).unwrap();
    assert_eq!(
        run.overlay().get(&original),
        Relation::equivalence(master, original.clone())
    );
}

#[test]
fn test_only_masters_mode() {
    let dir = tempdir().unwrap();
    let job = Job::from_toml("points = [[0, 1], [1, 1]]").unwrap();
    let mut engine = TableEngine::<Rational>::from_json(RULES).unwrap();
    let config = RunConfig {
        mode: Mode::OnlyMasters,
        ..memory_config(dir.path())
    };

    let mut run = Run::new(config).unwrap();
    let summary = run.execute(&job, &mut engine).unwrap();

    // [0, 1] reduces; [1, 1] is the only confirmed master
    assert_eq!(summary.masters, 1);
    let text = fs::read_to_string(&summary.output).unwrap();
    assert!(text.contains(",{1,1}}"));
    assert!(!text.contains("-(3)/(2)"));
}

#[test]
fn test_prime_backend_evaluates() {
    let dir = tempdir().unwrap();
    let job = Job::from_toml("points = [[0, 1]]").unwrap();
    let rules = r#"[{ "point": [0, 1], "terms": [[[0, 2], "3"], [[0, 1], "2"]] }]"#;
    let mut engine = TableEngine::<PrimeField<101>>::from_json(rules).unwrap();

    let mut run = Run::new(memory_config(dir.path())).unwrap();
    let summary = run.execute(&job, &mut engine).unwrap();
    let text = fs::read_to_string(&summary.output).unwrap();
    assert!(text.contains("{2,\"49\"}"));
}

#[test]
fn test_skip_if_exists() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.tables");
    fs::write(&output, "kept").unwrap();
    let config = RunConfig {
        skip_if_exists: true,
        ..memory_config(dir.path())
    };

    let mut run = Run::<Rational>::new(config).unwrap();
    let summary = run
        .execute(&Job::from_toml("points = [[0, 1]]").unwrap(), &mut TableEngine::<Rational>::new())
        .unwrap();
    assert!(summary.skipped());
    assert_eq!(fs::read_to_string(&output).unwrap(), "kept");
}

#[test]
fn test_disk_run_persists_universe_and_sectors() {
    let dir = tempdir().unwrap();
    let job = Job::from_toml("points = [[0, 1]]").unwrap();
    let mut engine = TableEngine::<Rational>::from_json(RULES).unwrap();

    {
        let mut run = Run::new(disk_config(dir.path(), StorageMode::Disk)).unwrap();
        let summary = run.execute(&job, &mut engine).unwrap();
        assert_eq!(fs::read_to_string(&summary.output).unwrap(), SCENARIO);
    }

    let db = dir.path().join("db");
    assert!(db.join(UNIVERSE_FILE).exists());
    assert!(db.join("sector_3.bin").exists());
}

#[test]
fn test_resume_reuses_completed_sectors() {
    let dir = tempdir().unwrap();
    let job = Job::from_toml("points = [[0, 1]]").unwrap();

    {
        let mut engine = TableEngine::<Rational>::from_json(RULES).unwrap();
        let mut run = Run::new(disk_config(dir.path(), StorageMode::Disk)).unwrap();
        run.execute(&job, &mut engine).unwrap();
    }
    fs::remove_file(dir.path().join("out.tables")).unwrap();

    // No rules this time: the stored relation must come from the database
    let mut engine = TableEngine::<Rational>::new();
    let mut run = Run::new(disk_config(dir.path(), StorageMode::Resume)).unwrap();
    let summary = run.execute(&job, &mut engine).unwrap();
    assert_eq!(fs::read_to_string(&summary.output).unwrap(), SCENARIO);
}

#[test]
fn test_disk_mode_starts_fresh() {
    let dir = tempdir().unwrap();
    let job = Job::from_toml("points = [[0, 1]]").unwrap();

    {
        let mut engine = TableEngine::<Rational>::from_json(RULES).unwrap();
        let mut run = Run::new(disk_config(dir.path(), StorageMode::Disk)).unwrap();
        run.execute(&job, &mut engine).unwrap();
    }

    let mut engine = TableEngine::<Rational>::new();
    let mut run = Run::new(disk_config(dir.path(), StorageMode::Disk)).unwrap();
    let summary = run.execute(&job, &mut engine).unwrap();
    assert_eq!(summary.masters, 1);
    assert_eq!(summary.published, 1);
}

#[test]
fn test_remove_database_after_publish() {
    let dir = tempdir().unwrap();
    let config = RunConfig {
        remove_database: true,
        ..disk_config(dir.path(), StorageMode::Disk)
    };
    let job = Job::from_toml("points = [[0, 1]]").unwrap();
    let mut engine = TableEngine::<Rational>::from_json(RULES).unwrap();

    {
        let mut run = Run::new(config).unwrap();
        run.execute(&job, &mut engine).unwrap();
    }
    assert!(!dir.path().join("db").exists());
    assert!(dir.path().join("out.tables").exists());
}

#[test]
fn test_suffix_applies_to_output_and_database() {
    let dir = tempdir().unwrap();
    let config = RunConfig {
        suffix: Some("p7".to_string()),
        ..disk_config(dir.path(), StorageMode::Disk)
    };
    let job = Job::from_toml("points = [[0, 1]]").unwrap();

    let mut run = Run::<Rational>::new(config).unwrap();
    let summary = run.execute(&job, &mut TableEngine::<Rational>::new()).unwrap();
    assert_eq!(summary.output, dir.path().join("out-p7.tables"));
    assert!(dir.path().join("db-p7").is_dir());
}

#[test]
fn test_mismatched_pivot_aborts_before_publish() {
    let dir = tempdir().unwrap();
    let rules = r#"[{ "point": [0, 1], "terms": [[[0, 1], "3"], [[0, 2], "2"]] }]"#;
    let job = Job::from_toml("points = [[0, 1]]").unwrap();
    let mut engine = TableEngine::<Rational>::from_json(rules).unwrap();

    let mut run = Run::new(memory_config(dir.path())).unwrap();
    let err = run.execute(&job, &mut engine).unwrap_err();
    assert!(matches!(err, Error::InvariantViolation { .. }));
    assert!(!dir.path().join("out.tables").exists());
}

/// `(number, vector)` for every row of the index section.
fn index_rows(table: &str) -> Vec<(u64, String)> {
    table
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with('{') && l.contains(",{") && !l.contains('"'))
        .filter_map(|l| {
            let l = l.trim_end_matches(',');
            let (number, vector) = l.strip_prefix('{')?.split_once(',')?;
            Some((number.parse().ok()?, vector.to_string()))
        })
        .collect()
}

#[test]
fn test_resume_without_number_file_keeps_numbers_unique() {
    let dir = tempdir().unwrap();

    {
        let job = Job::from_toml("points = [[0, 1]]").unwrap();
        let mut engine = TableEngine::<Rational>::from_json(RULES).unwrap();
        let mut run = Run::new(disk_config(dir.path(), StorageMode::Disk)).unwrap();
        run.execute(&job, &mut engine).unwrap();
    }
    // Killed before the number file reached the disk
    fs::remove_file(dir.path().join("db").join(UNIVERSE_FILE)).unwrap();

    let job = Job::from_toml(
        "points = [[0, 1]]\n\n[[orbits]]\noriginal = [1, 0]\nresolved = [0, 1]\n",
    )
    .unwrap();
    let mut engine = TableEngine::<Rational>::from_json(RULES).unwrap();
    let mut run = Run::new(disk_config(dir.path(), StorageMode::Resume)).unwrap();
    let summary = run.execute(&job, &mut engine).unwrap();

    let text = fs::read_to_string(&summary.output).unwrap();
    let rows = index_rows(&text);
    assert_eq!(rows.len(), 3);
    let mut numbers: Vec<u64> = rows.iter().map(|(n, _)| *n).collect();
    numbers.sort_unstable();
    numbers.dedup();
    assert_eq!(numbers.len(), rows.len(), "duplicate numbers in {:?}", rows);

    // The relation for [1, 0] must name the master, not itself
    let original = run.universe().lookup(&[1, 0], 2).unwrap();
    let master = run.universe().lookup(&[0, 2], 3).unwrap();
    assert_ne!(original.number(), master.number());
    let redirected = run.overlay().get(&original);
    assert_eq!(redirected.non_pivot()[0].point.number(), master.number());
}

#[test]
fn test_number_file_written_before_failed_publish() {
    let dir = tempdir().unwrap();
    let rules = r#"[{ "point": [0, 1], "terms": [[[0, 1], "3"], [[0, 2], "2"]] }]"#;
    let job = Job::from_toml("points = [[0, 1]]").unwrap();
    let mut engine = TableEngine::<Rational>::from_json(rules).unwrap();

    let mut run = Run::new(disk_config(dir.path(), StorageMode::Disk)).unwrap();
    assert!(run.execute(&job, &mut engine).is_err());

    // Every number in the archives is already in the saved universe
    let saved = sectordb::PointUniverse::load(dir.path().join("db").join(UNIVERSE_FILE)).unwrap();
    assert!(saved.lookup(&[0, 1], 3).is_some());
    assert!(saved.lookup(&[0, 2], 3).is_some());
}
