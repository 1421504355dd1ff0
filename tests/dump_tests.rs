use callscope::frame::CallSite;
use callscope::output::{dump_to_string, read_dump, write_dump, ProfileDump};
use callscope::stats::{Mode, Snapshot, StatsTree};
use callscope::utils::OutputError;
use pretty_assertions::assert_eq;
use std::time::Duration;
use tempfile::tempdir;

fn site(name: &str) -> CallSite {
    CallSite::named(name)
}

/// Snapshot from `"a;b;c"` paths and their own weights
fn snapshot_of(paths: &[(&str, u64)]) -> Snapshot {
    let mut tree = StatsTree::new();
    for (path, weight) in paths {
        let sites: Vec<CallSite> = path.split(';').map(site).collect();
        tree.record(&sites, *weight);
    }
    Snapshot::of_tree(
        Mode::Tracing,
        &tree,
        Duration::from_millis(3),
        Duration::from_millis(2),
    )
}

#[test]
fn test_dump_round_trip_is_idempotent() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("first.json");
    let second = dir.path().join("second.json");

    let snapshot = snapshot_of(&[
        ("main", 40),
        ("main;parse", 300),
        ("main;parse;parse", 120),
        ("main;emit", 75),
    ]);
    let dump = ProfileDump::new(snapshot.clone());
    write_dump(&dump, &first).unwrap();

    let loaded = read_dump(&first).unwrap();
    assert_eq!(loaded, dump);
    assert_eq!(loaded.snapshot.to_tree().freeze(), snapshot.stats);

    write_dump(&loaded, &second).unwrap();
    assert_eq!(
        std::fs::read_to_string(&first).unwrap(),
        std::fs::read_to_string(&second).unwrap()
    );
    assert_eq!(dump_to_string(&loaded).unwrap(), dump_to_string(&dump).unwrap());
}

#[test]
fn test_sampling_dump_keeps_interval() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sampled.json");
    let mut tree = StatsTree::new();
    tree.record(&[site("spin")], 12);
    let snapshot = Snapshot::of_tree(
        Mode::sampling(Duration::from_micros(250)),
        &tree,
        Duration::ZERO,
        Duration::ZERO,
    );

    write_dump(&ProfileDump::new(snapshot), &path).unwrap();
    let loaded = read_dump(&path).unwrap().snapshot;

    assert_eq!(loaded.mode, Mode::Sampling { interval_us: 250 });
    assert_eq!(
        loaded.mode.value_as_duration(loaded.deep_value()),
        Duration::from_millis(3)
    );
}

#[test]
fn test_newer_major_version_is_refused() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("future.json");
    let mut dump = ProfileDump::new(snapshot_of(&[("main", 1)]));
    dump.version = "9.0.0".to_string();
    write_dump(&dump, &path).unwrap();

    assert!(matches!(
        read_dump(&path),
        Err(OutputError::UnsupportedVersion(v)) if v == "9.0.0"
    ));
}

#[test]
fn test_delta_replays_onto_previous() {
    let before = snapshot_of(&[("main;parse", 10)]);
    let after = before
        .merge(&snapshot_of(&[("main;emit", 4), ("main;parse", 1)]))
        .unwrap();

    let delta = after.delta_since(&before).unwrap();
    assert_eq!(before.merge(&delta).unwrap(), after);
    assert!(delta.find(&[site("main"), site("emit")]).is_some());
}

#[test]
fn test_mode_mismatch_is_an_error() {
    let tracing = snapshot_of(&[("main", 1)]);
    let sampling = Snapshot::empty(Mode::sampling(Duration::from_millis(1)));
    assert!(tracing.merge(&sampling).is_err());
}
