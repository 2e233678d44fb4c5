//! Property-based tests for the resumption core

use std::fs;
use std::path::{Path, PathBuf};

use proptest::prelude::*;

use parcel_lab::checkpoint::{parse_epoch, CheckpointStore};
use parcel_lab::ledger::LearningRateLedger;
use parcel_lab::run;

proptest! {
    /// Property: the epoch embedded by the engine's naming convention
    /// always parses back to itself, whatever the step suffix.
    #[test]
    fn prop_parse_epoch_round_trip(epoch in 0u32..100_000, step in 0u64..10_000_000) {
        let name = format!("epoch={epoch}-step={step}.ckpt");
        prop_assert_eq!(parse_epoch(Path::new(&name)), Some(epoch));
    }

    /// Property: a plain epoch-only name parses the same way.
    #[test]
    fn prop_parse_epoch_plain(epoch in 0u32..100_000) {
        let name = format!("epoch={epoch}.ckpt");
        prop_assert_eq!(parse_epoch(Path::new(&name)), Some(epoch));
    }

    /// Property: names without an epoch marker never parse.
    #[test]
    fn prop_parse_epoch_rejects_markerless(stem in "[a-zA-Z_][a-zA-Z0-9_-]{0,20}") {
        prop_assume!(!stem.contains("epoch="));
        let name = format!("{stem}.ckpt");
        prop_assert_eq!(parse_epoch(Path::new(&name)), None);
    }

    /// Property: latest_run returns the lexicographically greatest name for
    /// any set of distinct timestamps, whatever order they were created in.
    #[test]
    fn prop_latest_run_is_max_name(mut seconds in proptest::collection::hash_set(0u64..86_400, 1..10)) {
        let root = tempfile::tempdir().unwrap();
        let mut names = Vec::new();
        for s in seconds.drain() {
            let name = format!("run_20240101{:02}{:02}{:02}", s / 3600, (s / 60) % 60, s % 60);
            fs::create_dir_all(root.path().join(&name)).unwrap();
            names.push(name);
        }
        names.sort();

        let latest = run::latest_run(root.path()).unwrap();
        prop_assert_eq!(latest.name(), names.last().unwrap().as_str());
    }

    /// Property: whatever was appended for an epoch last is what reads back.
    #[test]
    fn prop_ledger_last_write_wins(values in proptest::collection::vec(0.0001f64..1.0, 1..20)) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LearningRateLedger::for_run(dir.path());
        for value in &values {
            ledger.append(7, *value).unwrap();
        }
        let read = ledger.read(7).unwrap();
        prop_assert!((read - values.last().unwrap()).abs() < 1e-12);
    }

    /// Property: scanning maps every well-formed checkpoint and nothing else.
    #[test]
    fn prop_scan_covers_written_epochs(mut epochs in proptest::collection::hash_set(0u32..500, 0..20)) {
        let root = tempfile::tempdir().unwrap();
        let ckpt_dir = root.path().join(run::CHECKPOINT_DIR);
        fs::create_dir_all(&ckpt_dir).unwrap();

        let mut expected: Vec<u32> = epochs.drain().collect();
        for epoch in &expected {
            fs::write(ckpt_dir.join(format!("epoch={epoch}-step={}.ckpt", epoch + 1)), b"").unwrap();
        }
        // Sidecar files the scanner must skip
        fs::write(ckpt_dir.join("last.ckpt"), b"").unwrap();
        fs::write(ckpt_dir.join("notes.txt"), b"").unwrap();
        expected.sort_unstable();

        let store = CheckpointStore::scan(root.path()).unwrap();
        prop_assert_eq!(store.epochs(), expected);
    }
}

#[test]
fn test_scan_handle_points_at_written_file() {
    let root = tempfile::tempdir().unwrap();
    let ckpt_dir = root.path().join(run::CHECKPOINT_DIR);
    fs::create_dir_all(&ckpt_dir).unwrap();
    let written: PathBuf = ckpt_dir.join("epoch=12-step=600.ckpt");
    fs::write(&written, b"").unwrap();

    let store = CheckpointStore::scan(root.path()).unwrap();
    assert_eq!(store.get(12), Some(written.as_path()));
}
