//! Tests for the store engine
//!
//! These tests verify:
//! - Basic set/get/incr/delete/exists/clear/drop behaviour
//! - TTL expiry against a manual clock
//! - Persistence across reopen for every format and discipline
//! - Crash consistency for both WAL disciplines
//! - WAL and snapshot failures leave the store consistent

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use quillkv::keyspace::Keyspace;
use quillkv::storage::{SnapshotBackend, TextBackend};
use quillkv::wal::{Operation, Phase, WalReader, WalWriter};
use quillkv::{
    Clock, Command, Config, Discipline, ManualClock, QuillError, Reply, SnapshotFormat, Store,
    WalSyncStrategy,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap()))
}

fn config(dir: &Path, discipline: Discipline, format: SnapshotFormat) -> Config {
    Config::builder()
        .data_dir(dir)
        .name("testdb")
        .discipline(discipline)
        .snapshot_format(format)
        .wal_sync_strategy(WalSyncStrategy::EveryWrite)
        .build()
}

fn open(dir: &Path, discipline: Discipline, clock: &Arc<ManualClock>) -> Store {
    Store::open_with_clock(config(dir, discipline, SnapshotFormat::Text), clock.clone()).unwrap()
}

fn setup_temp_store(discipline: Discipline) -> (TempDir, Arc<ManualClock>, Store) {
    let temp_dir = TempDir::new().unwrap();
    let clock = manual_clock();
    let store = open(temp_dir.path(), discipline, &clock);
    (temp_dir, clock, store)
}

fn set_op(key: &str, value: &str) -> Operation {
    Operation::Set {
        key: key.to_string(),
        value: value.to_string(),
        ttl_seconds: None,
    }
}

/// Snapshot backend whose persists can be made to fail
struct FlakyBackend {
    inner: TextBackend,
    fail: Arc<AtomicBool>,
}

impl SnapshotBackend for FlakyBackend {
    fn persist(&self, keyspace: &Keyspace) -> quillkv::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(QuillError::Snapshot("disk full".to_string()));
        }
        self.inner.persist(keyspace)
    }

    fn load(&self) -> quillkv::Result<Keyspace> {
        self.inner.load()
    }

    fn remove(&self) -> quillkv::Result<()> {
        self.inner.remove()
    }

    fn path(&self) -> &Path {
        self.inner.path()
    }
}

fn open_flaky(dir: &Path, discipline: Discipline, clock: &Arc<ManualClock>) -> (Store<FlakyBackend>, Arc<AtomicBool>) {
    let config = config(dir, discipline, SnapshotFormat::Text);
    let fail = Arc::new(AtomicBool::new(false));
    let backend = FlakyBackend {
        inner: TextBackend::new(config.snapshot_path()),
        fail: Arc::clone(&fail),
    };
    (Store::open_with(config, backend, clock.clone()).unwrap(), fail)
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_open_creates_files() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("nested").join("dir");

    let store = open(&data_dir, Discipline::Simple, &manual_clock());

    assert!(data_dir.join("testdb.log").exists());
    assert!(store.is_empty());
    assert_eq!(store.recovery_report().records_read, 0);
}

#[test]
fn test_open_rejects_bad_name() {
    let temp_dir = TempDir::new().unwrap();
    for name in ["", "../escape", "a/b"] {
        let config = Config::builder().data_dir(temp_dir.path()).name(name).build();
        assert!(matches!(Store::open(config), Err(QuillError::Config(_))));
    }
}

#[test]
fn test_set_get_round_trip() {
    let (_temp, _clock, mut store) = setup_temp_store(Discipline::Simple);

    for (key, value) in [("k", "v"), ("spaces in key", "and in value"), ("empty", ""), ("uni", "ключ 🦀")] {
        store.set(key, value, None).unwrap();
        assert_eq!(store.get(key), Some(value.to_string()));
    }
}

#[test]
fn test_set_overwrites() {
    let (_temp, _clock, mut store) = setup_temp_store(Discipline::Simple);

    store.set("k", "one", None).unwrap();
    store.set("k", "two", None).unwrap();

    assert_eq!(store.get("k"), Some("two".to_string()));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_set_empty_key_rejected() {
    let (_temp, _clock, mut store) = setup_temp_store(Discipline::Simple);

    assert!(matches!(store.set("", "v", None), Err(QuillError::EmptyKey)));
    assert!(store.is_empty());
}

#[test]
fn test_get_missing() {
    let (_temp, _clock, mut store) = setup_temp_store(Discipline::Simple);

    assert_eq!(store.get("nope"), None);
    assert!(!store.exists("nope"));
}

#[test]
fn test_incr() {
    let (_temp, _clock, mut store) = setup_temp_store(Discipline::Simple);

    store.set("a", "1", None).unwrap();
    assert_eq!(store.incr("a").unwrap(), Some(2));
    assert_eq!(store.get("a"), Some("2".to_string()));

    store.set("neg", "-1", None).unwrap();
    assert_eq!(store.incr("neg").unwrap(), Some(0));
}

#[test]
fn test_incr_missing_key() {
    let (_temp, _clock, mut store) = setup_temp_store(Discipline::Simple);
    store.set("a", "1", None).unwrap();
    let written = store.wal().records_written();

    assert_eq!(store.incr("missing").unwrap(), None);

    assert_eq!(store.keys(), vec!["a".to_string()]);
    assert_eq!(store.wal().records_written(), written);
}

#[test]
fn test_incr_non_integer() {
    let (_temp, _clock, mut store) = setup_temp_store(Discipline::Simple);
    store.set("word", "hello", None).unwrap();
    store.set("max", &i64::MAX.to_string(), None).unwrap();

    assert_eq!(store.incr("word").unwrap(), None);
    assert_eq!(store.incr("max").unwrap(), None);

    assert_eq!(store.get("word"), Some("hello".to_string()));
    assert_eq!(store.get("max"), Some(i64::MAX.to_string()));
}

#[test]
fn test_delete() {
    let (_temp, _clock, mut store) = setup_temp_store(Discipline::Simple);
    store.set("k", "v", None).unwrap();

    assert!(store.delete("k").unwrap());
    assert!(!store.delete("k").unwrap());
    assert_eq!(store.get("k"), None);
}

#[test]
fn test_clear() {
    let (_temp, _clock, mut store) = setup_temp_store(Discipline::Simple);
    store.set("a", "1", None).unwrap();
    store.set("b", "2", None).unwrap();

    store.clear().unwrap();
    assert!(store.is_empty());

    store.clear().unwrap();
    assert!(store.is_empty());
}

#[test]
fn test_clear_empty_store_writes_nothing() {
    let (_temp, _clock, mut store) = setup_temp_store(Discipline::DurableAck);
    let written = store.wal().records_written();

    store.clear().unwrap();

    assert_eq!(store.wal().records_written(), written);
}

#[test]
fn test_clear_is_one_record() {
    let (temp, _clock, mut store) = setup_temp_store(Discipline::Simple);
    for i in 0..5 {
        store.set(&format!("k{}", i), "v", None).unwrap();
    }

    store.clear().unwrap();

    let records = WalReader::open(&temp.path().join("testdb.log")).unwrap().read_all().unwrap();
    let clears = records.iter().filter(|r| r.operation == Operation::Clear).count();
    let deletes = records
        .iter()
        .filter(|r| matches!(r.operation, Operation::Delete { .. }))
        .count();
    assert_eq!(clears, 1);
    assert_eq!(deletes, 0);
}

#[test]
fn test_execute_commands() {
    let (_temp, _clock, mut store) = setup_temp_store(Discipline::Simple);

    let run = |store: &mut Store, line: &str| store.execute(Command::parse(line).unwrap()).unwrap();

    assert_eq!(run(&mut store, "set a 1"), Reply::Ok);
    assert_eq!(run(&mut store, "incr a"), Reply::Integer(Some(2)));
    assert_eq!(run(&mut store, "get a"), Reply::Value(Some("2".to_string())));
    assert_eq!(run(&mut store, "exists a"), Reply::Bool(true));
    assert_eq!(run(&mut store, "delete a"), Reply::Bool(true));
    assert_eq!(run(&mut store, "incr a"), Reply::Integer(None));
    assert_eq!(run(&mut store, "clear"), Reply::Ok);
    assert_eq!(run(&mut store, "drop"), Reply::Ok);
    assert!(store.is_dropped());
}

// =============================================================================
// TTL Tests
// =============================================================================

#[test]
fn test_ttl_expires() {
    let (_temp, clock, mut store) = setup_temp_store(Discipline::Simple);

    store.set("x", "v", Some(1)).unwrap();
    assert!(store.exists("x"));

    clock.advance_secs(2);

    assert!(!store.exists("x"));
    assert_eq!(store.get("x"), None);
    assert!(store.is_empty());
}

#[test]
fn test_ttl_boundary() {
    let (_temp, clock, mut store) = setup_temp_store(Discipline::Simple);
    store.set("x", "v", Some(10)).unwrap();

    clock.advance_secs(9);
    assert!(store.exists("x"));

    clock.advance_secs(1);
    assert!(!store.exists("x"));
}

#[test]
fn test_expiry_is_logged_as_delete() {
    let (temp, clock, mut store) = setup_temp_store(Discipline::Simple);
    store.set("x", "v", Some(1)).unwrap();
    clock.advance_secs(5);

    assert_eq!(store.get("x"), None);

    let records = WalReader::open(&temp.path().join("testdb.log")).unwrap().read_all().unwrap();
    assert!(records
        .iter()
        .any(|r| r.operation == Operation::Delete { key: "x".to_string() }));
}

#[test]
fn test_set_without_ttl_clears_old_ttl() {
    let (_temp, clock, mut store) = setup_temp_store(Discipline::Simple);
    store.set("x", "v", Some(1)).unwrap();
    store.set("x", "w", None).unwrap();

    clock.advance_secs(100);

    assert_eq!(store.get("x"), Some("w".to_string()));
}

#[test]
fn test_incr_keeps_ttl() {
    let (_temp, clock, mut store) = setup_temp_store(Discipline::Simple);
    store.set("n", "1", Some(10)).unwrap();

    clock.advance_secs(5);
    assert_eq!(store.incr("n").unwrap(), Some(2));

    clock.advance_secs(5);
    assert!(!store.exists("n"));
}

#[test]
fn test_expired_keys_swept_on_open() {
    let temp_dir = TempDir::new().unwrap();
    let clock = manual_clock();
    {
        let mut store = open(temp_dir.path(), Discipline::Simple, &clock);
        store.set("short", "v", Some(5)).unwrap();
        store.set("long", "v", Some(500)).unwrap();
        store.close().unwrap();
    }

    clock.advance_secs(10);
    let mut store = open(temp_dir.path(), Discipline::Simple, &clock);

    assert_eq!(store.keys(), vec!["long".to_string()]);
    assert!(!store.exists("short"));
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_reopen_every_format_and_discipline() {
    for format in [SnapshotFormat::Text, SnapshotFormat::Json, SnapshotFormat::Binary] {
        for discipline in [Discipline::Simple, Discipline::DurableAck] {
            let temp_dir = TempDir::new().unwrap();
            let clock = manual_clock();
            let config = config(temp_dir.path(), discipline, format);

            {
                let mut store = Store::open_with_clock(config.clone(), clock.clone()).unwrap();
                store.set("a", "1", None).unwrap();
                store.set("b", "two words", Some(60)).unwrap();
                store.set("gone", "x", None).unwrap();
                store.incr("a").unwrap();
                store.delete("gone").unwrap();
                store.close().unwrap();
            }

            let mut store = Store::open_with_clock(config.clone(), clock.clone()).unwrap();
            assert!(config.snapshot_path().exists(), "{} snapshot missing", format);
            assert_eq!(store.backend().path(), config.snapshot_path().as_path());
            assert_eq!(store.get("a"), Some("2".to_string()), "{} / {}", format, discipline);
            assert_eq!(store.get("b"), Some("two words".to_string()));
            assert!(!store.exists("gone"));

            if discipline == Discipline::DurableAck {
                assert_eq!(store.recovery_report().pending, 0);
                assert!(!store.recovery_report().snapshot_rewritten);
            }
        }
    }
}

#[test]
fn test_drop_then_reopen_is_empty() {
    let temp_dir = TempDir::new().unwrap();
    let clock = manual_clock();
    let config = config(temp_dir.path(), Discipline::DurableAck, SnapshotFormat::Json);

    let mut store = Store::open_with_clock(config.clone(), clock.clone()).unwrap();
    store.set("a", "1", None).unwrap();
    store.drop();

    assert!(store.is_empty());
    assert!(!config.wal_path().exists());
    assert!(!config.snapshot_path().exists());
    assert!(matches!(store.set("b", "2", None), Err(QuillError::Dropped)));
    assert!(matches!(store.clear(), Err(QuillError::Dropped)));
    store.drop();

    let store = Store::open_with_clock(config, clock.clone()).unwrap();
    assert!(store.is_empty());
    assert_eq!(store.recovery_report().records_read, 0);
    assert_eq!(store.recovery_report().pending, 0);
}

// =============================================================================
// Crash Consistency Tests
// =============================================================================

#[test]
fn test_crash_after_start_replays_operation() {
    let temp_dir = TempDir::new().unwrap();
    let clock = manual_clock();
    let wal_path = temp_dir.path().join("testdb.log");

    {
        let mut store = open(temp_dir.path(), Discipline::DurableAck, &clock);
        store.set("a", "1", None).unwrap();
        store.set("b", "1", None).unwrap();
        // Process dies here without closing
    }

    // A START reached the log, but neither the snapshot nor the SUCCESS did
    {
        let mut writer = WalWriter::open(&wal_path, Discipline::DurableAck, WalSyncStrategy::EveryWrite).unwrap();
        writer.begin(set_op("b", "2"), clock.now()).unwrap();
    }

    let mut store = open(temp_dir.path(), Discipline::DurableAck, &clock);
    assert_eq!(store.recovery_report().pending, 1);
    assert_eq!(store.recovery_report().replayed, 1);
    assert_eq!(store.get("a"), Some("1".to_string()));
    assert_eq!(store.get("b"), Some("2".to_string()));
    drop(store);

    // The replay was acknowledged, so the next open has nothing to do
    let store = open(temp_dir.path(), Discipline::DurableAck, &clock);
    assert_eq!(store.recovery_report().pending, 0);
    assert_eq!(store.keys(), vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn test_crash_after_task_replays_log() {
    let temp_dir = TempDir::new().unwrap();
    let clock = manual_clock();
    let wal_path = temp_dir.path().join("testdb.log");
    let snapshot = TextBackend::new(temp_dir.path().join("testdb.db"));

    {
        let mut store = open(temp_dir.path(), Discipline::Simple, &clock);
        store.set("a", "1", None).unwrap();
        store.set("n", "10", None).unwrap();
    }
    {
        let mut writer = WalWriter::open(&wal_path, Discipline::Simple, WalSyncStrategy::EveryWrite).unwrap();
        writer
            .begin(Operation::Incr { key: "n".to_string(), prior: Some("10".to_string()) }, clock.now())
            .unwrap();
        writer.begin(Operation::Delete { key: "a".to_string() }, clock.now()).unwrap();
    }
    assert!(snapshot.load().unwrap().contains_key("a"));

    let mut store = open(temp_dir.path(), Discipline::Simple, &clock);
    assert_eq!(store.get("n"), Some("11".to_string()));
    assert!(!store.exists("a"));
    drop(store);

    // Replaying the same log again changes nothing
    let mut store = open(temp_dir.path(), Discipline::Simple, &clock);
    assert_eq!(store.get("n"), Some("11".to_string()));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_replayed_ttl_does_not_resurrect() {
    let temp_dir = TempDir::new().unwrap();
    let clock = manual_clock();
    let wal_path = temp_dir.path().join("testdb.log");

    {
        let _store = open(temp_dir.path(), Discipline::Simple, &clock);
    }
    {
        let mut writer = WalWriter::open(&wal_path, Discipline::Simple, WalSyncStrategy::EveryWrite).unwrap();
        writer
            .begin(
                Operation::Set {
                    key: "x".to_string(),
                    value: "v".to_string(),
                    ttl_seconds: Some(5),
                },
                clock.now(),
            )
            .unwrap();
    }

    clock.advance_secs(10);
    let mut store = open(temp_dir.path(), Discipline::Simple, &clock);

    assert!(!store.exists("x"));
    assert!(store.is_empty());
}

#[test]
fn test_malformed_line_mid_log_keeps_newer_snapshot() {
    for discipline in [Discipline::Simple, Discipline::DurableAck] {
        let temp_dir = TempDir::new().unwrap();
        let clock = manual_clock();
        let wal_path = temp_dir.path().join("testdb.log");

        {
            let mut store = open(temp_dir.path(), discipline, &clock);
            store.set("a", "1", None).unwrap();
            store.set("a", "2", None).unwrap();
            store.close().unwrap();
        }

        // Damage the line holding the first SET, leaving the second after it
        let log = fs::read_to_string(&wal_path).unwrap();
        let mut lines: Vec<&str> = log.lines().collect();
        let first_set = lines.iter().position(|line| line.contains("SET a 1")).unwrap();
        lines[first_set] = "garbage line";
        let damaged = format!("{}\n", lines.join("\n"));
        fs::write(&wal_path, &damaged).unwrap();

        let mut store = open(temp_dir.path(), discipline, &clock);

        assert!(store.recovery_report().stopped_mid_log);
        assert!(!store.recovery_report().was_truncated);
        assert!(!store.recovery_report().snapshot_rewritten);
        assert_eq!(store.get("a"), Some("2".to_string()), "{}", discipline);
        drop(store);

        // The damaged line and every record after it are still on disk
        let after = fs::read_to_string(&wal_path).unwrap();
        assert!(after.starts_with(&damaged));
    }
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_wal_failure_leaves_map_unchanged() {
    let (_temp, _clock, mut store) = setup_temp_store(Discipline::Simple);
    store.set("keep", "v", None).unwrap();

    store.wal_mut().close().unwrap();

    assert!(matches!(store.set("new", "v", None), Err(QuillError::WalWrite(_))));
    assert!(matches!(store.delete("keep"), Err(QuillError::WalWrite(_))));
    store.set("n", "1", None).unwrap_err();

    assert_eq!(store.get("new"), None);
    assert_eq!(store.get("keep"), Some("v".to_string()));
    assert_eq!(store.len(), 1);
}

/// Writes to `/dev/full` fail with ENOSPC, a real I/O error on the append path
#[cfg(target_os = "linux")]
#[test]
fn test_failed_append_never_reaches_log() {
    for discipline in [Discipline::Simple, Discipline::DurableAck] {
        let temp_dir = TempDir::new().unwrap();
        let clock = manual_clock();
        let wal_path = temp_dir.path().join("testdb.log");

        {
            let mut store = open(temp_dir.path(), discipline, &clock);
            store.set("a", "1", None).unwrap();
            let log_len = fs::metadata(&wal_path).unwrap().len();

            *store.wal_mut() =
                WalWriter::open(Path::new("/dev/full"), discipline, WalSyncStrategy::EveryWrite).unwrap();
            assert!(matches!(store.set("ghost", "boo", None), Err(QuillError::WalWrite(_))));
            assert_eq!(store.get("ghost"), None);
            assert_eq!(fs::metadata(&wal_path).unwrap().len(), log_len);

            // The disk recovers; later writes succeed on a fresh handle
            *store.wal_mut() = WalWriter::open(&wal_path, discipline, WalSyncStrategy::EveryWrite).unwrap();
            store.set("c", "3", None).unwrap();
            store.close().unwrap();
        }

        let records = WalReader::open(&wal_path).unwrap().read_all().unwrap();
        assert!(records.iter().all(|r| r.operation.key() != Some("ghost")));

        let mut store = open(temp_dir.path(), discipline, &clock);
        assert_eq!(store.get("ghost"), None, "{}", discipline);
        assert_eq!(store.keys(), vec!["a".to_string(), "c".to_string()]);
    }
}

#[test]
fn test_snapshot_failure_is_surfaced_then_acknowledged() {
    let temp_dir = TempDir::new().unwrap();
    let clock = manual_clock();

    {
        let (mut store, fail) = open_flaky(temp_dir.path(), Discipline::DurableAck, &clock);
        store.set("a", "1", None).unwrap();

        fail.store(true, Ordering::SeqCst);
        assert!(matches!(store.set("b", "2", None), Err(QuillError::Snapshot(_))));

        fail.store(false, Ordering::SeqCst);
        store.set("c", "3", None).unwrap();
        store.close().unwrap();
    }

    let records = WalReader::open(&temp_dir.path().join("testdb.log")).unwrap().read_all().unwrap();
    let starts = records.iter().filter(|r| r.phase == Phase::Start && r.operation != Operation::Init).count();
    let successes = records.iter().filter(|r| r.phase == Phase::Success).count();
    assert_eq!(starts, successes);

    let (store, _) = open_flaky(temp_dir.path(), Discipline::DurableAck, &clock);
    assert_eq!(store.recovery_report().pending, 0);
    assert_eq!(store.keys(), vec!["a".to_string(), "b".to_string(), "c".to_string()]);
}

#[test]
fn test_snapshot_failure_then_crash_replays() {
    let temp_dir = TempDir::new().unwrap();
    let clock = manual_clock();

    {
        let (mut store, fail) = open_flaky(temp_dir.path(), Discipline::DurableAck, &clock);
        store.set("a", "1", None).unwrap();
        fail.store(true, Ordering::SeqCst);
        store.set("b", "2", None).unwrap_err();
    }

    let on_disk = TextBackend::new(temp_dir.path().join("testdb.db")).load().unwrap();
    assert!(!on_disk.contains_key("b"));

    let (mut store, _) = open_flaky(temp_dir.path(), Discipline::DurableAck, &clock);
    assert_eq!(store.recovery_report().pending, 1);
    assert_eq!(store.get("b"), Some("2".to_string()));
}
