// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gw_core::test_support::{t0, SessionBuilder};
use gw_core::IdeKind;
use proptest::prelude::*;

const WEEK: Duration = Duration::from_secs(7 * 86_400);

fn store_at(dir: &tempfile::TempDir) -> StateStore {
    StateStore::open(dir.path().join("sessions.json"), WEEK, t0()).unwrap()
}

#[test]
fn missing_file_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_at(&dir);
    assert!(store.snapshot().is_empty());
}

#[test]
fn upsert_then_reload_preserves_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.json");

    let session = SessionBuilder::new("alice", "gemini", IdeKind::Editor)
        .status(gw_core::SessionStatus::Running)
        .job_id(12345)
        .node("gemini-c07")
        .ports(8001, 37241)
        .token("tok")
        .build();

    let store = StateStore::open(&path, WEEK, t0()).unwrap();
    store.upsert(session.clone()).unwrap();
    drop(store);

    let reloaded = StateStore::open(&path, WEEK, t0()).unwrap();
    assert_eq!(reloaded.get(&session.key), Some(session));
}

#[test]
fn reserve_conflicts_on_active_key() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_at(&dir);

    let first = SessionBuilder::new("alice", "gemini", IdeKind::Editor).job_id(12345).build();
    assert!(matches!(store.reserve(first).unwrap(), Reservation::Created));

    let second = SessionBuilder::new("alice", "gemini", IdeKind::Editor).build();
    match store.reserve(second).unwrap() {
        Reservation::Conflict(existing) => assert_eq!(existing.job_id, Some(12345)),
        Reservation::Created => panic!("conflict expected"),
    }
}

#[test]
fn reserve_replaces_terminal_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_at(&dir);

    let done = SessionBuilder::new("alice", "gemini", IdeKind::Editor)
        .status(gw_core::SessionStatus::Completed)
        .build();
    store.upsert(done).unwrap();

    let fresh = SessionBuilder::new("alice", "gemini", IdeKind::Editor).build();
    assert!(matches!(store.reserve(fresh).unwrap(), Reservation::Created));
}

#[test]
fn load_prunes_old_terminal_records_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.json");

    let store = StateStore::open(&path, WEEK, t0()).unwrap();
    let mut old = SessionBuilder::new("alice", "gemini", IdeKind::Editor).build();
    old.finish(gw_core::SessionStatus::Completed, gw_core::EndReason::User, t0());
    store.upsert(old).unwrap();
    let active = SessionBuilder::new("bob", "gemini", IdeKind::Jupyter).build();
    store.upsert(active.clone()).unwrap();
    drop(store);

    // Reload two weeks later: the terminal record ages out, the active stays.
    let later = t0() + chrono::Duration::days(14);
    let reloaded = StateStore::open(&path, WEEK, later).unwrap();
    let snapshot = reloaded.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].key, active.key);
}

#[test]
fn corrupt_file_is_an_error_not_a_wipe() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.json");
    std::fs::write(&path, "{\"v\":1,\"sessions\":[{\"trunc").unwrap();
    assert!(StateStore::open(&path, WEEK, t0()).is_err());
    // The broken file is untouched for the operator to inspect.
    assert!(path.exists());
}

#[test]
fn future_version_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.json");
    std::fs::write(&path, "{\"v\":99,\"sessions\":[]}").unwrap();
    match StateStore::open(&path, WEEK, t0()) {
        Err(StoreError::UnsupportedVersion(99)) => {}
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn no_temp_file_left_behind() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_at(&dir);
    store
        .upsert(SessionBuilder::new("alice", "gemini", IdeKind::Editor).build())
        .unwrap();
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn snapshot_is_key_ordered() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_at(&dir);
    store.upsert(SessionBuilder::new("zoe", "gemini", IdeKind::Editor).build()).unwrap();
    store.upsert(SessionBuilder::new("alice", "taurus", IdeKind::Jupyter).build()).unwrap();
    store.upsert(SessionBuilder::new("alice", "gemini", IdeKind::Editor).build()).unwrap();

    let users: Vec<String> = store.snapshot().into_iter().map(|s| s.key.to_string()).collect();
    assert_eq!(users, ["alice/gemini/editor", "alice/taurus/jupyter", "zoe/gemini/editor"]);
}

#[test]
fn find_running_picks_latest_start_across_clusters() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_at(&dir);
    let mut first = SessionBuilder::new("alice", "gemini", IdeKind::Editor)
        .status(gw_core::SessionStatus::Running)
        .node("gemini-c01")
        .ports(8001, 37001)
        .build();
    first.started_at = Some(t0() - chrono::Duration::hours(2));
    store.upsert(first).unwrap();
    let second = SessionBuilder::new("alice", "taurus", IdeKind::Editor)
        .status(gw_core::SessionStatus::Running)
        .node("taurus-c09")
        .ports(8002, 37002)
        .build();
    store.upsert(second.clone()).unwrap();

    assert_eq!(store.find_running("alice", IdeKind::Editor), Some(second));
}

proptest! {
    // Persist-then-reload preserves every non-derived field.
    #[test]
    fn round_trip_preserves_sessions(
        sessions in proptest::collection::vec(
            gw_core::test_support::strategies::arb_session(), 0..8
        )
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let store = StateStore::open(&path, WEEK, t0()).unwrap();
        let mut expected = std::collections::BTreeMap::new();
        for session in sessions {
            expected.insert(session.key.clone(), session.clone());
            store.upsert(session).unwrap();
        }
        drop(store);

        let reloaded = StateStore::open(&path, WEEK, t0()).unwrap();
        let got: std::collections::BTreeMap<_, _> =
            reloaded.snapshot().into_iter().map(|s| (s.key.clone(), s)).collect();
        prop_assert_eq!(got, expected);
    }
}
