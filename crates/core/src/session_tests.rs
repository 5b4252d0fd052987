// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::t0;
use chrono::Duration as ChronoDuration;

fn key() -> SessionKey {
    SessionKey::new("alice", "gemini", IdeKind::Editor)
}

#[test]
fn key_display_and_parse_round_trip() {
    let k = key();
    assert_eq!(k.to_string(), "alice/gemini/editor");
    assert_eq!("alice/gemini/editor".parse::<SessionKey>().unwrap(), k);
}

#[yare::parameterized(
    empty = { "" },
    two_parts = { "alice/gemini" },
    bad_ide = { "alice/gemini/vim" },
    empty_user = { "/gemini/editor" },
)]
fn malformed_keys_rejected(input: &str) {
    assert!(input.parse::<SessionKey>().is_err());
}

#[test]
fn new_session_is_pending_and_active() {
    let s = Session::new(key(), "2026.1", ResourceSpec::default(), t0());
    assert_eq!(s.status, SessionStatus::Pending);
    assert!(s.is_active());
    assert!(s.ended_at.is_none());
    assert!(s.end_reason.is_none());
}

#[test]
fn mark_running_sets_link_fields_and_seeds_activity() {
    let mut s = Session::new(key(), "2026.1", ResourceSpec::default(), t0());
    let later = t0() + ChronoDuration::seconds(42);
    s.mark_submitted(12345, t0());
    s.mark_running("gemini-c07", 8001, 37241, later);

    assert_eq!(s.status, SessionStatus::Running);
    assert!(s.running_record_complete());
    assert_eq!(s.started_at, Some(later));
    // The idle clock starts at launch, never before it.
    assert_eq!(s.last_activity, Some(later));
}

#[test]
fn running_record_complete_requires_all_link_fields() {
    let mut s = Session::new(key(), "2026.1", ResourceSpec::default(), t0());
    s.status = SessionStatus::Running;
    assert!(!s.running_record_complete());
    s.node = Some("gemini-c07".into());
    s.ide_port = Some(8001);
    assert!(!s.running_record_complete());
    s.local_port = Some(37241);
    assert!(s.running_record_complete());
}

#[yare::parameterized(
    completed = { SessionStatus::Completed, EndReason::Expired },
    failed = { SessionStatus::Failed, EndReason::Failure },
    cancelled = { SessionStatus::Cancelled, EndReason::Idle },
)]
fn finish_sets_ended_at_with_terminal_status(status: SessionStatus, reason: EndReason) {
    let mut s = Session::new(key(), "2026.1", ResourceSpec::default(), t0());
    let end = t0() + ChronoDuration::minutes(5);
    s.finish(status, reason, end);

    // ended_at moves in lock-step with terminal statuses.
    assert!(s.status.is_terminal());
    assert_eq!(s.ended_at, Some(end));
    assert_eq!(s.end_reason, Some(reason));
    assert!(!s.is_active());
}

#[test]
fn serde_skips_absent_optionals() {
    let s = Session::new(key(), "2026.1", ResourceSpec::default(), t0());
    let json = serde_json::to_string(&s).unwrap();
    assert!(!json.contains("job_id"));
    assert!(!json.contains("ended_at"));
    assert!(json.contains("\"status\":\"pending\""));
}
