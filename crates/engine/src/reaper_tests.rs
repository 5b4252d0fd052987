// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{collect_events, fast_config, happy_exec, harness_with, launch_spec};
use gw_core::{IdeKind, SessionKey, SessionStatus};

fn key() -> SessionKey {
    SessionKey::new("alice", "gemini", IdeKind::Editor)
}

#[tokio::test]
async fn idle_session_is_reaped_with_job_cancel() {
    let mut config = fast_config();
    config.idle_threshold = Duration::from_millis(50);
    let harness = harness_with(happy_exec(), config);
    let rx = harness.engine.clone().launch("alice", "gemini", IdeKind::Editor, launch_spec());
    collect_events(rx).await;

    // No proxy traffic past the threshold.
    tokio::time::sleep(Duration::from_millis(120)).await;
    let reaped = harness.engine.reap_idle().await;
    assert_eq!(reaped, 1);

    let session = harness.engine.store().get(&key()).unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
    assert_eq!(session.end_reason, Some(EndReason::Idle));
    assert!(harness.exec.call_count("scancel 12345") >= 1);
    assert_eq!(harness.engine.tunnels().active_count(), 0);
    assert_eq!(harness.engine.proxies().active_count(), 0);
}

#[tokio::test]
async fn recent_activity_protects_the_session() {
    let mut config = fast_config();
    config.idle_threshold = Duration::from_secs(3600);
    let harness = harness_with(happy_exec(), config);
    let rx = harness.engine.clone().launch("alice", "gemini", IdeKind::Editor, launch_spec());
    collect_events(rx).await;

    harness.tracker.touch(&key());
    assert_eq!(harness.engine.reap_idle().await, 0);
    assert_eq!(
        harness.engine.store().get(&key()).unwrap().status,
        SessionStatus::Running
    );
}

#[tokio::test]
async fn zero_threshold_disables_the_reaper() {
    let mut config = fast_config();
    config.idle_threshold = Duration::ZERO;
    let harness = harness_with(happy_exec(), config);
    let rx = harness.engine.clone().launch("alice", "gemini", IdeKind::Editor, launch_spec());
    collect_events(rx).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.engine.reap_idle().await, 0);
    assert_eq!(
        harness.engine.store().get(&key()).unwrap().status,
        SessionStatus::Running
    );
}

#[tokio::test]
async fn reap_is_idempotent_against_already_cancelled_sessions() {
    let mut config = fast_config();
    config.idle_threshold = Duration::from_millis(10);
    let harness = harness_with(happy_exec(), config);
    let rx = harness.engine.clone().launch("alice", "gemini", IdeKind::Editor, launch_spec());
    collect_events(rx).await;

    harness.engine.stop(&key(), true, EndReason::User).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(harness.engine.reap_idle().await, 0);
    // The original end reason survives.
    assert_eq!(
        harness.engine.store().get(&key()).unwrap().end_reason,
        Some(EndReason::User)
    );
}
