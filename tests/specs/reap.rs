// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idle reaping and teardown specs.

use crate::prelude::*;
use gw_core::{EndReason, IdeKind, SessionStatus};
use std::time::Duration;

// A running session with no proxy traffic past the threshold is
// cancelled end-to-end: job cancelled, tunnel closed, proxy released,
// end reason idle.
#[tokio::test]
async fn idle_session_is_reaped() {
    let mut config = fast_config();
    config.idle_threshold = Duration::from_millis(50);
    let plane = plane_with(happy_exec(), config);

    let rx = plane.engine.clone().launch("alice", "gemini", IdeKind::Editor, alice_spec());
    collect_events(rx).await;

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(plane.engine.reap_idle().await, 1);

    let session = plane.engine.store().get(&alice_editor()).unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
    assert_eq!(session.end_reason, Some(EndReason::Idle));
    assert!(plane.exec.call_count("scancel 12345") >= 1);
    assert_eq!(plane.engine.tunnels().active_count(), 0);
    assert_eq!(plane.engine.proxies().active_count(), 0);
}

// Activity through the proxy plane resets the idle clock.
#[tokio::test]
async fn recent_traffic_protects_from_reaping() {
    let mut config = fast_config();
    config.idle_threshold = Duration::from_secs(1800);
    let plane = plane_with(happy_exec(), config);

    let rx = plane.engine.clone().launch("alice", "gemini", IdeKind::Editor, alice_spec());
    collect_events(rx).await;

    plane.tracker.touch(&alice_editor());
    assert_eq!(plane.engine.reap_idle().await, 0);
    assert_eq!(
        plane.engine.store().get(&alice_editor()).unwrap().status,
        SessionStatus::Running
    );
}

// A stopped session leaves nothing behind, and stopping twice is safe.
#[tokio::test]
async fn teardown_leaves_no_residue() {
    let plane = plane_with(happy_exec(), fast_config());
    let rx = plane.engine.clone().launch("alice", "gemini", IdeKind::Editor, alice_spec());
    collect_events(rx).await;

    assert!(plane.engine.stop(&alice_editor(), true, EndReason::User).await.unwrap());
    assert!(!plane.engine.stop(&alice_editor(), true, EndReason::User).await.unwrap());

    assert_eq!(plane.engine.tunnels().active_count(), 0);
    assert_eq!(plane.engine.proxies().active_count(), 0);
    assert!(plane.tracker.last(&alice_editor()).is_none());
    let session = plane.engine.store().get(&alice_editor()).unwrap();
    assert!(session.status.is_terminal());
    assert!(session.ended_at.is_some());
}
