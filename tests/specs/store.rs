// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durability specs: what survives a control-plane restart.

use crate::prelude::*;
use gw_core::{IdeKind, SessionStatus};
use gw_storage::StateStore;

// A launched session survives a reload of the
// state file with every non-derived field intact.
#[tokio::test]
async fn running_session_survives_restart() {
    let plane = plane_with(happy_exec(), fast_config());
    let rx = plane.engine.clone().launch("alice", "gemini", IdeKind::Editor, alice_spec());
    collect_events(rx).await;
    let before = plane.engine.store().get(&alice_editor()).unwrap();

    // A second store over the same file is the restarted daemon's view.
    let reloaded =
        StateStore::open(&plane.state_file, plane.retention, chrono::Utc::now()).unwrap();
    let after = reloaded.get(&alice_editor()).unwrap();
    assert_eq!(after, before);
    assert_eq!(after.status, SessionStatus::Running);
    assert_eq!(after.token, before.token);
    assert_eq!(after.local_port, before.local_port);
}

// Terminal records are kept for audit until retention, so a restart right
// after a stop still sees the cancelled record.
#[tokio::test]
async fn terminal_records_survive_restart_within_retention() {
    let plane = plane_with(happy_exec(), fast_config());
    let rx = plane.engine.clone().launch("alice", "gemini", IdeKind::Editor, alice_spec());
    collect_events(rx).await;
    plane.engine.stop(&alice_editor(), true, gw_core::EndReason::User).await.unwrap();

    let reloaded =
        StateStore::open(&plane.state_file, plane.retention, chrono::Utc::now()).unwrap();
    let session = reloaded.get(&alice_editor()).unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
    assert!(session.ended_at.is_some());
}
