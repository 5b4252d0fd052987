// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{collect_events, fast_config, harness_with, launch_spec};
use gw_core::IdeKind;
use gw_remote::FakeExec;
use gw_tunnel::TunnelId;

fn key() -> SessionKey {
    SessionKey::new("alice", "gemini", IdeKind::Editor)
}

fn exit_for(key: &SessionKey) -> TunnelExit {
    TunnelExit {
        id: TunnelId::from(key),
        code: Some(255),
        stderr_tail: vec!["client_loop: send disconnect".to_string()],
    }
}

#[tokio::test]
async fn tunnel_death_with_live_job_is_a_plain_failure() {
    let exec = FakeExec::new()
        .on("sbatch", "Submitted batch job 12345")
        .on("squeue --noheader --user alice", crate::test_helpers::RUNNING_ROW)
        .on("squeue --noheader --jobs 12345", "12345")
        .on("cat", "8001");
    let harness = harness_with(exec, fast_config());
    let rx = harness.engine.clone().launch("alice", "gemini", IdeKind::Editor, launch_spec());
    collect_events(rx).await;

    harness.engine.handle_tunnel_exit(exit_for(&key())).await;

    let session = harness.engine.store().get(&key()).unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.end_reason, Some(EndReason::Failure));
    assert_eq!(harness.engine.proxies().active_count(), 0);
}

#[tokio::test]
async fn tunnel_death_with_vanished_job_is_scheduler_lost() {
    let exec = FakeExec::new()
        .on("sbatch", "Submitted batch job 12345")
        .on("squeue --noheader --user alice", crate::test_helpers::RUNNING_ROW)
        .on("squeue --noheader --jobs 12345", "")
        .on("cat", "8001");
    let harness = harness_with(exec, fast_config());
    let rx = harness.engine.clone().launch("alice", "gemini", IdeKind::Editor, launch_spec());
    collect_events(rx).await;

    harness.engine.handle_tunnel_exit(exit_for(&key())).await;

    let session = harness.engine.store().get(&key()).unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.end_reason, Some(EndReason::SchedulerLost));
}

#[tokio::test]
async fn exits_for_unknown_or_settled_sessions_are_ignored() {
    let harness = harness_with(FakeExec::new(), fast_config());
    // No session at all.
    harness.engine.handle_tunnel_exit(exit_for(&key())).await;
    assert!(harness.engine.store().get(&key()).is_none());

    // Port-passthrough tunnels carry no session key.
    harness
        .engine
        .handle_tunnel_exit(TunnelExit {
            id: TunnelId::for_port("alice", "gemini", 3000),
            code: None,
            stderr_tail: Vec::new(),
        })
        .await;
}
