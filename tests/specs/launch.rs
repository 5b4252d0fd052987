// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Launch specs: the happy path, the pending timeout, and key exclusivity.

use crate::prelude::*;
use gw_core::{IdeKind, LaunchErrorKind, LaunchEvent, SessionStatus};
use gw_remote::FakeExec;

// Alice on gemini, editor, 4 cpus / 40G / 12h. The stream ends with a
// redirect into /code/ and the store holds one running session with every
// link field set.
#[tokio::test]
async fn happy_path_launch() {
    let plane = plane_with(happy_exec(), fast_config());
    let rx = plane.engine.clone().launch("alice", "gemini", IdeKind::Editor, alice_spec());
    let events = collect_events(rx).await;

    match events.last() {
        Some(LaunchEvent::Complete { redirect_url, job_id }) => {
            assert_eq!(redirect_url, "/code/");
            assert_eq!(*job_id, 12345);
        }
        other => panic!("expected complete, got {other:?}"),
    }

    let session = plane.engine.store().get(&alice_editor()).unwrap();
    assert_eq!(session.status, SessionStatus::Running);
    assert_eq!(session.node.as_deref(), Some("gemini-c07"));
    assert_eq!(session.ide_port, Some(8001));
    assert!(session.local_port.is_some());
    assert!(session.token.is_some());
    assert_eq!(plane.engine.tunnels().active_count(), 1);
    assert_eq!(plane.engine.proxies().active_count(), 1);
}

// The scheduler never allocates. The stream ends with pending-timeout
// and the session survives as pending, job id known.
#[tokio::test]
async fn pending_timeout_keeps_the_session() {
    let exec = FakeExec::new()
        .on("sbatch", "Submitted batch job 12345")
        .on("squeue --noheader --user alice", PENDING_ROW);
    let plane = plane_with(exec, fast_config());

    let rx = plane.engine.clone().launch("alice", "gemini", IdeKind::Editor, alice_spec());
    let events = collect_events(rx).await;

    assert!(matches!(events.last(), Some(LaunchEvent::PendingTimeout { job_id: 12345 })));
    let session = plane.engine.store().get(&alice_editor()).unwrap();
    assert_eq!(session.status, SessionStatus::Pending);
    assert_eq!(session.job_id, Some(12345));
}

// Two concurrent launches on the same key. Exactly one progresses; the
// other sees the conflict carrying the winner's job id.
#[tokio::test]
async fn concurrent_launches_conflict() {
    let plane = plane_with(happy_exec(), fast_config());
    let rx1 = plane.engine.clone().launch("alice", "gemini", IdeKind::Editor, alice_spec());
    let rx2 = plane.engine.clone().launch("alice", "gemini", IdeKind::Editor, alice_spec());
    let (events1, events2) = tokio::join!(collect_events(rx1), collect_events(rx2));

    let complete =
        |events: &[LaunchEvent]| events.iter().any(|e| matches!(e, LaunchEvent::Complete { .. }));
    let conflict = |events: &[LaunchEvent]| {
        events.iter().any(|e| {
            matches!(
                e,
                LaunchEvent::Error {
                    kind: LaunchErrorKind::AlreadyActive,
                    job_id: Some(12345),
                    conflict: Some(_),
                    ..
                }
            )
        })
    };
    assert!(complete(&events1) ^ complete(&events2));
    assert!(conflict(&events1) ^ conflict(&events2));
    assert_eq!(plane.exec.call_count("sbatch"), 1);
}

// Every stream ends in exactly one terminal event.
#[tokio::test]
async fn single_terminal_event() {
    for exec in [
        happy_exec(),
        FakeExec::new().on("sbatch", "nothing useful"),
        FakeExec::new()
            .on("sbatch", "Submitted batch job 12345")
            .on("squeue --noheader --user alice", PENDING_ROW),
    ] {
        let plane = plane_with(exec, fast_config());
        let rx = plane.engine.clone().launch("alice", "gemini", IdeKind::Editor, alice_spec());
        let events = collect_events(rx).await;
        let terminals = events.iter().filter(|e| e.is_terminal()).count();
        assert_eq!(terminals, 1, "stream: {events:?}");
        assert!(events.last().is_some_and(LaunchEvent::is_terminal));
    }
}

// Observed statuses only ever move forward: pending, running, terminal.
#[tokio::test]
async fn status_ordering_is_monotone() {
    let plane = plane_with(happy_exec(), fast_config());
    let mut bus = plane.engine.subscribe();
    let rx = plane.engine.clone().launch("alice", "gemini", IdeKind::Editor, alice_spec());
    collect_events(rx).await;
    plane.engine.stop(&alice_editor(), true, gw_core::EndReason::User).await.unwrap();

    let mut rank_floor = 0;
    while let Ok(event) = bus.try_recv() {
        let rank = match event.status {
            SessionStatus::Pending => 0,
            SessionStatus::Running => 1,
            _ => 2,
        };
        assert!(rank >= rank_floor, "status went backwards: {:?}", event.status);
        rank_floor = rank;
    }
    assert_eq!(rank_floor, 2);
}
