// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tunnel-exit watcher: transport death while a session runs means the
//! session is gone.

use crate::engine::Engine;
use gw_core::{EndReason, SessionEvent, SessionKey, SessionStatus};
use gw_tunnel::TunnelExit;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Consume tunnel exits until cancelled.
pub async fn watch_tunnels(
    engine: Arc<Engine>,
    mut exits: mpsc::Receiver<TunnelExit>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            exit = exits.recv() => {
                let Some(exit) = exit else { break };
                engine.handle_tunnel_exit(exit).await;
            }
        }
    }
}

impl Engine {
    pub(crate) async fn handle_tunnel_exit(&self, exit: TunnelExit) {
        // Port-passthrough tunnels have no session to fail.
        let Ok(key) = exit.id.as_str().parse::<SessionKey>() else {
            return;
        };
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        let Some(session) = self.store.get(&key) else { return };
        if session.status != SessionStatus::Running {
            return;
        }

        // Distinguish "the job died under us" from "the tunnel alone died".
        let job_gone = match session.job_id {
            Some(job_id) => matches!(
                self.interrogator.job_exists(&key.cluster, &key.user, job_id).await,
                Ok(false)
            ),
            None => true,
        };
        let reason = if job_gone { EndReason::SchedulerLost } else { EndReason::Failure };
        warn!(
            session = %key,
            code = ?exit.code,
            %reason,
            stderr = ?exit.stderr_tail.last(),
            "tunnel died under a running session"
        );

        self.proxies.release(&key);
        self.activity.remove(&key);
        let now = self.clock.now_utc();
        let updated = self.store.update(&key, |s| {
            s.finish(SessionStatus::Failed, reason, now);
        });
        if let Ok(Some(session)) = updated {
            self.broadcast(SessionEvent {
                key: key.clone(),
                status: session.status,
                job_id: session.job_id,
                node: session.node.clone(),
                time_left_secs: None,
            });
        }
        self.wake_poller();
    }
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
