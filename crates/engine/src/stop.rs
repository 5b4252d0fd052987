// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stop and the teardown ladder.

use crate::engine::{Engine, EngineError};
use gw_core::{EndReason, SessionEvent, SessionKey, SessionStatus};
use gw_tunnel::TunnelId;
use tracing::{info, warn};

impl Engine {
    /// Stop a session: cancel its job (optionally), kill its tunnel, release
    /// its proxy, then commit the terminal state. Idempotent: stopping an
    /// already-terminal or unknown session returns `Ok(false)`.
    pub async fn stop(
        &self,
        key: &SessionKey,
        cancel_job: bool,
        reason: EndReason,
    ) -> Result<bool, EngineError> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let Some(session) = self.store.get(key) else {
            return Ok(false);
        };
        if !session.is_active() {
            return Ok(false);
        }

        info!(session = %key, cancel_job, %reason, "stopping session");
        let teardown =
            self.teardown(key, session.job_id, cancel_job, SessionStatus::Cancelled, reason);
        match tokio::time::timeout(self.config.stop_timeout, teardown).await {
            Ok(()) => Ok(true),
            Err(_) => Err(EngineError::StopTimeout),
        }
    }

    /// The teardown ladder. Partial failures are logged, never fatal, and
    /// the state store commits last so a crash mid-teardown leaves a
    /// recoverable record for the next reconcile.
    ///
    /// Callers must hold the key lock.
    pub(crate) async fn teardown(
        &self,
        key: &SessionKey,
        job_id: Option<u64>,
        cancel_job: bool,
        status: SessionStatus,
        reason: EndReason,
    ) {
        if cancel_job {
            if let Some(job_id) = job_id {
                let cancel = self.interrogator.cancel(&key.cluster, &key.user, job_id);
                match tokio::time::timeout(self.config.stop_timeout, cancel).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(session = %key, job_id, "job cancel failed: {e}"),
                    Err(_) => warn!(session = %key, job_id, "job cancel timed out"),
                }
            }
        }

        self.tunnels.stop(&TunnelId::from(key));
        self.proxies.release(key);
        self.activity.remove(key);

        let now = self.clock.now_utc();
        let updated = self.store.update(key, |s| {
            if s.is_active() {
                s.finish(status, reason, now);
            }
        });
        match updated {
            Ok(Some(session)) => self.broadcast(SessionEvent {
                key: key.clone(),
                status: session.status,
                job_id: session.job_id,
                node: session.node.clone(),
                time_left_secs: None,
            }),
            Ok(None) => {}
            Err(e) => warn!(session = %key, "state commit after teardown failed: {e}"),
        }
    }
}

#[cfg(test)]
#[path = "stop_tests.rs"]
mod tests;
