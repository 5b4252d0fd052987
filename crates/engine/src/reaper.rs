// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The idle reaper.

use crate::engine::Engine;
use gw_core::{EndReason, SessionStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Periodic sweep cancelling running sessions whose last proxied byte is
/// older than the configured threshold. A threshold of zero disables it.
pub struct Reaper {
    engine: Arc<Engine>,
}

impl Reaper {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub async fn run(self, token: CancellationToken) {
        let interval = self.engine.config.reaper_interval;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            self.engine.reap_idle().await;
        }
    }
}

impl Engine {
    /// One reaper sweep. Returns how many sessions were reaped.
    pub async fn reap_idle(&self) -> usize {
        let threshold = self.config.idle_threshold;
        if threshold.is_zero() {
            return 0;
        }

        let mut reaped = 0;
        for session in self.store.active_sessions() {
            if session.status != SessionStatus::Running {
                continue;
            }
            let idle = self.idle_duration(&session);
            let Some(idle) = idle else { continue };
            if idle <= threshold {
                continue;
            }

            info!(session = %session.key, idle_secs = idle.as_secs(), "reaping idle session");
            match self.stop(&session.key, true, EndReason::Idle).await {
                Ok(true) => reaped += 1,
                Ok(false) => {} // raced with another stop; fine
                Err(e) => warn!(session = %session.key, "idle reap failed: {e}"),
            }
        }
        reaped
    }

    /// Idle time from the in-memory tracker, falling back to the persisted
    /// stamp after a restart (the tracker starts empty).
    fn idle_duration(&self, session: &gw_core::Session) -> Option<Duration> {
        if let Some(idle) = self.activity.idle_for(&session.key) {
            return Some(idle);
        }
        let last = session.last_activity?;
        (self.clock.now_utc() - last).to_std().ok()
    }
}

#[cfg(test)]
#[path = "reaper_tests.rs"]
mod tests;
