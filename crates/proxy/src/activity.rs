// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Last-traffic timestamps per session.
//!
//! Written by the proxy plane on every completed response and every
//! WebSocket frame; read by the idle reaper. Kept in memory only: stamping
//! must be cheap enough to do per frame, and the durable record only needs
//! activity at persistence points.

use gw_core::SessionKey;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Default)]
pub struct ActivityTracker {
    inner: Arc<Mutex<HashMap<SessionKey, Instant>>>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp now as the last proxied traffic for `key`.
    pub fn touch(&self, key: &SessionKey) {
        self.inner.lock().insert(key.clone(), Instant::now());
    }

    pub fn last(&self, key: &SessionKey) -> Option<Instant> {
        self.inner.lock().get(key).copied()
    }

    /// How long `key` has been quiet, if it has ever been stamped.
    pub fn idle_for(&self, key: &SessionKey) -> Option<Duration> {
        self.last(key).map(|t| t.elapsed())
    }

    /// Forget a session on teardown.
    pub fn remove(&self, key: &SessionKey) {
        self.inner.lock().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gw_core::IdeKind;

    #[test]
    fn touch_then_idle_for_is_small() {
        let tracker = ActivityTracker::new();
        let key = SessionKey::new("alice", "gemini", IdeKind::Editor);
        assert_eq!(tracker.idle_for(&key), None);
        tracker.touch(&key);
        assert!(tracker.idle_for(&key).is_some_and(|d| d < Duration::from_secs(1)));
        tracker.remove(&key);
        assert_eq!(tracker.last(&key), None);
    }
}
