// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The adaptive poller.
//!
//! One loop per process reconciles the state store against the scheduler
//! for every active user. Pacing comes from a table keyed by the worst
//! time-to-expiry across running sessions (any pending session pins the
//! fast rate), and a change hash drives progressive backoff: after
//! [`BACKOFF_THRESHOLD`] identical ticks the interval grows by 1.5^(k−2),
//! capped at an hour. Wake signals from the front door reset the backoff
//! and force an immediate tick.

use crate::engine::Engine;
use gw_core::{EndReason, JobRecord, Session, SessionEvent, SessionStatus};
use gw_tunnel::TunnelId;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Unchanged ticks before backoff engages.
pub const BACKOFF_THRESHOLD: u32 = 3;

/// Backoff ceiling.
const BACKOFF_CAP: Duration = Duration::from_secs(3600);

/// Newly submitted sessions get this long to appear in the queue before a
/// missing job id means anything.
const VANISH_GRACE_SECS: i64 = 90;

/// Time-left bucket width for the change hash: expiry movement within five
/// minutes is not a change worth waking up for.
const HASH_BUCKET_SECS: u64 = 300;

/// Inputs to the pacing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaceInput {
    pub any_pending: bool,
    pub running_count: usize,
    /// Worst (smallest) time-left across running sessions, when known.
    pub min_time_left_secs: Option<u64>,
}

/// The base interval table from worst time-to-expiry.
pub fn base_interval(input: &PaceInput) -> Duration {
    if input.any_pending {
        return Duration::from_secs(15);
    }
    if input.running_count == 0 {
        return Duration::from_secs(30 * 60);
    }
    match input.min_time_left_secs {
        Some(tl) if tl < 10 * 60 => Duration::from_secs(15),
        Some(tl) if tl < 30 * 60 => Duration::from_secs(60),
        Some(tl) if tl < 60 * 60 => Duration::from_secs(5 * 60),
        Some(tl) if tl < 6 * 3600 => Duration::from_secs(10 * 60),
        _ => Duration::from_secs(30 * 60),
    }
}

/// Progressive backoff after `unchanged_ticks` identical ticks.
pub fn apply_backoff(base: Duration, unchanged_ticks: u32) -> Duration {
    if unchanged_ticks < BACKOFF_THRESHOLD {
        return base;
    }
    let exponent = (unchanged_ticks - 2).min(16);
    let scaled = base.mul_f64(1.5_f64.powi(exponent as i32));
    scaled.min(BACKOFF_CAP)
}

/// One tick's outcome.
#[derive(Debug)]
pub struct TickReport {
    pub reads: usize,
    pub warnings: usize,
    pub mutated: usize,
    pub hash: [u8; 32],
    pub pace: PaceInput,
}

/// The background loop. Construction is cheap; `run` never returns until
/// cancelled.
pub struct Poller {
    engine: Arc<Engine>,
}

impl Poller {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub async fn run(self, token: CancellationToken) {
        let mut unchanged: u32 = 0;
        let mut last_hash: Option<[u8; 32]> = None;
        info!("poller started");
        loop {
            if token.is_cancelled() {
                break;
            }
            let report = self.engine.poll_tick().await;
            if last_hash == Some(report.hash) {
                unchanged += 1;
            } else {
                unchanged = 0;
                last_hash = Some(report.hash);
            }

            let interval = apply_backoff(base_interval(&report.pace), unchanged);
            debug!(
                reads = report.reads,
                warnings = report.warnings,
                mutated = report.mutated,
                unchanged,
                interval_secs = interval.as_secs(),
                "tick complete"
            );

            tokio::select! {
                _ = token.cancelled() => break,
                _ = self.engine.wake.notified() => {
                    unchanged = 0;
                    last_hash = None;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("poller stopped");
    }
}

impl Engine {
    /// One reconciliation pass over every active user.
    pub async fn poll_tick(&self) -> TickReport {
        let sessions = self.store.active_sessions();
        let mut pairs: BTreeMap<(String, String), Vec<Session>> = BTreeMap::new();
        for session in sessions {
            pairs
                .entry((session.key.user.clone(), session.key.cluster.clone()))
                .or_default()
                .push(session);
        }
        let pair_list: Vec<(String, String)> = pairs.keys().cloned().collect();
        self.poll_pairs(pair_list, pairs).await
    }

    /// Force a reconciliation for one user across every configured cluster,
    /// including clusters where they have no recorded session (so externally
    /// submitted IDE jobs show up).
    pub async fn refresh_user(&self, user: &str) -> TickReport {
        let mut pairs: BTreeMap<(String, String), Vec<Session>> = BTreeMap::new();
        for cluster in self.catalog.names() {
            pairs.insert((user.to_string(), cluster), Vec::new());
        }
        for session in self.store.active_for_user(user) {
            if let Some(bucket) =
                pairs.get_mut(&(session.key.user.clone(), session.key.cluster.clone()))
            {
                bucket.push(session);
            }
        }
        let pair_list: Vec<(String, String)> = pairs.keys().cloned().collect();
        self.poll_pairs(pair_list, pairs).await
    }

    async fn poll_pairs(
        &self,
        pair_list: Vec<(String, String)>,
        mut pairs: BTreeMap<(String, String), Vec<Session>>,
    ) -> TickReport {
        // All reads go out concurrently; commits happen serially below.
        let reads = pair_list.len();
        let futures = pair_list.into_iter().map(|(user, cluster)| async move {
            let view = self.interrogator.get_all_jobs(&cluster, &user).await;
            (user, cluster, view)
        });
        let results = futures_util::future::join_all(futures).await;

        let mut warnings = 0;
        let mut mutated = 0;
        for (user, cluster, result) in results {
            let view = match result {
                Ok(view) => view,
                Err(e) => {
                    // Failure isolation: this pair keeps its previous state.
                    warn!(%user, %cluster, "queue read failed: {e}");
                    warnings += 1;
                    continue;
                }
            };
            if view.dropped_rows > 0 {
                warnings += view.dropped_rows;
            }
            let previous = self.cached_queue(&user, &cluster);
            self.cache_queue(&user, &cluster, view.jobs.clone());

            let sessions = pairs.remove(&(user.clone(), cluster.clone())).unwrap_or_default();
            if sessions.is_empty() {
                continue;
            }
            for session in sessions {
                let job = view.jobs.get(&session.key.ide);
                let last_seen = previous
                    .as_ref()
                    .and_then(|cache| cache.jobs.get(&session.key.ide))
                    .cloned();
                if self.reconcile_session(&session.key, job, last_seen.as_ref()).await {
                    mutated += 1;
                }
            }
        }

        let (hash, pace) = self.tick_digest();
        TickReport { reads, warnings, mutated, hash, pace }
    }

    /// Reconcile one session against its queue row. Skips (without blocking)
    /// any key with a launch or stop in flight; that operation owns the
    /// session right now.
    async fn reconcile_session(
        &self,
        key: &gw_core::SessionKey,
        job: Option<&JobRecord>,
        last_seen: Option<&JobRecord>,
    ) -> bool {
        let lock = self.key_lock(key);
        let Ok(_guard) = lock.try_lock() else {
            return false;
        };
        let Some(session) = self.store.get(key) else {
            return false;
        };
        if !session.is_active() {
            return false;
        }

        match (session.status, job) {
            (SessionStatus::Pending, Some(record)) => {
                let mut changed = false;
                if session.job_id != Some(record.id) {
                    // Adopt the job id: covers state lost and rebuilt from
                    // the queue.
                    let now = self.clock.now_utc();
                    let _ = self.store.update(key, |s| s.mark_submitted(record.id, now));
                    changed = true;
                }
                self.broadcast(SessionEvent {
                    key: key.clone(),
                    status: SessionStatus::Pending,
                    job_id: Some(record.id),
                    node: record.node.clone(),
                    time_left_secs: record.time_left_secs,
                });
                changed
            }
            (SessionStatus::Pending, None) => {
                let now = self.clock.now_utc();
                if (now - session.updated_at).num_seconds() < VANISH_GRACE_SECS {
                    // Submit→queue visibility race; give it a beat.
                    return false;
                }
                info!(session = %key, "pending job left the queue");
                let _ = self.store.update(key, |s| {
                    s.finish(SessionStatus::Completed, EndReason::SchedulerLost, now)
                });
                self.broadcast(SessionEvent {
                    key: key.clone(),
                    status: SessionStatus::Completed,
                    job_id: session.job_id,
                    node: None,
                    time_left_secs: None,
                });
                true
            }
            (SessionStatus::Running, Some(record)) => {
                self.broadcast(SessionEvent {
                    key: key.clone(),
                    status: SessionStatus::Running,
                    job_id: Some(record.id),
                    node: record.node.clone(),
                    time_left_secs: record.time_left_secs,
                });
                false
            }
            (SessionStatus::Running, None) => {
                // The job is gone; reclaim what the session held. The
                // allocation expiring is the common cause, recognised by the
                // time-left we last saw.
                let reason = match last_seen.and_then(|r| r.time_left_secs) {
                    Some(tl) if tl <= HASH_BUCKET_SECS => EndReason::Expired,
                    _ => EndReason::SchedulerLost,
                };
                info!(session = %key, %reason, "running job left the queue");
                self.tunnels.stop(&TunnelId::from(key));
                self.proxies.release(key);
                self.activity.remove(key);
                let now = self.clock.now_utc();
                let _ = self
                    .store
                    .update(key, |s| s.finish(SessionStatus::Completed, reason, now));
                self.broadcast(SessionEvent {
                    key: key.clone(),
                    status: SessionStatus::Completed,
                    job_id: session.job_id,
                    node: session.node.clone(),
                    time_left_secs: None,
                });
                self.evict_queue(&key.user, &key.cluster);
                true
            }
            _ => false,
        }
    }

    /// Hash of everything the UI would care about: keys, statuses, job ids
    /// and 5-minute time-left buckets. Identical digests mean an idle
    /// cluster and feed the backoff.
    fn tick_digest(&self) -> ([u8; 32], PaceInput) {
        let sessions = self.store.active_sessions();
        let mut hasher = Sha256::new();
        let mut pace = PaceInput { any_pending: false, running_count: 0, min_time_left_secs: None };

        for session in &sessions {
            let cached = self
                .cached_queue(&session.key.user, &session.key.cluster)
                .and_then(|cache| cache.jobs.get(&session.key.ide).cloned());
            let time_left = cached.as_ref().and_then(|record| record.time_left_secs);

            match session.status {
                SessionStatus::Pending => pace.any_pending = true,
                SessionStatus::Running => {
                    pace.running_count += 1;
                    if let Some(tl) = time_left {
                        pace.min_time_left_secs =
                            Some(pace.min_time_left_secs.map_or(tl, |m| m.min(tl)));
                    }
                }
                _ => {}
            }

            let bucket = time_left.map(|tl| tl / HASH_BUCKET_SECS);
            hasher.update(
                format!(
                    "{}|{}|{:?}|{:?}\n",
                    session.key, session.status, session.job_id, bucket
                )
                .as_bytes(),
            );
        }
        (hasher.finalize().into(), pace)
    }
}

#[cfg(test)]
#[path = "poller_tests.rs"]
mod tests;
