// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The shared engine context.

use crate::config::{ClusterCatalog, EngineConfig};
use gw_cluster::{ClusterError, Interrogator};
use gw_core::{Clock, IdeKind, JobRecord, SessionEvent, SessionKey};
use gw_proxy::{ActivityTracker, ProxyRegistry};
use gw_storage::{StateStore, StoreError};
use gw_tunnel::TunnelManager;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{broadcast, Notify};
use tracing::debug;

/// Errors surfaced by engine operations (outside the launch event stream).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown cluster: {0}")]
    UnknownCluster(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error("stop timed out")]
    StopTimeout,
}

/// Last queue view per (user, cluster), kept for the status endpoint so it
/// can answer without a scheduler round-trip.
#[derive(Debug, Clone)]
pub struct CachedQueue {
    pub jobs: HashMap<IdeKind, JobRecord>,
    pub fetched_at: Instant,
}

/// Shared context for the orchestrator and the background loops.
///
/// The engine holds the exclusive owners (store, tunnels, proxies) behind
/// `Arc` and looks sessions up by key on every operation; it caches nothing
/// about a session beyond the per-key lock map.
pub struct Engine {
    pub(crate) store: Arc<StateStore>,
    pub(crate) interrogator: Interrogator,
    pub(crate) tunnels: Arc<TunnelManager>,
    pub(crate) proxies: Arc<ProxyRegistry>,
    pub(crate) activity: ActivityTracker,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) catalog: ClusterCatalog,
    pub(crate) config: EngineConfig,
    locks: Mutex<HashMap<SessionKey, Arc<tokio::sync::Mutex<()>>>>,
    bus: broadcast::Sender<SessionEvent>,
    pub(crate) wake: Arc<Notify>,
    job_cache: Mutex<HashMap<(String, String), CachedQueue>>,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<StateStore>,
        interrogator: Interrogator,
        tunnels: Arc<TunnelManager>,
        proxies: Arc<ProxyRegistry>,
        activity: ActivityTracker,
        clock: Arc<dyn Clock>,
        catalog: ClusterCatalog,
        config: EngineConfig,
    ) -> Arc<Self> {
        let (bus, _) = broadcast::channel(256);
        Arc::new(Self {
            store,
            interrogator,
            tunnels,
            proxies,
            activity,
            clock,
            catalog,
            config,
            locks: Mutex::new(HashMap::new()),
            bus,
            wake: Arc::new(Notify::new()),
            job_cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn proxies(&self) -> &Arc<ProxyRegistry> {
        &self.proxies
    }

    pub fn tunnels(&self) -> &Arc<TunnelManager> {
        &self.tunnels
    }

    pub fn activity(&self) -> &ActivityTracker {
        &self.activity
    }

    pub fn catalog(&self) -> &ClusterCatalog {
        &self.catalog
    }

    /// Subscribe to session mutations (UI poll responders).
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.bus.subscribe()
    }

    /// Nudge the poller into an immediate tick (visibility/wake signals).
    pub fn wake_poller(&self) {
        self.wake.notify_one();
    }

    pub(crate) fn broadcast(&self, event: SessionEvent) {
        debug!(session = %event.key, status = %event.status, "session event");
        let _ = self.bus.send(event);
    }

    /// The per-key mutex serialising launches, stops and reconciliation for
    /// one session key.
    pub(crate) fn key_lock(&self, key: &SessionKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Retry an idempotent scheduler read through the transient budget.
    /// Submission must never go through here.
    pub(crate) async fn read_with_retry<T, F, Fut>(&self, f: F) -> Result<T, ClusterError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ClusterError>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(ClusterError::Remote(e))
                    if e.is_transient() && attempt < self.config.read_retries =>
                {
                    attempt += 1;
                    debug!(attempt, "transient scheduler read failure: {e}");
                    tokio::time::sleep(self.config.read_retry_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub(crate) fn cache_queue(&self, user: &str, cluster: &str, jobs: HashMap<IdeKind, JobRecord>) {
        self.job_cache.lock().insert(
            (user.to_string(), cluster.to_string()),
            CachedQueue { jobs, fetched_at: Instant::now() },
        );
    }

    pub fn cached_queue(&self, user: &str, cluster: &str) -> Option<CachedQueue> {
        self.job_cache.lock().get(&(user.to_string(), cluster.to_string())).cloned()
    }

    /// Drop cached queue state for sessions that no longer exist; called
    /// opportunistically by the poller.
    pub(crate) fn evict_queue(&self, user: &str, cluster: &str) {
        self.job_cache.lock().remove(&(user.to_string(), cluster.to_string()));
    }
}
