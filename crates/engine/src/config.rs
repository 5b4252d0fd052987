// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine tunables and the cluster catalog.

use gw_core::IdeKind;
use std::collections::HashMap;
use std::time::Duration;

/// Everything the engine knows about one cluster.
#[derive(Debug, Clone)]
pub struct ClusterSpec {
    /// Head node DNS name.
    pub head_node: String,
    /// Container images live at `{image_root}/{release}/{ide}.sif`.
    pub image_root: String,
    /// Release library trees live at `{library_root}/{release}`, when set.
    pub library_root: Option<String>,
    /// Bind mounts every job on this cluster gets.
    pub binds: Vec<String>,
    /// Release used when a launch does not pick one.
    pub default_release: String,
}

impl ClusterSpec {
    pub fn image_for(&self, ide: IdeKind, release: &str) -> String {
        format!("{}/{release}/{ide}.sif", self.image_root)
    }

    pub fn library_for(&self, release: &str) -> Option<String> {
        self.library_root.as_ref().map(|root| format!("{root}/{release}"))
    }
}

/// Cluster name → spec, shared by engine and front door.
#[derive(Debug, Clone, Default)]
pub struct ClusterCatalog {
    pub clusters: HashMap<String, ClusterSpec>,
}

impl ClusterCatalog {
    pub fn get(&self, cluster: &str) -> Option<&ClusterSpec> {
        self.clusters.get(cluster)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clusters.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Orchestrator and loop tunables. Defaults are the production values; tests
/// shrink them.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Allocation wait: attempts × interval = the pending-timeout bound.
    pub allocation_attempts: u32,
    pub allocation_interval: Duration,
    /// Port-file polls before falling back to the IDE default port.
    pub port_file_attempts: u32,
    pub port_file_interval: Duration,
    /// Transient-read retry budget (idempotent scheduler reads only).
    pub read_retries: u32,
    pub read_retry_backoff: Duration,
    /// Overall cap on one stop operation.
    pub stop_timeout: Duration,
    /// Idle reap threshold; zero disables the reaper.
    pub idle_threshold: Duration,
    pub reaper_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            allocation_attempts: 60,
            allocation_interval: Duration::from_secs(5),
            port_file_attempts: 30,
            port_file_interval: Duration::from_secs(1),
            read_retries: 3,
            read_retry_backoff: Duration::from_secs(2),
            stop_timeout: Duration::from_secs(15),
            idle_threshold: Duration::from_secs(30 * 60),
            reaper_interval: Duration::from_secs(60),
        }
    }
}
