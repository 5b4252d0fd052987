// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration.
//!
//! One TOML file (path from `GW_CONFIG`, default
//! `~/.config/gangway/gangway.toml`) plus a handful of environment
//! overrides. Everything the engine needs (cluster catalog, head nodes,
//! key directory, thresholds) derives from here.

use gw_engine::{ClusterCatalog, ClusterSpec, EngineConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },
    #[error("cannot parse config {path}: {source}")]
    Parse { path: PathBuf, #[source] source: toml::de::Error },
    #[error("config has no clusters")]
    NoClusters,
    #[error("invalid listen address {0:?}")]
    BadListen(String),
    #[error("no home directory and no state_dir configured")]
    NoStateDir,
}

/// One `[clusters.<name>]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    pub head_node: String,
    /// Container images live at `{image_root}/{release}/{ide}.sif`.
    pub image_root: String,
    /// Release library trees at `{library_root}/{release}`, when present.
    #[serde(default)]
    pub library_root: Option<String>,
    #[serde(default)]
    pub binds: Vec<String>,
    pub default_release: String,
}

fn default_listen() -> String {
    "127.0.0.1:8443".to_string()
}

fn default_auth_header() -> String {
    "x-remote-user".to_string()
}

fn default_api_prefix() -> String {
    "/api/v1".to_string()
}

fn default_retention_days() -> u64 {
    14
}

fn default_idle_minutes() -> u64 {
    30
}

fn default_max_remote_sessions() -> usize {
    8
}

fn default_revoke() -> bool {
    true
}

/// The daemon's configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Durable state location; XDG discipline when unset.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    /// Directory holding one private key per user.
    pub key_dir: PathBuf,
    /// Trusted reverse-auth header carrying the principal.
    #[serde(default = "default_auth_header")]
    pub auth_header: String,
    /// Public hostname of this control plane (Location rewrites).
    #[serde(default)]
    pub external_host: Option<String>,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
    /// Idle reap threshold; zero disables reaping.
    #[serde(default = "default_idle_minutes")]
    pub idle_threshold_minutes: u64,
    #[serde(default = "default_max_remote_sessions")]
    pub max_remote_sessions: usize,
    /// Whether logout revokes active sessions (cancelling their jobs).
    #[serde(default = "default_revoke")]
    pub revoke_on_logout: bool,
    pub clusters: HashMap<String, ClusterConfig>,
}

impl Config {
    /// Resolve the config path: `GW_CONFIG` wins, then the XDG location.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("GW_CONFIG") {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gangway")
            .join("gangway.toml")
    }

    pub fn load(path: &PathBuf) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
        let config: Config = toml::from_str(&raw)
            .map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
        if config.clusters.is_empty() {
            return Err(ConfigError::NoClusters);
        }
        Ok(config)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen.parse().map_err(|_| ConfigError::BadListen(self.listen.clone()))
    }

    /// State directory: config > `GW_STATE_DIR` > `$XDG_STATE_HOME/gangway`
    /// > `~/.local/state/gangway`.
    pub fn state_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }
        if let Ok(dir) = std::env::var("GW_STATE_DIR") {
            return Ok(PathBuf::from(dir));
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return Ok(PathBuf::from(xdg).join("gangway"));
        }
        let home = std::env::var("HOME").map_err(|_| ConfigError::NoStateDir)?;
        Ok(PathBuf::from(home).join(".local/state/gangway"))
    }

    pub fn state_file(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.state_dir()?.join("sessions.json"))
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days * 86_400)
    }

    pub fn head_nodes(&self) -> HashMap<String, String> {
        self.clusters
            .iter()
            .map(|(name, cluster)| (name.clone(), cluster.head_node.clone()))
            .collect()
    }

    pub fn catalog(&self) -> ClusterCatalog {
        let clusters = self
            .clusters
            .iter()
            .map(|(name, c)| {
                (
                    name.clone(),
                    ClusterSpec {
                        head_node: c.head_node.clone(),
                        image_root: c.image_root.clone(),
                        library_root: c.library_root.clone(),
                        binds: c.binds.clone(),
                        default_release: c.default_release.clone(),
                    },
                )
            })
            .collect();
        ClusterCatalog { clusters }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            idle_threshold: Duration::from_secs(self.idle_threshold_minutes * 60),
            ..EngineConfig::default()
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
