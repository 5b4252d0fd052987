// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: startup, background loops, shutdown.
//!
//! Startup is fail-fast: a state file that can neither be read nor moved
//! aside, or a listen address that cannot be bound, ends the process with
//! exit code 1. There is no degraded mode.

use crate::config::{Config, ConfigError};
use fs2::FileExt;
use gw_cluster::Interrogator;
use gw_core::SystemClock;
use gw_engine::{watch_tunnels, Engine, Poller, Reaper};
use gw_proxy::{ActivityTracker, ProxyRegistry};
use gw_remote::{SshExec, SshExecConfig};
use gw_storage::StateStore;
use gw_tunnel::{TunnelConfig, TunnelManager};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Errors that end startup.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("another daemon holds {0}")]
    AlreadyRunning(std::path::PathBuf),
    #[error("state file unreadable and unwritable: {0}")]
    StateUnrecoverable(#[source] gw_storage::StoreError),
    #[error("cannot bind {addr}: {source}")]
    Bind { addr: String, #[source] source: std::io::Error },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// A started daemon: engine and background loops. The bound listener is
/// returned separately from [`startup`] so `main` hands it straight to the
/// server.
pub struct Daemon {
    pub config: Arc<Config>,
    pub engine: Arc<Engine>,
    pub shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    // NOTE(lifetime): held to maintain the exclusive PID lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
}

/// Bring the daemon up: lock, load state, build the engine, spawn the
/// loops, bind the listener.
pub async fn startup(
    config: Config,
) -> Result<(Daemon, tokio::net::TcpListener), LifecycleError> {
    let state_dir = config.state_dir()?;
    std::fs::create_dir_all(&state_dir)?;

    // One daemon per state dir.
    let lock_path = state_dir.join("gwd.pid");
    let mut lock_file =
        OpenOptions::new().create(true).write(true).truncate(false).open(&lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| LifecycleError::AlreadyRunning(lock_path.clone()))?;
    let _ = writeln!(lock_file, "{}", std::process::id());

    let store = open_store(&config)?;

    let exec = Arc::new(SshExec::new(SshExecConfig {
        head_nodes: config.head_nodes(),
        key_dir: config.key_dir.clone(),
        timeout: std::time::Duration::from_secs(30),
        max_sessions: config.max_remote_sessions,
    }));
    let interrogator = Interrogator::new(exec);

    let (exit_tx, exit_rx) = mpsc::channel(64);
    let tunnels = Arc::new(TunnelManager::new(
        TunnelConfig::new(config.head_nodes(), config.key_dir.clone()),
        exit_tx,
    ));

    let activity = ActivityTracker::new();
    let proxies = Arc::new(ProxyRegistry::new(activity.clone(), config.external_host.clone()));

    let engine = Engine::new(
        store,
        interrogator,
        tunnels,
        proxies,
        activity,
        Arc::new(SystemClock),
        config.catalog(),
        config.engine_config(),
    );

    let shutdown = CancellationToken::new();
    let tasks = vec![
        tokio::spawn(Poller::new(engine.clone()).run(shutdown.child_token())),
        tokio::spawn(Reaper::new(engine.clone()).run(shutdown.child_token())),
        tokio::spawn(watch_tunnels(engine.clone(), exit_rx, shutdown.child_token())),
    ];

    let addr = config.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| LifecycleError::Bind { addr: addr.to_string(), source })?;
    info!(%addr, clusters = config.clusters.len(), "gangway listening");

    let daemon = Daemon { config: Arc::new(config), engine, shutdown, tasks, lock_file };
    Ok((daemon, listener))
}

/// Load the state store; a corrupt file is moved aside and the daemon
/// starts empty (the poller rebuilds running sessions from the scheduler).
/// Only unreadable-and-unmovable state is fatal.
fn open_store(config: &Config) -> Result<Arc<StateStore>, LifecycleError> {
    let path = config.state_file()?;
    let retention = config.retention();
    match StateStore::open(&path, retention, chrono::Utc::now()) {
        Ok(store) => Ok(Arc::new(store)),
        Err(first_error) => {
            let aside = path.with_extension("corrupt");
            warn!(
                path = %path.display(),
                aside = %aside.display(),
                "state file unreadable ({first_error}); moving aside"
            );
            if std::fs::rename(&path, &aside).is_err() {
                return Err(LifecycleError::StateUnrecoverable(first_error));
            }
            StateStore::open(&path, retention, chrono::Utc::now())
                .map(Arc::new)
                .map_err(LifecycleError::StateUnrecoverable)
        }
    }
}

impl Daemon {
    /// Signal every loop and wait briefly for them to drain.
    pub async fn drain(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            let _ = tokio::time::timeout(std::time::Duration::from_secs(5), task).await;
        }
        info!("gangway drained");
    }
}
