// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared spec fixtures: an engine wired exactly as the daemon wires it,
//! with a scripted remote executor and stub tunnel transports backed by
//! loopback listeners.

#![allow(dead_code)]

use gw_cluster::Interrogator;
use gw_core::{IdeKind, LaunchEvent, ResourceSpec, SessionKey, SystemClock};
use gw_engine::{ClusterCatalog, ClusterSpec, Engine, EngineConfig, LaunchSpec};
use gw_proxy::{ActivityTracker, ProxyRegistry};
use gw_remote::FakeExec;
use gw_storage::StateStore;
use gw_tunnel::{TunnelConfig, TunnelExit, TunnelManager};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const RUNNING_ROW: &str =
    "12345|editor-alice|RUNNING|gemini-c07|11:58:47|12:00:00|4|40G|2026-08-01T09:00:00";
pub const PENDING_ROW: &str =
    "12345|editor-alice|PENDING|(null)|INVALID|12:00:00|4|40G|N/A";

pub struct Plane {
    pub engine: Arc<Engine>,
    pub exec: Arc<FakeExec>,
    pub tracker: ActivityTracker,
    pub exits: mpsc::Receiver<TunnelExit>,
    pub state_file: PathBuf,
    pub retention: Duration,
    _dir: tempfile::TempDir,
}

pub fn alice_editor() -> SessionKey {
    SessionKey::new("alice", "gemini", IdeKind::Editor)
}

/// The default resource request: 4 cpus, 40G, 12 hours.
pub fn alice_spec() -> LaunchSpec {
    LaunchSpec { resources: ResourceSpec::new(4, "40G", 12 * 3600), release: None }
}

/// The happy-path scheduler script.
pub fn happy_exec() -> FakeExec {
    FakeExec::new()
        .on("sbatch", "Submitted batch job 12345")
        .on("squeue --noheader --user alice", RUNNING_ROW)
        .on("squeue --noheader --jobs 12345", "12345")
        .on("cat", "8001")
        .on("scancel", "")
}

pub fn fast_config() -> EngineConfig {
    EngineConfig {
        allocation_attempts: 3,
        allocation_interval: Duration::from_millis(10),
        port_file_attempts: 3,
        port_file_interval: Duration::from_millis(10),
        read_retries: 1,
        read_retry_backoff: Duration::from_millis(10),
        stop_timeout: Duration::from_secs(2),
        idle_threshold: Duration::from_secs(30 * 60),
        reaper_interval: Duration::from_secs(60),
    }
}

/// Stand the control plane up around `exec`.
pub fn plane_with(exec: FakeExec, config: EngineConfig) -> Plane {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("sessions.json");
    let retention = Duration::from_secs(7 * 86_400);
    let store =
        Arc::new(StateStore::open(&state_file, retention, chrono::Utc::now()).unwrap());
    let exec = Arc::new(exec);

    let mut heads = HashMap::new();
    heads.insert("gemini".to_string(), "gemini-login.example.org".to_string());
    let mut tunnel_config = TunnelConfig::new(heads, dir.path().join("keys"));
    tunnel_config.probe_timeout = Duration::from_secs(2);
    tunnel_config.probe_interval = Duration::from_millis(25);

    let (exit_tx, exit_rx) = mpsc::channel(8);
    let (port_tx, port_rx) = std::sync::mpsc::channel::<u16>();
    let tunnels = Arc::new(TunnelManager::with_transport(
        tunnel_config,
        exit_tx,
        Box::new(move |spec| {
            let _ = port_tx.send(spec.local_port);
            let mut cmd = tokio::process::Command::new("sleep");
            cmd.arg("30");
            cmd
        }),
    ));
    spawn_port_loop(port_rx);

    let tracker = ActivityTracker::new();
    let proxies = Arc::new(ProxyRegistry::new(tracker.clone(), None));

    let mut clusters = HashMap::new();
    clusters.insert(
        "gemini".to_string(),
        ClusterSpec {
            head_node: "gemini-login.example.org".to_string(),
            image_root: "/images".to_string(),
            library_root: Some("/libs".to_string()),
            binds: vec!["/scratch".to_string()],
            default_release: "2026.1".to_string(),
        },
    );

    let engine = Engine::new(
        store,
        Interrogator::new(exec.clone()),
        tunnels,
        proxies,
        tracker.clone(),
        Arc::new(SystemClock),
        ClusterCatalog { clusters },
        config,
    );

    Plane { engine, exec, tracker, exits: exit_rx, state_file, retention, _dir: dir }
}

/// One loopback listener per started tunnel, standing in for the forward.
fn spawn_port_loop(port_rx: std::sync::mpsc::Receiver<u16>) {
    tokio::spawn(async move {
        let received =
            tokio::task::spawn_blocking(move || port_rx.recv().map(|p| (p, port_rx))).await;
        let Ok(Ok((port, rx))) = received else { return };
        tokio::spawn(async move {
            let Ok(listener) = tokio::net::TcpListener::bind(("127.0.0.1", port)).await else {
                return;
            };
            loop {
                let _ = listener.accept().await;
            }
        });
        spawn_port_loop(rx);
    });
}

/// Drain a launch stream to completion.
pub async fn collect_events(mut rx: mpsc::Receiver<LaunchEvent>) -> Vec<LaunchEvent> {
    let mut events = Vec::new();
    while let Some(event) =
        tokio::time::timeout(Duration::from_secs(10), rx.recv()).await.ok().flatten()
    {
        events.push(event);
    }
    events
}
