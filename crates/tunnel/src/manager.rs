// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tunnel lifecycle: allocate, spawn, probe, watch, kill.

use gw_core::SessionKey;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Ring buffer depth for transport stderr lines.
const STDERR_RING: usize = 64;

/// Key for one tunnel: either a session or a raw port passthrough.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TunnelId(String);

impl TunnelId {
    pub fn for_port(user: &str, cluster: &str, port: u16) -> Self {
        Self(format!("{user}/{cluster}/port-{port}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&SessionKey> for TunnelId {
    fn from(key: &SessionKey) -> Self {
        Self(key.to_string())
    }
}

impl fmt::Display for TunnelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors from tunnel establishment.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("unknown cluster: {0}")]
    UnknownCluster(String),
    #[error("a tunnel is already open for {0}")]
    AlreadyOpen(TunnelId),
    #[error("failed to allocate a loopback port: {0}")]
    Allocate(#[source] std::io::Error),
    #[error("failed to spawn transport: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("local port {port} never became ready within {timeout:?}")]
    ProbeTimeout { port: u16, timeout: Duration },
}

/// Unexpected transport exit, published to the engine.
#[derive(Debug)]
pub struct TunnelExit {
    pub id: TunnelId,
    pub code: Option<i32>,
    /// Last stderr lines for the log.
    pub stderr_tail: Vec<String>,
}

/// What a transport subprocess must connect. Handed to the transport
/// factory; tests substitute a stub command.
#[derive(Debug, Clone)]
pub struct TransportSpec {
    pub user: String,
    pub head: String,
    pub node: String,
    pub remote_port: u16,
    pub local_port: u16,
    pub key: PathBuf,
}

type TransportFactory = Box<dyn Fn(&TransportSpec) -> Command + Send + Sync>;

/// Configuration for the manager.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Cluster name → head node DNS name.
    pub head_nodes: HashMap<String, String>,
    /// Directory holding one private key per user.
    pub key_dir: PathBuf,
    pub probe_timeout: Duration,
    pub probe_interval: Duration,
}

impl TunnelConfig {
    pub fn new(head_nodes: HashMap<String, String>, key_dir: impl Into<PathBuf>) -> Self {
        Self {
            head_nodes,
            key_dir: key_dir.into(),
            probe_timeout: Duration::from_secs(30),
            probe_interval: Duration::from_millis(500),
        }
    }
}

struct TunnelHandle {
    node: String,
    remote_port: u16,
    local_port: u16,
    user: String,
    started_at: Instant,
    kill_tx: Option<oneshot::Sender<()>>,
    stderr: Arc<Mutex<VecDeque<String>>>,
}

/// Owns every live tunnel. All map access is brief; the 30 s probe runs
/// against local state only and never holds the lock.
pub struct TunnelManager {
    config: TunnelConfig,
    transport: TransportFactory,
    tunnels: Arc<Mutex<HashMap<TunnelId, TunnelHandle>>>,
    exit_tx: mpsc::Sender<TunnelExit>,
}

impl TunnelManager {
    pub fn new(config: TunnelConfig, exit_tx: mpsc::Sender<TunnelExit>) -> Self {
        Self::with_transport(config, exit_tx, Box::new(ssh_transport))
    }

    /// Swap the transport subprocess; tests use stub commands.
    pub fn with_transport(
        config: TunnelConfig,
        exit_tx: mpsc::Sender<TunnelExit>,
        transport: TransportFactory,
    ) -> Self {
        Self { config, transport, tunnels: Arc::new(Mutex::new(HashMap::new())), exit_tx }
    }

    /// Open a tunnel and wait until its local port accepts connections.
    /// Returns the allocated loopback port.
    pub async fn start(
        &self,
        id: TunnelId,
        cluster: &str,
        user: &str,
        node: &str,
        remote_port: u16,
    ) -> Result<u16, TunnelError> {
        if self.tunnels.lock().contains_key(&id) {
            return Err(TunnelError::AlreadyOpen(id));
        }
        let head = self
            .config
            .head_nodes
            .get(cluster)
            .ok_or_else(|| TunnelError::UnknownCluster(cluster.to_string()))?
            .clone();

        let local_port = alloc_loopback_port().map_err(TunnelError::Allocate)?;
        let spec = TransportSpec {
            user: user.to_string(),
            head,
            node: node.to_string(),
            remote_port,
            local_port,
            key: self.config.key_dir.join(user),
        };

        let mut command = (self.transport)(&spec);
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(TunnelError::Spawn)?;

        let stderr = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_RING)));
        if let Some(pipe) = child.stderr.take() {
            let buf = Arc::clone(&stderr);
            let tag = id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(pipe).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(tunnel = %tag, "transport: {line}");
                    let mut buf = buf.lock();
                    if buf.len() == STDERR_RING {
                        buf.pop_front();
                    }
                    buf.push_back(line);
                }
            });
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        spawn_watcher(
            id.clone(),
            child,
            kill_rx,
            Arc::clone(&self.tunnels),
            Arc::clone(&stderr),
            self.exit_tx.clone(),
        );

        // Probe outside the lock: nothing else can race this id because the
        // orchestrator serialises per key, and a duplicate start would have
        // bailed above.
        if !probe_port(local_port, self.config.probe_timeout, self.config.probe_interval).await {
            warn!(tunnel = %id, local_port, "tunnel probe failed; killing transport");
            let _ = kill_tx.send(());
            return Err(TunnelError::ProbeTimeout {
                port: local_port,
                timeout: self.config.probe_timeout,
            });
        }

        let handle = TunnelHandle {
            node: node.to_string(),
            remote_port,
            local_port,
            user: user.to_string(),
            started_at: Instant::now(),
            kill_tx: Some(kill_tx),
            stderr,
        };
        self.tunnels.lock().insert(id.clone(), handle);
        info!(tunnel = %id, node, remote_port, local_port, "tunnel up");
        Ok(local_port)
    }

    /// Tear a tunnel down. Idempotent; returns whether one existed.
    pub fn stop(&self, id: &TunnelId) -> bool {
        let handle = self.tunnels.lock().remove(id);
        match handle {
            Some(mut handle) => {
                if let Some(kill) = handle.kill_tx.take() {
                    let _ = kill.send(());
                }
                info!(tunnel = %id, "tunnel stopped");
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &TunnelId) -> bool {
        self.tunnels.lock().contains_key(id)
    }

    pub fn local_port(&self, id: &TunnelId) -> Option<u16> {
        self.tunnels.lock().get(id).map(|h| h.local_port)
    }

    pub fn active_count(&self) -> usize {
        self.tunnels.lock().len()
    }

    /// Diagnostics: last transport stderr lines for a live tunnel.
    pub fn stderr_tail(&self, id: &TunnelId) -> Vec<String> {
        self.tunnels
            .lock()
            .get(id)
            .map(|h| h.stderr.lock().iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Uptime of a live tunnel, with its endpoints, for status surfaces.
    pub fn describe(&self, id: &TunnelId) -> Option<(String, u16, u16, String, Duration)> {
        self.tunnels.lock().get(id).map(|h| {
            (h.node.clone(), h.remote_port, h.local_port, h.user.clone(), h.started_at.elapsed())
        })
    }
}

/// Wait for the transport to exit or to be told to die. Deliberate kills are
/// silent; anything else is published as a [`TunnelExit`].
fn spawn_watcher(
    id: TunnelId,
    mut child: tokio::process::Child,
    kill_rx: oneshot::Receiver<()>,
    tunnels: Arc<Mutex<HashMap<TunnelId, TunnelHandle>>>,
    stderr: Arc<Mutex<VecDeque<String>>>,
    exit_tx: mpsc::Sender<TunnelExit>,
) {
    tokio::spawn(async move {
        tokio::select! {
            status = child.wait() => {
                let code = status.ok().and_then(|s| s.code());
                let was_tracked = tunnels.lock().remove(&id).is_some();
                let stderr_tail: Vec<String> = stderr.lock().iter().cloned().collect();
                warn!(tunnel = %id, ?code, tracked = was_tracked, "transport exited");
                let _ = exit_tx.send(TunnelExit { id, code, stderr_tail }).await;
            }
            _ = kill_rx => {
                let _ = child.kill().await;
                let _ = child.wait().await;
            }
        }
    });
}

/// Bind-to-zero, read the port back, release. Racy by nature, but the very
/// next step is a long-lived process binding exactly this port.
fn alloc_loopback_port() -> std::io::Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

/// Short TCP connects against the local port until one succeeds or the
/// budget runs out.
async fn probe_port(port: u16, timeout: Duration, interval: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        match tokio::time::timeout(interval, TcpStream::connect(("127.0.0.1", port))).await {
            Ok(Ok(_)) => return true,
            _ => {
                if Instant::now() >= deadline {
                    return false;
                }
                tokio::time::sleep(interval).await;
            }
        }
    }
}

/// Production transport: an `ssh -N -L` subprocess with keepalives and
/// exit-on-forward-failure. Host keys are accepted on first enrollment only.
fn ssh_transport(spec: &TransportSpec) -> Command {
    let mut cmd = Command::new("ssh");
    cmd.arg("-N")
        .arg("-L")
        .arg(format!(
            "127.0.0.1:{}:{}:{}",
            spec.local_port, spec.node, spec.remote_port
        ))
        .args(["-o", "BatchMode=yes"])
        .args(["-o", "ServerAliveInterval=15"])
        .args(["-o", "ServerAliveCountMax=3"])
        .args(["-o", "ExitOnForwardFailure=yes"])
        .args(["-o", "StrictHostKeyChecking=accept-new"])
        .arg("-i")
        .arg(&spec.key)
        .arg(format!("{}@{}", spec.user, spec.head));
    cmd
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
