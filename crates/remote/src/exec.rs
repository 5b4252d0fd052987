// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSH command execution with timeouts and bounded concurrency.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Errors from remote shell execution.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("unknown cluster: {0}")]
    UnknownCluster(String),
    #[error("failed to spawn ssh: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("remote command timed out after {0:?}")]
    Timeout(Duration),
    #[error("remote command exited {code}: {stderr}")]
    NonZero { code: i32, stderr: String },
    #[error("remote output was not utf-8")]
    Utf8,
}

impl RemoteError {
    /// Timeouts and transport-level failures are worth retrying; a clean
    /// non-zero exit from the remote side usually is too (capacity, transient
    /// scheduler errors). Unknown clusters and bad output are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::Timeout(_) | RemoteError::Spawn(_) | RemoteError::NonZero { .. }
        )
    }
}

/// Executes shell commands on a cluster head node as a given user.
#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// Run `command` on `cluster`'s head node as `user`; returns trimmed
    /// stdout.
    async fn run(&self, cluster: &str, user: &str, command: &str) -> Result<String, RemoteError>;
}

/// Configuration for [`SshExec`].
#[derive(Debug, Clone)]
pub struct SshExecConfig {
    /// Cluster name → head node DNS name.
    pub head_nodes: HashMap<String, String>,
    /// Directory holding one private key per user, named after the user.
    pub key_dir: PathBuf,
    /// Wall cap per command.
    pub timeout: Duration,
    /// Max simultaneous outbound sessions per cluster.
    pub max_sessions: usize,
}

impl SshExecConfig {
    pub fn new(head_nodes: HashMap<String, String>, key_dir: impl Into<PathBuf>) -> Self {
        Self {
            head_nodes,
            key_dir: key_dir.into(),
            timeout: Duration::from_secs(30),
            max_sessions: 8,
        }
    }
}

/// Production executor: one `ssh` subprocess per command.
pub struct SshExec {
    config: SshExecConfig,
    /// Per-cluster limiter; tokio semaphores queue waiters FIFO.
    limiters: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl SshExec {
    pub fn new(config: SshExecConfig) -> Self {
        Self { config, limiters: Mutex::new(HashMap::new()) }
    }

    fn limiter(&self, cluster: &str) -> Arc<Semaphore> {
        let mut limiters = self.limiters.lock();
        Arc::clone(
            limiters
                .entry(cluster.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.config.max_sessions))),
        )
    }

    /// Argument vector for one invocation; split out for testability.
    fn ssh_args(&self, head: &str, user: &str, command: &str) -> Vec<String> {
        let key = self.config.key_dir.join(user);
        vec![
            "-o".into(),
            "BatchMode=yes".into(),
            "-o".into(),
            "ConnectTimeout=10".into(),
            "-o".into(),
            "StrictHostKeyChecking=accept-new".into(),
            "-i".into(),
            key.to_string_lossy().into_owned(),
            format!("{user}@{head}"),
            command.into(),
        ]
    }
}

#[async_trait]
impl RemoteExec for SshExec {
    async fn run(&self, cluster: &str, user: &str, command: &str) -> Result<String, RemoteError> {
        let head = self
            .config
            .head_nodes
            .get(cluster)
            .ok_or_else(|| RemoteError::UnknownCluster(cluster.to_string()))?
            .clone();

        let limiter = self.limiter(cluster);
        // Closed-semaphore errors cannot happen: we never close these.
        let _permit = limiter.acquire().await.map_err(|_| RemoteError::Timeout(Duration::ZERO))?;

        debug!(cluster, user, command, "remote exec");
        let child = Command::new("ssh")
            .args(self.ssh_args(&head, user, command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(RemoteError::Spawn)?;

        // kill_on_drop reaps the child when the timeout drops the future.
        let output = match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await
        {
            Ok(io) => io.map_err(RemoteError::Spawn)?,
            Err(_) => {
                warn!(cluster, user, "remote command timed out");
                return Err(RemoteError::Timeout(self.config.timeout));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(RemoteError::NonZero {
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }
        let stdout = String::from_utf8(output.stdout).map_err(|_| RemoteError::Utf8)?;
        Ok(stdout.trim().to_string())
    }
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
