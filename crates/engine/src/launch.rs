// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The launch state machine.
//!
//! `submitting → awaiting-allocation → waiting-for-ide → establishing →
//! running`, with `pending-timeout` (terminal, non-error: the poller owns
//! the session from there) and `failed` branches. Progress streams to the
//! caller over an mpsc channel; the caller dropping its receiver cancels
//! the launch at the next emit and runs the teardown ladder exactly once.

use crate::engine::Engine;
use gw_cluster::{build_script, ClusterError, PortRead, ScriptSpec};
use gw_core::{
    new_token, AuthMode, EndReason, LaunchErrorKind, LaunchEvent, LaunchStep, ResourceSpec,
    Session, SessionEvent, SessionKey, SessionStatus,
};
use gw_storage::Reservation;
use gw_tunnel::TunnelId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// What the caller asked to launch.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub resources: ResourceSpec,
    /// Release tag; the cluster default when absent.
    pub release: Option<String>,
}

/// Why a launch left the happy path.
enum Abort {
    Conflict(Session),
    Disconnected { job_id: Option<u64> },
    PendingTimeout { job_id: u64 },
    Failed { kind: LaunchErrorKind, message: String, job_id: Option<u64> },
}

impl Engine {
    /// Start a launch; events arrive on the returned receiver, ending with
    /// exactly one of complete / pending-timeout / error.
    pub fn launch(
        self: Arc<Self>,
        user: &str,
        cluster: &str,
        ide: gw_core::IdeKind,
        spec: LaunchSpec,
    ) -> mpsc::Receiver<LaunchEvent> {
        let (tx, rx) = mpsc::channel(16);
        let key = SessionKey::new(user, cluster, ide);
        tokio::spawn(async move {
            self.run_launch(key, spec, tx).await;
        });
        rx
    }

    async fn run_launch(&self, key: SessionKey, spec: LaunchSpec, tx: mpsc::Sender<LaunchEvent>) {
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        match self.drive_launch(&key, spec, &tx).await {
            Ok(()) => {}
            Err(Abort::Conflict(existing)) => {
                let _ = tx
                    .send(LaunchEvent::Error {
                        kind: LaunchErrorKind::AlreadyActive,
                        message: format!("a {} session is already active on {}", key.ide, key.cluster),
                        correlation_id: gw_core::correlation_id(),
                        conflict: Some(existing.key.clone()),
                        job_id: existing.job_id,
                    })
                    .await;
            }
            Err(Abort::Disconnected { job_id }) => {
                warn!(session = %key, "launch caller disconnected; tearing down");
                self.teardown(&key, job_id, true, SessionStatus::Cancelled, EndReason::User).await;
            }
            Err(Abort::PendingTimeout { job_id }) => {
                // The session stays pending; the poller watches it and the UI
                // shows a pending card the user can come back to.
                let _ = tx.send(LaunchEvent::PendingTimeout { job_id }).await;
                self.wake_poller();
            }
            Err(Abort::Failed { kind, message, job_id }) => {
                let correlation_id = gw_core::correlation_id();
                warn!(session = %key, %kind, %correlation_id, "launch failed: {message}");
                self.teardown(&key, job_id, true, SessionStatus::Failed, EndReason::Failure).await;
                let _ = tx
                    .send(LaunchEvent::Error {
                        kind,
                        message,
                        correlation_id,
                        conflict: None,
                        job_id,
                    })
                    .await;
            }
        }
    }

    async fn drive_launch(
        &self,
        key: &SessionKey,
        spec: LaunchSpec,
        tx: &mpsc::Sender<LaunchEvent>,
    ) -> Result<(), Abort> {
        let cluster_spec = self.catalog.get(&key.cluster).cloned().ok_or_else(|| Abort::Failed {
            kind: LaunchErrorKind::Internal,
            message: format!("unknown cluster {}", key.cluster),
            job_id: None,
        })?;
        let release =
            spec.release.clone().unwrap_or_else(|| cluster_spec.default_release.clone());
        let token = match key.ide.auth_mode() {
            AuthMode::None => None,
            AuthMode::CookieToken | AuthMode::QueryToken => Some(new_token()),
        };

        // Atomically: one pending-or-running session per key.
        let mut session = Session::new(key.clone(), &release, spec.resources.clone(), self.clock.now_utc());
        session.token = token.clone();
        match self.store.reserve(session) {
            Ok(Reservation::Created) => {}
            Ok(Reservation::Conflict(existing)) => return Err(Abort::Conflict(existing)),
            Err(e) => {
                return Err(Abort::Failed {
                    kind: LaunchErrorKind::Internal,
                    message: format!("state store: {e}"),
                    job_id: None,
                })
            }
        }

        if !emit(tx, LaunchEvent::progress(10, LaunchStep::Submitting, "composing job script")).await
        {
            return Err(Abort::Disconnected { job_id: None });
        }

        // Submitting.
        let script = build_script(&ScriptSpec {
            ide: key.ide,
            cpus: spec.resources.cpus,
            image: cluster_spec.image_for(key.ide, &release),
            library_tree: cluster_spec.library_for(&release),
            binds: cluster_spec.binds.clone(),
            token: token.clone(),
            gpu: spec.resources.gpu.is_some(),
        })
        .map_err(|e| Abort::Failed {
            kind: LaunchErrorKind::Internal,
            message: format!("script assembly: {e}"),
            job_id: None,
        })?;

        // Submission is never retried: an ambiguous result could mean a job
        // we cannot see, and a duplicate would break key exclusivity on
        // the cluster.
        let job_id = match self
            .interrogator
            .submit(&key.cluster, &key.user, key.ide, &spec.resources, &script)
            .await
        {
            Ok(id) => id,
            Err(ClusterError::SubmitUnparseable { stdout }) => {
                return Err(Abort::Failed {
                    kind: LaunchErrorKind::SubmitUnparseable,
                    message: format!("scheduler accepted the job but printed no id: {stdout:?}"),
                    job_id: None,
                })
            }
            Err(e) => {
                return Err(Abort::Failed {
                    kind: LaunchErrorKind::Remote,
                    message: format!("job submission failed: {e}"),
                    job_id: None,
                })
            }
        };

        let now = self.clock.now_utc();
        let _ = self.store.update(key, |s| s.mark_submitted(job_id, now));
        self.broadcast(SessionEvent {
            key: key.clone(),
            status: SessionStatus::Pending,
            job_id: Some(job_id),
            node: None,
            time_left_secs: None,
        });
        if !emit(tx, LaunchEvent::progress(30, LaunchStep::Submitting, format!("job {job_id} submitted")))
            .await
        {
            return Err(Abort::Disconnected { job_id: Some(job_id) });
        }

        // Awaiting allocation.
        let attempts = self.config.allocation_attempts.max(1);
        let mut allocated = None;
        for attempt in 0..attempts {
            let record = self
                .read_with_retry(|| self.interrogator.get_job(&key.cluster, &key.user, key.ide))
                .await
                .map_err(|e| Abort::Failed {
                    kind: LaunchErrorKind::Remote,
                    message: format!("scheduler unreachable: {e}"),
                    job_id: Some(job_id),
                })?;
            if let Some(record) = record {
                if record.state.is_running() && record.node.is_some() {
                    allocated = Some(record);
                    break;
                }
            }
            let pct = 45 + (attempt * 20 / attempts) as u8;
            let message = "waiting for the scheduler to allocate a node";
            if !emit(tx, LaunchEvent::progress(pct, LaunchStep::AwaitingAllocation, message)).await {
                return Err(Abort::Disconnected { job_id: Some(job_id) });
            }
            tokio::time::sleep(self.config.allocation_interval).await;
        }
        let record = allocated.ok_or(Abort::PendingTimeout { job_id })?;
        let node = record.node.clone().unwrap_or_default();

        // Waiting for the IDE to pick its port. The job's setup script
        // writes the file before exec'ing the IDE binary, so a missing file
        // just means "not yet".
        if !emit(tx, LaunchEvent::progress(75, LaunchStep::WaitingForIde, format!("allocated {node}")))
            .await
        {
            return Err(Abort::Disconnected { job_id: Some(job_id) });
        }
        let mut ide_port = None;
        for _ in 0..self.config.port_file_attempts {
            match self
                .read_with_retry(|| self.interrogator.read_ide_port(&key.cluster, &key.user, key.ide))
                .await
            {
                Ok(PortRead::Port(port)) => {
                    ide_port = Some(port);
                    break;
                }
                Ok(PortRead::Missing) => {
                    tokio::time::sleep(self.config.port_file_interval).await;
                }
                Ok(PortRead::Unreadable) => break,
                Err(e) => {
                    warn!(session = %key, "port file read failed: {e}");
                    break;
                }
            }
        }
        let ide_port = ide_port.unwrap_or_else(|| key.ide.default_port());

        // Establishing: tunnel, then proxy route.
        if !emit(tx, LaunchEvent::progress(90, LaunchStep::Establishing, format!("tunneling to {node}:{ide_port}")))
            .await
        {
            return Err(Abort::Disconnected { job_id: Some(job_id) });
        }
        let local_port = self
            .tunnels
            .start(TunnelId::from(key), &key.cluster, &key.user, &node, ide_port)
            .await
            .map_err(|e| Abort::Failed {
                kind: LaunchErrorKind::Tunnel,
                message: format!("could not reach the IDE: {e}"),
                job_id: Some(job_id),
            })?;
        self.proxies.ensure(key, local_port, token.as_deref()).map_err(|e| Abort::Failed {
            kind: LaunchErrorKind::Proxy,
            message: format!("could not register the proxy route: {e}"),
            job_id: Some(job_id),
        })?;
        if !emit(tx, LaunchEvent::progress(99, LaunchStep::Establishing, "registering proxy route"))
            .await
        {
            return Err(Abort::Disconnected { job_id: Some(job_id) });
        }

        // Running.
        let now = self.clock.now_utc();
        let _ = self.store.update(key, |s| s.mark_running(&node, ide_port, local_port, now));
        self.broadcast(SessionEvent {
            key: key.clone(),
            status: SessionStatus::Running,
            job_id: Some(job_id),
            node: Some(node.clone()),
            time_left_secs: record.time_left_secs,
        });
        self.wake_poller();
        info!(session = %key, job_id, %node, ide_port, local_port, "session running");

        // The session is up regardless of whether the caller is still
        // listening; a disconnect this late must not tear it down.
        let redirect_url = format!("{}/", key.ide.route_prefix());
        let _ = tx.send(LaunchEvent::Complete { redirect_url, job_id }).await;
        Ok(())
    }
}

/// Send one event; false means the caller hung up.
async fn emit(tx: &mpsc::Sender<LaunchEvent>, event: LaunchEvent) -> bool {
    tx.send(event).await.is_ok()
}

#[cfg(test)]
#[path = "launch_tests.rs"]
mod tests;
