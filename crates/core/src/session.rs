// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session identity and lifecycle.
//!
//! A session is one interactive IDE job for one user on one cluster. The
//! triple `(user, cluster, ide)` is its identity; at most one session per
//! key may be pending or running at a time. Terminal records are retained
//! for audit until they age out of the store's retention window.

use crate::ide::IdeKind;
use crate::resources::ResourceSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a session: `(user, cluster, ide)`.
///
/// Displays as `user/cluster/ide`, which is also the ordering used by the
/// state store.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SessionKey {
    pub user: String,
    pub cluster: String,
    pub ide: IdeKind,
}

impl SessionKey {
    pub fn new(user: impl Into<String>, cluster: impl Into<String>, ide: IdeKind) -> Self {
        Self { user: user.into(), cluster: cluster.into(), ide }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.user, self.cluster, self.ide)
    }
}

/// Error for a malformed session key string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed session key: {0}")]
pub struct BadSessionKey(pub String);

impl FromStr for SessionKey {
    type Err = BadSessionKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '/');
        let (user, cluster, ide) = match (parts.next(), parts.next(), parts.next()) {
            (Some(u), Some(c), Some(i)) if !u.is_empty() && !c.is_empty() => (u, c, i),
            _ => return Err(BadSessionKey(s.to_string())),
        };
        let ide = IdeKind::from_str(ide).map_err(|_| BadSessionKey(s.to_string()))?;
        Ok(SessionKey::new(user, cluster, ide))
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Submitted; waiting for the scheduler to allocate a node.
    Pending,
    /// Allocated, tunneled, and proxied.
    Running,
    /// Job left the queue cleanly.
    Completed,
    /// Unrecoverable tunnel/proxy loss or launch failure.
    Failed,
    /// Stopped by the user or the idle reaper.
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }

    /// Pending or running: counts against the one-session-per-key rule.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        })
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Explicit stop from the user.
    User,
    /// Reaped after the idle threshold.
    Idle,
    /// Allocation ran out of walltime.
    Expired,
    /// Job vanished from the queue while the session was live.
    SchedulerLost,
    /// Launch or tunnel failure.
    Failure,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EndReason::User => "user",
            EndReason::Idle => "idle",
            EndReason::Expired => "expired",
            EndReason::SchedulerLost => "scheduler_lost",
            EndReason::Failure => "failure",
        })
    }
}

/// One IDE session record. Owned exclusively by the state store; every other
/// component looks sessions up by key and never caches them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub key: SessionKey,
    pub status: SessionStatus,
    /// Scheduler job id, once the submit stdout has been parsed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<u64>,
    /// Compute node hostname, once allocated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    /// Port the IDE bound on the compute node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ide_port: Option<u16>,
    /// Loopback port on the control-plane host the tunnel delivers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_port: Option<u16>,
    /// Per-session auth token, for IDEs whose binary accepts one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Software release tag selecting the container image.
    pub release: String,
    pub resources: ResourceSpec,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<EndReason>,
    /// Stamped by proxy traffic; the idle reaper compares against it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a fresh pending session.
    pub fn new(key: SessionKey, release: impl Into<String>, resources: ResourceSpec, now: DateTime<Utc>) -> Self {
        Self {
            key,
            status: SessionStatus::Pending,
            job_id: None,
            node: None,
            ide_port: None,
            local_port: None,
            token: None,
            release: release.into(),
            resources,
            created_at: now,
            updated_at: now,
            started_at: None,
            ended_at: None,
            end_reason: None,
            last_activity: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Record the scheduler job id after a successful submit.
    pub fn mark_submitted(&mut self, job_id: u64, now: DateTime<Utc>) {
        self.job_id = Some(job_id);
        self.updated_at = now;
    }

    /// Flip to running once allocation, port discovery and the tunnel have
    /// all succeeded. Also seeds `last_activity` so the idle clock starts at
    /// launch, never before it.
    pub fn mark_running(
        &mut self,
        node: impl Into<String>,
        ide_port: u16,
        local_port: u16,
        now: DateTime<Utc>,
    ) {
        self.status = SessionStatus::Running;
        self.node = Some(node.into());
        self.ide_port = Some(ide_port);
        self.local_port = Some(local_port);
        self.started_at = Some(now);
        self.last_activity = Some(now);
        self.updated_at = now;
    }

    /// Move to a terminal status. `ended_at` is set exactly here, keeping it
    /// in lock-step with terminal statuses.
    pub fn finish(&mut self, status: SessionStatus, reason: EndReason, now: DateTime<Utc>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.end_reason = Some(reason);
        self.ended_at = Some(now);
        self.updated_at = now;
    }

    pub fn touch_activity(&mut self, now: DateTime<Utc>) {
        self.last_activity = Some(now);
    }

    /// True when the record carries everything a running session must have:
    /// node, IDE port and local proxy port. The tunnel and proxy halves of
    /// that invariant live with their owners.
    pub fn running_record_complete(&self) -> bool {
        self.status != SessionStatus::Running
            || (self.node.is_some() && self.ide_port.is_some() && self.local_port.is_some())
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
