// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed events the orchestrator and poller emit.
//!
//! [`LaunchEvent`] is the launch stream payload: a finite, ordered sequence
//! terminated by exactly one of `complete`, `pending-timeout` or `error`.
//! The front door serialises these verbatim onto the SSE wire, so the serde
//! shape here *is* the public wire shape.
//!
//! [`SessionEvent`] is the internal broadcast for UI poll responders: one per
//! session the poller or orchestrator mutated.

use crate::session::{SessionKey, SessionStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which launch step a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LaunchStep {
    Submitting,
    AwaitingAllocation,
    WaitingForIde,
    Establishing,
    Running,
}

impl fmt::Display for LaunchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LaunchStep::Submitting => "submitting",
            LaunchStep::AwaitingAllocation => "awaiting-allocation",
            LaunchStep::WaitingForIde => "waiting-for-ide",
            LaunchStep::Establishing => "establishing",
            LaunchStep::Running => "running",
        })
    }
}

/// Error kinds surfaced on the launch stream. Messages attached to these are
/// safe to show an end user; server-side detail is logged under the
/// correlation id the event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LaunchErrorKind {
    /// A pending or running session already holds this key.
    AlreadyActive,
    /// Submit stdout had no recognisable job id; never retried.
    SubmitUnparseable,
    /// Remote shell failed past the retry budget.
    Remote,
    /// Scheduler rejected or lost the job during launch.
    Allocation,
    /// Local tunnel port never became ready.
    Tunnel,
    /// Proxy registration failed.
    Proxy,
    Internal,
}

impl fmt::Display for LaunchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LaunchErrorKind::AlreadyActive => "already-active",
            LaunchErrorKind::SubmitUnparseable => "submit-unparseable",
            LaunchErrorKind::Remote => "remote",
            LaunchErrorKind::Allocation => "allocation",
            LaunchErrorKind::Tunnel => "tunnel",
            LaunchErrorKind::Proxy => "proxy",
            LaunchErrorKind::Internal => "internal",
        })
    }
}

/// One message on a launch or stop stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum LaunchEvent {
    /// Step progress, 0-100.
    Progress { progress: u8, step: LaunchStep, message: String },
    /// Allocation wait hit its bound; the session stays pending and the
    /// background poller owns it from here.
    PendingTimeout { job_id: u64 },
    /// Terminal success; the browser should navigate to `redirect_url`.
    Complete { redirect_url: String, job_id: u64 },
    /// Terminal failure.
    Error {
        kind: LaunchErrorKind,
        message: String,
        correlation_id: String,
        /// Key of the conflicting session on `already-active`, so the UI can
        /// offer a connect affordance.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conflict: Option<SessionKey>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id: Option<u64>,
    },
}

impl LaunchEvent {
    pub fn progress(progress: u8, step: LaunchStep, message: impl Into<String>) -> Self {
        LaunchEvent::Progress { progress, step, message: message.into() }
    }

    /// Terminal events end the stream; exactly one is emitted per launch.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LaunchEvent::Progress { .. })
    }
}

/// Broadcast payload for a mutated session, consumed by UI poll responders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionEvent {
    pub key: SessionKey,
    pub status: SessionStatus,
    pub job_id: Option<u64>,
    pub node: Option<String>,
    pub time_left_secs: Option<u64>,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
