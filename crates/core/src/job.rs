// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler queue row snapshots.
//!
//! A [`JobRecord`] lives for one poll cycle and is never persisted; the
//! poller reconciles sessions against these and throws them away.

use crate::ide::IdeKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheduler-reported job state, collapsed to what the control plane acts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completing,
    /// Any other state string the scheduler reports (held, failing, ...).
    Other(String),
}

impl JobState {
    /// Parse a scheduler state column. Never fails; unknown states are kept
    /// verbatim under [`JobState::Other`].
    pub fn parse(s: &str) -> Self {
        match s {
            "PENDING" | "PD" => JobState::Pending,
            "RUNNING" | "R" => JobState::Running,
            "COMPLETING" | "CG" => JobState::Completing,
            other => JobState::Other(other.to_string()),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, JobState::Running)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, JobState::Pending)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => f.write_str("pending"),
            JobState::Running => f.write_str("running"),
            JobState::Completing => f.write_str("completing"),
            JobState::Other(s) => f.write_str(s),
        }
    }
}

/// One row of the scheduler's queue listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: u64,
    pub user: String,
    /// Job name; encodes the IDE as `<ide>-<user>`.
    pub name: String,
    pub state: JobState,
    /// Assigned node, or None while pending.
    pub node: Option<String>,
    /// Seconds of walltime remaining; None for INVALID/NOT_SET sentinels.
    pub time_left_secs: Option<u64>,
    pub time_limit_secs: Option<u64>,
    pub cpus: u32,
    /// Memory as the scheduler prints it, e.g. `40G`.
    pub memory: String,
    /// Scheduler's start-time estimate, verbatim; None when unknown.
    pub start_time: Option<String>,
}

impl JobRecord {
    /// Recover which IDE this job runs, from the job-name convention.
    pub fn ide(&self) -> Option<IdeKind> {
        IdeKind::parse_job_name(&self.name).map(|(kind, _)| kind)
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
