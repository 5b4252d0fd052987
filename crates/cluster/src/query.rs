// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue interrogation: one CLI call per (user, cluster), parsed positionally.

use crate::ClusterError;
use gw_core::{time_fmt, IdeKind, JobRecord, JobState};
use gw_remote::{RemoteError, RemoteExec};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Queue column layout: JobID, Name, State, NodeList, TimeLeft, TimeLimit,
/// NumCPUs, MinMemory, StartTime. Pipe-separated so node lists with commas
/// stay one column.
const QUEUE_FORMAT: &str = "%i|%j|%T|%N|%L|%l|%C|%m|%S";

/// Result of one queue listing for a user.
#[derive(Debug, Default)]
pub struct QueueView {
    /// The IDE jobs found, at most one per kind.
    pub jobs: HashMap<IdeKind, JobRecord>,
    /// Rows the parser refused; surfaced so a tick can report queue noise.
    pub dropped_rows: usize,
}

/// Composes scheduler CLI reads and parses their output.
pub struct Interrogator {
    exec: Arc<dyn RemoteExec>,
}

impl Interrogator {
    pub fn new(exec: Arc<dyn RemoteExec>) -> Self {
        Self { exec }
    }

    pub(crate) fn exec(&self) -> &Arc<dyn RemoteExec> {
        &self.exec
    }

    /// All IDE jobs on `cluster` for `user`, in one scheduler call.
    pub async fn get_all_jobs(&self, cluster: &str, user: &str) -> Result<QueueView, ClusterError> {
        let names: Vec<String> = IdeKind::ALL.iter().map(|ide| ide.job_name(user)).collect();
        // Single quotes keep the pipes in the format string away from the
        // head node's shell.
        let command = format!(
            "squeue --noheader --user {user} --name {} --format='{QUEUE_FORMAT}'",
            names.join(",")
        );
        let stdout = self.exec.run(cluster, user, &command).await?;
        Ok(parse_queue(&stdout, user))
    }

    /// Single-IDE refresh.
    pub async fn get_job(
        &self,
        cluster: &str,
        user: &str,
        ide: IdeKind,
    ) -> Result<Option<JobRecord>, ClusterError> {
        let command = format!(
            "squeue --noheader --user {user} --name {} --format='{QUEUE_FORMAT}'",
            ide.job_name(user)
        );
        let stdout = self.exec.run(cluster, user, &command).await?;
        Ok(parse_queue(&stdout, user).jobs.remove(&ide))
    }

    /// Single-row existence check, for the idle reaper and teardown.
    ///
    /// The scheduler exits non-zero for an unknown id; that is a clean
    /// "no such job", not a failure.
    pub async fn job_exists(
        &self,
        cluster: &str,
        user: &str,
        job_id: u64,
    ) -> Result<bool, ClusterError> {
        let command = format!("squeue --noheader --jobs {job_id} --format=%i");
        match self.exec.run(cluster, user, &command).await {
            Ok(stdout) => Ok(stdout.lines().any(|l| l.trim() == job_id.to_string())),
            Err(RemoteError::NonZero { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl QueueView {
    fn insert(&mut self, record: JobRecord) {
        match record.ide() {
            Some(ide) => {
                self.jobs.insert(ide, record);
            }
            None => self.dropped_rows += 1,
        }
    }
}

/// Parse a queue listing. Malformed rows are dropped with a warning; the
/// caller learns how many through [`QueueView::dropped_rows`].
pub(crate) fn parse_queue(stdout: &str, user: &str) -> QueueView {
    let mut view = QueueView::default();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_row(line, user) {
            Some(record) => view.insert(record),
            None => {
                warn!(row = line, "dropping malformed queue row");
                view.dropped_rows += 1;
            }
        }
    }
    debug!(jobs = view.jobs.len(), dropped = view.dropped_rows, "queue parsed");
    view
}

/// Strictly positional row parse. Sentinels (`(null)`, `N/A`, `INVALID`)
/// become None in their field; anything that breaks the column contract
/// rejects the whole row.
fn parse_row(line: &str, user: &str) -> Option<JobRecord> {
    let cols: Vec<&str> = line.split('|').map(str::trim).collect();
    let [id, name, state, nodes, time_left, time_limit, cpus, memory, start_time] =
        cols.as_slice()
    else {
        return None;
    };

    Some(JobRecord {
        id: id.parse().ok()?,
        user: user.to_string(),
        name: (*name).to_string(),
        state: JobState::parse(state),
        node: optional_col(nodes).map(str::to_string),
        time_left_secs: time_fmt::parse_duration(time_left),
        time_limit_secs: time_fmt::parse_duration(time_limit),
        cpus: cpus.parse().ok()?,
        memory: (*memory).to_string(),
        start_time: optional_col(start_time).map(str::to_string),
    })
}

fn optional_col(col: &str) -> Option<&str> {
    match col {
        "" | "(null)" | "N/A" | "INVALID" => None,
        v => Some(v),
    }
}

/// Outcome of reading the port file a job script writes under the user's
/// home (visible from the head node via the shared filesystem).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortRead {
    /// File present and holds a sane port.
    Port(u16),
    /// File not written yet; worth retrying.
    Missing,
    /// File present but unreadable or nonsensical. Retrying won't help;
    /// fall back to the IDE default.
    Unreadable,
}

impl Interrogator {
    /// Read the port the IDE bound on its node.
    pub async fn read_ide_port(
        &self,
        cluster: &str,
        user: &str,
        ide: IdeKind,
    ) -> Result<PortRead, ClusterError> {
        let path = format!("$HOME/.gangway/port-{}", ide);
        let command = format!("cat {path}");
        match self.exec.run(cluster, user, &command).await {
            Ok(stdout) => match stdout.trim().parse::<u16>() {
                Ok(port) if port > 0 => Ok(PortRead::Port(port)),
                _ => Ok(PortRead::Unreadable),
            },
            Err(RemoteError::NonZero { stderr, .. })
                if stderr.contains("No such file") =>
            {
                Ok(PortRead::Missing)
            }
            Err(RemoteError::NonZero { .. }) => Ok(PortRead::Unreadable),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
