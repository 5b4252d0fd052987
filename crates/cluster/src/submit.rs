// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job submission and cancellation.

use crate::query::Interrogator;
use crate::ClusterError;
use gw_core::{IdeKind, ResourceSpec};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{info, warn};

// The pattern is a literal; construction cannot fail.
#[allow(clippy::unwrap_used)]
fn job_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"Submitted batch job (\d+)").unwrap())
}

/// Scan submit stdout for the scheduler's job id line.
pub fn parse_job_id(stdout: &str) -> Option<u64> {
    job_id_pattern()
        .captures(stdout)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

impl Interrogator {
    /// Submit `script` as a batch job. The ambiguous-failure rule lives with
    /// the caller: a successful CLI run whose stdout has no id yields
    /// [`ClusterError::SubmitUnparseable`] and must never be retried.
    pub async fn submit(
        &self,
        cluster: &str,
        user: &str,
        ide: IdeKind,
        resources: &ResourceSpec,
        script: &str,
    ) -> Result<u64, ClusterError> {
        let mut command = format!(
            "sbatch --job-name={name} --cpus-per-task={cpus} --mem={mem} --time={time} --output=/dev/null",
            name = ide.job_name(user),
            cpus = resources.cpus,
            mem = resources.memory,
            time = resources.walltime(),
        );
        if let Some(gpu) = &resources.gpu {
            command.push_str(&format!(" --gres=gpu:{gpu}:1"));
        }
        command.push_str(&format!(" --wrap='{script}'"));

        let stdout = self.exec().run(cluster, user, &command).await?;
        match parse_job_id(&stdout) {
            Some(id) => {
                info!(cluster, user, ide = %ide, job_id = id, "job submitted");
                Ok(id)
            }
            None => Err(ClusterError::SubmitUnparseable { stdout }),
        }
    }

    /// Cancel by id. Best-effort by design: callers log and carry on.
    pub async fn cancel(&self, cluster: &str, user: &str, job_id: u64) -> Result<(), ClusterError> {
        let command = format!("scancel {job_id}");
        match self.exec().run(cluster, user, &command).await {
            Ok(_) => {
                info!(cluster, user, job_id, "job cancelled");
                Ok(())
            }
            Err(e) => {
                warn!(cluster, user, job_id, "scancel failed: {e}");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
#[path = "submit_tests.rs"]
mod tests;
