// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gw-cluster: the batch scheduler surface.
//!
//! Three concerns, all expressed through the scheduler's CLI over
//! [`gw_remote::RemoteExec`]:
//!
//! - **Interrogation**: compose a queue listing, parse its columnar output
//!   back into typed [`gw_core::JobRecord`]s.
//! - **Submission**: build an `sbatch` invocation around a job script, scan
//!   its stdout for the job id, cancel by id.
//! - **Scripts**: assemble the self-contained per-IDE job script, with every
//!   embedded asset base64-framed so it survives two shell hops unchanged.
//!
//! Any batch system whose CLI exposes the same columnar queue contract and a
//! cancel-by-id command plugs in here.

mod query;
mod script;
mod submit;

pub use query::{Interrogator, PortRead, QueueView};
pub use script::{build_script, ScriptError, ScriptSpec};
pub use submit::parse_job_id;

use thiserror::Error;

/// Errors from scheduler CLI interaction.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error(transparent)]
    Remote(#[from] gw_remote::RemoteError),
    #[error("no job id in submit output: {stdout:?}")]
    SubmitUnparseable { stdout: String },
}
