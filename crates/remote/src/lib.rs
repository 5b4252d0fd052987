// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gw-remote: shell execution on cluster head nodes.
//!
//! One trait, [`RemoteExec`], and one production implementation, [`SshExec`],
//! which runs a command on a named cluster's head node over `ssh` with the
//! caller's user-scoped key. Commands are wall-capped and per-cluster
//! concurrency is bounded; overflow callers wait in FIFO order.

mod exec;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use exec::{RemoteError, RemoteExec, SshExec, SshExecConfig};

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeExec;
