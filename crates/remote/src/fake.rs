// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted executor for tests.
//!
//! Rules are matched against the command by substring, first match wins, and
//! every call is recorded so tests can assert on what was run.

use crate::exec::{RemoteError, RemoteExec};
use async_trait::async_trait;
use parking_lot::Mutex;

enum Reply {
    Stdout(String),
    NonZero(i32, String),
}

struct Rule {
    needle: String,
    reply: Reply,
    /// None = unlimited; Some(n) = consumed after n matches.
    remaining: Option<u32>,
}

/// One recorded invocation: `(cluster, user, command)`.
pub type RecordedCall = (String, String, String);

/// In-memory [`RemoteExec`] with scripted, substring-matched replies.
#[derive(Default)]
pub struct FakeExec {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeExec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `stdout` whenever the command contains `needle`.
    pub fn on(self, needle: &str, stdout: &str) -> Self {
        self.push(needle, Reply::Stdout(stdout.to_string()), None);
        self
    }

    /// Like [`on`](Self::on) but consumed after `n` matches, so later rules
    /// for the same needle take over (e.g. pending → running poll sequences).
    pub fn on_times(self, needle: &str, stdout: &str, n: u32) -> Self {
        self.push(needle, Reply::Stdout(stdout.to_string()), Some(n));
        self
    }

    /// Fail with exit `code` whenever the command contains `needle`.
    pub fn on_fail(self, needle: &str, code: i32, stderr: &str) -> Self {
        self.push(needle, Reply::NonZero(code, stderr.to_string()), None);
        self
    }

    fn push(&self, needle: &str, reply: Reply, remaining: Option<u32>) {
        self.rules.lock().push(Rule { needle: needle.to_string(), reply, remaining });
    }

    /// Everything run so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Count of commands containing `needle`.
    pub fn call_count(&self, needle: &str) -> usize {
        self.calls.lock().iter().filter(|(_, _, c)| c.contains(needle)).count()
    }
}

#[async_trait]
impl RemoteExec for FakeExec {
    async fn run(&self, cluster: &str, user: &str, command: &str) -> Result<String, RemoteError> {
        self.calls.lock().push((cluster.to_string(), user.to_string(), command.to_string()));

        let mut rules = self.rules.lock();
        for rule in rules.iter_mut() {
            if !command.contains(&rule.needle) {
                continue;
            }
            if let Some(remaining) = &mut rule.remaining {
                if *remaining == 0 {
                    continue;
                }
                *remaining -= 1;
            }
            return match &rule.reply {
                Reply::Stdout(s) => Ok(s.clone()),
                Reply::NonZero(code, stderr) => {
                    Err(RemoteError::NonZero { code: *code, stderr: stderr.clone() })
                }
            };
        }
        Err(RemoteError::NonZero { code: 127, stderr: format!("unscripted command: {command}") })
    }
}
