// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource requests attached to a launch.

use crate::time_fmt;
use serde::{Deserialize, Serialize};

/// What the user asked the scheduler for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub cpus: u32,
    /// Memory in the scheduler's notation, e.g. `40G` or `2048M`.
    pub memory: String,
    pub walltime_secs: u64,
    /// Accelerator class to request, e.g. `a100`, or None for CPU-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<String>,
}

impl ResourceSpec {
    pub fn new(cpus: u32, memory: impl Into<String>, walltime_secs: u64) -> Self {
        Self { cpus, memory: memory.into(), walltime_secs, gpu: None }
    }

    pub fn with_gpu(mut self, gpu: impl Into<String>) -> Self {
        self.gpu = Some(gpu.into());
        self
    }

    /// Walltime in the scheduler's `[D-]HH:MM:SS` notation.
    pub fn walltime(&self) -> String {
        time_fmt::format_duration(self.walltime_secs)
    }

    /// Requested memory in bytes, if the notation is recognisable.
    pub fn memory_bytes(&self) -> Option<u64> {
        parse_mem_bytes(&self.memory)
    }
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self { cpus: 2, memory: "16G".to_string(), walltime_secs: 8 * 3600, gpu: None }
    }
}

/// Parse scheduler memory notation (`40G`, `2048M`, `512K`, plain bytes)
/// into bytes. Returns None for anything unrecognisable.
pub fn parse_mem_bytes(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let (num, suffix) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) if idx > 0 => (&s[..idx], &s[idx..]),
        None => (s, ""),
        Some(_) => return None,
    };
    let num: u64 = num.parse().ok()?;
    let mult: u64 = match suffix.trim_end_matches(['b', 'B']) {
        "" => 1,
        "K" | "k" => 1024,
        "M" | "m" => 1024 * 1024,
        "G" | "g" => 1024 * 1024 * 1024,
        "T" | "t" => 1024u64.pow(4),
        _ => return None,
    };
    num.checked_mul(mult)
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod tests;
