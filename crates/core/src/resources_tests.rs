// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    gig = { "40G", Some(40 * 1024 * 1024 * 1024) },
    meg = { "2048M", Some(2048 * 1024 * 1024) },
    kay = { "512K", Some(512 * 1024) },
    bare_bytes = { "1024", Some(1024) },
    gig_suffix_b = { "4Gb", Some(4 * 1024 * 1024 * 1024) },
    empty = { "", None },
    garbage = { "lots", None },
    negative = { "-4G", None },
)]
fn parses_memory_notation(input: &str, expected: Option<u64>) {
    assert_eq!(parse_mem_bytes(input), expected);
}

#[test]
fn walltime_formats_back_to_scheduler_notation() {
    let spec = ResourceSpec::new(4, "40G", 12 * 3600);
    assert_eq!(spec.walltime(), "12:00:00");
}

#[test]
fn gpu_request_is_optional() {
    let spec = ResourceSpec::new(8, "64G", 3600).with_gpu("a100");
    assert_eq!(spec.gpu.as_deref(), Some("a100"));
    assert!(ResourceSpec::default().gpu.is_none());
}
