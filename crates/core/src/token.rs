// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token and correlation-id generation.
//!
//! Tokens travel in query strings and cookies, so the alphabet is strictly
//! alphanumeric: nothing that needs percent-encoding.

const ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h',
    'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// Fresh per-session auth token.
pub fn new_token() -> String {
    nanoid::nanoid!(32, &ALPHABET)
}

/// Short id carried by user-facing errors and logged alongside the
/// server-side detail.
pub fn correlation_id() -> String {
    nanoid::nanoid!(8, &ALPHABET)
}
