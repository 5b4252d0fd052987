// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gw-storage: the durable session store.
//!
//! An ordered in-memory map of session records, mirrored to a single JSON
//! file. Every mutation persists before it returns; the file is replaced
//! atomically (temp + fsync + rename) so a crash mid-write never corrupts
//! the readable copy.

mod store;

pub use store::{Reservation, StateStore, StoreError, CURRENT_STATE_VERSION};
