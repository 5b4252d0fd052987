// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gw-core: domain model for the Gangway control plane.
//!
//! The central entity is the [`Session`]: one interactive IDE job on one
//! cluster for one user, identified by its [`SessionKey`]. Everything else
//! here is the vocabulary the other crates speak: IDE kinds, scheduler queue
//! rows, resource requests, launch events, and the clock abstraction.

pub mod clock;
pub mod event;
pub mod ide;
pub mod job;
pub mod resources;
pub mod session;
pub mod time_fmt;
pub mod token;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use event::{LaunchErrorKind, LaunchEvent, LaunchStep, SessionEvent};
pub use ide::{AuthMode, IdeKind};
pub use job::{JobRecord, JobState};
pub use resources::ResourceSpec;
pub use session::{EndReason, Session, SessionKey, SessionStatus};
pub use token::{correlation_id, new_token};

#[cfg(any(test, feature = "test-support"))]
pub use test_support::{JobRecordBuilder, SessionBuilder};
