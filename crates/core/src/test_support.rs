// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builders and proptest strategies for other crates' tests.
//!
//! Gated behind the `test-support` feature so production builds never see
//! this module.

use crate::ide::IdeKind;
use crate::job::{JobRecord, JobState};
use crate::resources::ResourceSpec;
use crate::session::{EndReason, Session, SessionKey, SessionStatus};
use chrono::{DateTime, TimeZone, Utc};

/// A deterministic timestamp for tests.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).single().unwrap_or_else(Utc::now)
}

/// Builder for [`Session`] records in tests.
pub struct SessionBuilder {
    key: SessionKey,
    status: SessionStatus,
    job_id: Option<u64>,
    node: Option<String>,
    ide_port: Option<u16>,
    local_port: Option<u16>,
    token: Option<String>,
    release: String,
    resources: ResourceSpec,
}

impl SessionBuilder {
    pub fn new(user: &str, cluster: &str, ide: IdeKind) -> Self {
        Self {
            key: SessionKey::new(user, cluster, ide),
            status: SessionStatus::Pending,
            job_id: None,
            node: None,
            ide_port: None,
            local_port: None,
            token: None,
            release: "2026.1".to_string(),
            resources: ResourceSpec::default(),
        }
    }

    pub fn status(mut self, status: SessionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn job_id(mut self, id: u64) -> Self {
        self.job_id = Some(id);
        self
    }

    pub fn node(mut self, node: &str) -> Self {
        self.node = Some(node.to_string());
        self
    }

    pub fn ports(mut self, ide_port: u16, local_port: u16) -> Self {
        self.ide_port = Some(ide_port);
        self.local_port = Some(local_port);
        self
    }

    pub fn token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn release(mut self, release: &str) -> Self {
        self.release = release.to_string();
        self
    }

    pub fn resources(mut self, resources: ResourceSpec) -> Self {
        self.resources = resources;
        self
    }

    pub fn build(self) -> Session {
        let now = t0();
        let mut session = Session::new(self.key, self.release, self.resources, now);
        session.job_id = self.job_id;
        session.node = self.node;
        session.ide_port = self.ide_port;
        session.local_port = self.local_port;
        session.token = self.token;
        match self.status {
            SessionStatus::Pending => {}
            SessionStatus::Running => {
                session.status = SessionStatus::Running;
                session.started_at = Some(now);
                session.last_activity = Some(now);
            }
            terminal => {
                session.finish(terminal, EndReason::User, now);
            }
        }
        session
    }
}

/// Builder for [`JobRecord`] queue rows in tests.
pub struct JobRecordBuilder {
    id: u64,
    user: String,
    name: String,
    state: JobState,
    node: Option<String>,
    time_left_secs: Option<u64>,
    time_limit_secs: Option<u64>,
}

impl JobRecordBuilder {
    pub fn new(id: u64, user: &str, ide: IdeKind) -> Self {
        Self {
            id,
            user: user.to_string(),
            name: ide.job_name(user),
            state: JobState::Pending,
            node: None,
            time_left_secs: None,
            time_limit_secs: Some(12 * 3600),
        }
    }

    pub fn running(mut self, node: &str, time_left_secs: u64) -> Self {
        self.state = JobState::Running;
        self.node = Some(node.to_string());
        self.time_left_secs = Some(time_left_secs);
        self
    }

    pub fn build(self) -> JobRecord {
        JobRecord {
            id: self.id,
            user: self.user,
            name: self.name,
            state: self.state,
            node: self.node,
            time_left_secs: self.time_left_secs,
            time_limit_secs: self.time_limit_secs,
            cpus: 4,
            memory: "40G".to_string(),
            start_time: None,
        }
    }
}

#[cfg(feature = "test-support")]
pub mod strategies {
    //! Proptest strategies over the domain types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_ide() -> impl Strategy<Value = IdeKind> {
        prop_oneof![
            Just(IdeKind::Editor),
            Just(IdeKind::RStudio),
            Just(IdeKind::Jupyter),
        ]
    }

    pub fn arb_status() -> impl Strategy<Value = SessionStatus> {
        prop_oneof![
            Just(SessionStatus::Pending),
            Just(SessionStatus::Running),
            Just(SessionStatus::Completed),
            Just(SessionStatus::Failed),
            Just(SessionStatus::Cancelled),
        ]
    }

    pub fn arb_end_reason() -> impl Strategy<Value = EndReason> {
        prop_oneof![
            Just(EndReason::User),
            Just(EndReason::Idle),
            Just(EndReason::Expired),
            Just(EndReason::SchedulerLost),
            Just(EndReason::Failure),
        ]
    }

    pub fn arb_key() -> impl Strategy<Value = SessionKey> {
        ("[a-z][a-z0-9]{0,11}", "[a-z][a-z0-9]{0,11}", arb_ide())
            .prop_map(|(user, cluster, ide)| SessionKey::new(user, cluster, ide))
    }

    /// Full session with status-consistent optional fields, for round-trip
    /// properties.
    pub fn arb_session() -> impl Strategy<Value = SessionStrategyOut> {
        (arb_key(), arb_status(), any::<u32>(), proptest::option::of("[a-z0-9]{8}"))
            .prop_map(|(key, status, job_seed, token)| {
                let mut builder = SessionBuilder::new(&key.user, &key.cluster, key.ide)
                    .status(status)
                    .job_id(10_000 + u64::from(job_seed % 50_000));
                if status == SessionStatus::Running {
                    builder = builder.node("node-c07").ports(8001, 37241);
                }
                if let Some(token) = token {
                    builder = builder.token(&token);
                }
                builder.build()
            })
    }

    pub type SessionStrategyOut = Session;
}
