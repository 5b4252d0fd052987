// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `GET /cluster-status`: the per-cluster, per-IDE status map the UI polls.

use super::{AppState, Principal};
use axum::extract::{Query, State};
use axum::Json;
use gw_core::{IdeKind, JobRecord, Session, SessionStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    /// `?refresh=1` forces a scheduler poll before answering.
    #[serde(default)]
    refresh: Option<u8>,
}

/// Status of one IDE slot on one cluster.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum IdeStatus {
    Idle,
    Pending {
        job_id: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        start_time: Option<String>,
    },
    Running {
        job_id: u64,
        node: String,
        time_left_seconds: Option<u64>,
        time_limit_seconds: Option<u64>,
        cpus: u32,
        memory: String,
        /// Present only for sessions this control plane launched (the token
        /// is what lets the UI deep-link into a token-auth IDE).
        #[serde(skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
}

pub async fn cluster_status(
    State(state): State<AppState>,
    Principal(user): Principal,
    Query(query): Query<StatusQuery>,
) -> Json<BTreeMap<String, BTreeMap<String, IdeStatus>>> {
    let force = query.refresh.is_some_and(|r| r == 1);
    let no_cache = state
        .engine
        .catalog()
        .names()
        .iter()
        .any(|cluster| state.engine.cached_queue(&user, cluster).is_none());
    if force || no_cache {
        state.engine.refresh_user(&user).await;
        state.engine.wake_poller();
    }

    let mut clusters = BTreeMap::new();
    for cluster in state.engine.catalog().names() {
        let cached = state.engine.cached_queue(&user, &cluster);
        let mut ides = BTreeMap::new();
        for ide in IdeKind::ALL {
            let session = state
                .engine
                .store()
                .get(&gw_core::SessionKey::new(&user, &cluster, ide));
            let job = cached.as_ref().and_then(|cache| cache.jobs.get(&ide));
            ides.insert(ide.to_string(), ide_status(session.as_ref(), job));
        }
        clusters.insert(cluster, ides);
    }
    Json(clusters)
}

/// Merge the durable session record with the freshest queue row.
fn ide_status(session: Option<&Session>, job: Option<&JobRecord>) -> IdeStatus {
    if let Some(session) = session {
        if session.status == SessionStatus::Running {
            return IdeStatus::Running {
                job_id: session.job_id.unwrap_or_default(),
                node: session.node.clone().unwrap_or_default(),
                time_left_seconds: job.and_then(|j| j.time_left_secs),
                time_limit_seconds: job.and_then(|j| j.time_limit_secs),
                cpus: session.resources.cpus,
                memory: session.resources.memory.clone(),
                token: session.token.clone(),
            };
        }
    }

    // No running session: the queue row alone decides. A job someone
    // submitted outside this control plane still shows up as pending until
    // the user connects to it.
    match job {
        Some(job) => IdeStatus::Pending { job_id: job.id, start_time: job.start_time.clone() },
        None => IdeStatus::Idle,
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
