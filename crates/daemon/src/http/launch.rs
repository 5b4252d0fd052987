// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `GET /launch/:cluster/:ide/stream`: the SSE launch stream.

use super::{AppState, Principal};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::Stream;
use futures_util::StreamExt;
use gw_core::{time_fmt, IdeKind, ResourceSpec};
use gw_engine::LaunchSpec;
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchQuery {
    pub cpus: Option<u32>,
    pub mem: Option<String>,
    /// Walltime in scheduler notation, e.g. `12:00:00`.
    pub time: Option<String>,
    pub release_version: Option<String>,
    pub gpu: Option<String>,
}

impl LaunchQuery {
    fn resources(&self) -> Result<ResourceSpec, String> {
        let defaults = ResourceSpec::default();
        let walltime_secs = match &self.time {
            Some(time) => time_fmt::parse_duration(time)
                .ok_or_else(|| format!("unparseable walltime {time:?}"))?,
            None => defaults.walltime_secs,
        };
        let mut resources = ResourceSpec::new(
            self.cpus.unwrap_or(defaults.cpus),
            self.mem.clone().unwrap_or(defaults.memory),
            walltime_secs,
        );
        if let Some(gpu) = &self.gpu {
            resources = resources.with_gpu(gpu.clone());
        }
        Ok(resources)
    }
}

pub async fn launch_stream(
    State(state): State<AppState>,
    Principal(user): Principal,
    Path((cluster, ide)): Path<(String, String)>,
    Query(query): Query<LaunchQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let ide: IdeKind = ide
        .parse()
        .map_err(|_| (StatusCode::NOT_FOUND, format!("unknown ide {ide:?}")))?;
    if state.engine.catalog().get(&cluster).is_none() {
        return Err((StatusCode::NOT_FOUND, format!("unknown cluster {cluster:?}")));
    }
    let resources = query.resources().map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    let rx = state.engine.clone().launch(
        &user,
        &cluster,
        ide,
        LaunchSpec { resources, release: query.release_version.clone() },
    );

    // Each event's JSON body is the wire shape the UI consumes; dropping
    // the connection drops the receiver and cancels the launch.
    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().data(data))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
#[path = "launch_tests.rs"]
mod tests;
