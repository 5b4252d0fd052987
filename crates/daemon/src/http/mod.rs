// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The HTTP front door.
//!
//! Terminates client HTTP and WebSocket traffic, authenticates the
//! principal from a trusted reverse-auth header, dispatches `/launch` and
//! `/stop` to the orchestrator, and hands everything under the IDE prefixes
//! to the proxy plane.

mod launch;
mod proxy;
mod status;
mod stop;

use crate::config::Config;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{request::Parts, StatusCode};
use axum::routing::{any, get, post};
use axum::Router;
use gw_engine::Engine;
use std::sync::Arc;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub config: Arc<Config>,
}

/// The authenticated user, resolved per request, never from process-wide
/// state, so two users' sessions can never collide in the proxy plane.
#[derive(Debug)]
pub struct Principal(pub String);

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(&state.config.auth_header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|user| !user.is_empty())
            .map(|user| Principal(user.to_string()))
            .ok_or((StatusCode::UNAUTHORIZED, "no authenticated principal"))
    }
}

/// Build the full router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/cluster-status", get(status::cluster_status))
        .route("/launch/:cluster/:ide/stream", get(launch::launch_stream))
        .route("/stop/:cluster/:ide", post(stop::stop_session))
        .route("/logout", post(stop::logout));

    let mut app = Router::new()
        .nest(&state.config.api_prefix, api)
        .route("/healthz", get(|| async { "ok" }));

    for prefix in proxy::PROXY_PREFIXES {
        app = app
            .route(prefix, any(proxy::ide_traffic))
            .route(&format!("{prefix}/*rest"), any(proxy::ide_traffic));
    }
    app = app
        .route("/port/:port", any(proxy::port_traffic))
        .route("/port/:port/*rest", any(proxy::port_traffic));

    app.with_state(state)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
