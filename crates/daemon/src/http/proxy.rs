// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reverse-proxied IDE prefixes and the `/port/:n` passthrough.
//!
//! The active session is resolved from the authenticated principal on every
//! request; nothing about routing lives in process-wide state. Proxy
//! handles are created lazily, so sessions restored from disk after a
//! restart regain their route on first traffic. Monitoring callers mark
//! themselves with the `x-gangway-probe` header and never count as
//! activity.

use super::{AppState, Principal};
use axum::body::Body;
use axum::extract::{Request, State, WebSocketUpgrade};
use axum::http::{StatusCode, Uri};
use axum::response::Response;
use gw_core::{IdeKind, Session, SessionStatus};
use gw_proxy::{http::serve_http, ws::serve_ws};
use gw_tunnel::TunnelId;
use tracing::warn;

/// Every public prefix the proxy plane serves, including the iframe-root
/// twins.
pub const PROXY_PREFIXES: [&str; 6] =
    ["/code", "/code-direct", "/rstudio", "/rstudio-direct", "/jupyter", "/jupyter-direct"];

/// Classify a request path to an IDE family.
pub(crate) fn classify(path: &str) -> Option<IdeKind> {
    for ide in IdeKind::ALL {
        for prefix in [ide.route_prefix(), ide.direct_prefix()] {
            if let Some(rest) = path.strip_prefix(prefix) {
                if rest.is_empty() || rest.starts_with('/') {
                    return Some(ide);
                }
            }
        }
    }
    None
}

/// The `-direct` twins are iframe roots; upstream only knows the plain base
/// path, so fold them over before forwarding.
pub(crate) fn fold_direct_prefix(path: &str, ide: IdeKind) -> String {
    match path.strip_prefix(ide.direct_prefix()) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => {
            format!("{}{}", ide.route_prefix(), rest)
        }
        _ => path.to_string(),
    }
}

/// All IDE-prefix traffic, HTTP and WebSocket alike.
pub async fn ide_traffic(
    State(state): State<AppState>,
    Principal(user): Principal,
    ws: Option<WebSocketUpgrade>,
    req: Request,
) -> Response {
    let Some(ide) = classify(req.uri().path()) else {
        return plain(StatusCode::NOT_FOUND, "not an IDE route");
    };
    let path = fold_direct_prefix(req.uri().path(), ide);
    let Some(session) = state.engine.store().find_running(&user, ide) else {
        return plain(
            StatusCode::CONFLICT,
            "no running session for this IDE; launch one first",
        );
    };
    let Some(local_port) = session.local_port else {
        return plain(StatusCode::BAD_GATEWAY, "session has no local endpoint");
    };

    let handle = match state.engine.proxies().ensure(
        &session.key,
        local_port,
        session.token.as_deref(),
    ) {
        Ok(handle) => handle,
        Err(e) => {
            warn!(session = %session.key, "proxy bind failed: {e}");
            return plain(StatusCode::INTERNAL_SERVER_ERROR, "proxy bind failed");
        }
    };

    match ws {
        Some(ws) => {
            let query = req.uri().query().map(str::to_string);
            serve_ws(handle, ws, path, query, req.headers().clone())
        }
        None if path == req.uri().path() => serve_http(handle, req).await,
        None => {
            let (mut parts, body) = req.into_parts();
            let new_uri = match rebuild_uri(&path, parts.uri.query()) {
                Some(uri) => uri,
                None => return plain(StatusCode::BAD_REQUEST, "bad path"),
            };
            parts.uri = new_uri;
            serve_http(handle, Request::from_parts(parts, body)).await
        }
    }
}

/// `/port/:n` is a passthrough to a user dev server on the compute node of the
/// user's most recent running session. A dedicated tunnel per (user,
/// cluster, port) is opened on first use and follows the session's node.
pub async fn port_traffic(
    State(state): State<AppState>,
    Principal(user): Principal,
    ws: Option<WebSocketUpgrade>,
    req: Request,
) -> Response {
    let Some(port) = parse_port(req.uri().path()) else {
        return plain(StatusCode::BAD_REQUEST, "bad port");
    };
    let Some(session) = latest_running_session(&state, &user) else {
        return plain(StatusCode::CONFLICT, "no running session to route through");
    };
    let Some(node) = session.node.clone() else {
        return plain(StatusCode::BAD_GATEWAY, "session has no node");
    };

    let tunnel_id = TunnelId::for_port(&user, &session.key.cluster, port);
    let local_port = match state.engine.tunnels().local_port(&tunnel_id) {
        Some(port) => port,
        None => {
            match state
                .engine
                .tunnels()
                .start(tunnel_id, &session.key.cluster, &user, &node, port)
                .await
            {
                Ok(port) => port,
                Err(e) => {
                    warn!(%user, port, "port tunnel failed: {e}");
                    return plain(StatusCode::BAD_GATEWAY, "dev server not reachable");
                }
            }
        }
    };

    let handle = match state.engine.proxies().passthrough(&session.key, local_port) {
        Ok(handle) => handle,
        Err(e) => {
            warn!(%user, "passthrough bind failed: {e}");
            return plain(StatusCode::INTERNAL_SERVER_ERROR, "proxy bind failed");
        }
    };

    // Strip the /port/:n prefix before forwarding; the dev server sees
    // root-relative paths.
    let stripped = strip_port_prefix(req.uri(), port);
    match ws {
        Some(ws) => {
            let query = req.uri().query().map(str::to_string);
            serve_ws(handle, ws, stripped, query, req.headers().clone())
        }
        None => {
            let (mut parts, body) = req.into_parts();
            let new_uri = match rebuild_uri(&stripped, parts.uri.query()) {
                Some(uri) => uri,
                None => return plain(StatusCode::BAD_REQUEST, "bad path"),
            };
            parts.uri = new_uri;
            serve_http(handle, Request::from_parts(parts, body)).await
        }
    }
}

/// `/port/8080/...` → 8080.
pub(crate) fn parse_port(path: &str) -> Option<u16> {
    path.strip_prefix("/port/")?.split('/').next()?.parse().ok()
}

fn latest_running_session(state: &AppState, user: &str) -> Option<Session> {
    IdeKind::ALL
        .iter()
        .filter_map(|ide| state.engine.store().find_running(user, *ide))
        .filter(|s| s.status == SessionStatus::Running)
        .max_by_key(|s| s.started_at)
}

pub(crate) fn strip_port_prefix(uri: &Uri, port: u16) -> String {
    let path = uri.path();
    let prefix = format!("/port/{port}");
    match path.strip_prefix(&prefix) {
        Some(rest) if rest.is_empty() => "/".to_string(),
        Some(rest) => rest.to_string(),
        None => path.to_string(),
    }
}

fn rebuild_uri(path: &str, query: Option<&str>) -> Option<Uri> {
    let joined = match query {
        Some(q) if !q.is_empty() => format!("{path}?{q}"),
        _ => path.to_string(),
    };
    joined.parse().ok()
}

fn plain(status: StatusCode, message: &str) -> Response {
    let mut response = Response::new(Body::from(message.to_string()));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
#[path = "proxy_tests.rs"]
mod tests;
