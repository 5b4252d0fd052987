// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Streaming HTTP forwarding through a proxy handle.

use crate::registry::ProxyHandle;
use crate::rewrite::{RequestCtx, ResponseCtx, SyntheticResponse, AUTH_COOKIES};
use axum::body::Body;
use axum::extract::Request;
use axum::http::{header::HeaderName, HeaderMap, StatusCode};
use axum::response::Response;
use futures_util::StreamExt;
use gw_core::SessionKey;
use std::sync::Arc;
use tracing::warn;

/// Requests carrying this header are health probes: forwarded, but never
/// counted as user activity. The front door sets it.
pub const PROBE_HEADER: &str = "x-gangway-probe";

/// Headers that describe one hop, not the message.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Forward one request through `handle`, streaming both bodies.
pub async fn serve_http(handle: Arc<ProxyHandle>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().map(str::to_string);
    let is_probe = parts.headers.contains_key(PROBE_HEADER);

    let mut ctx = RequestCtx::new(parts.method, path.clone(), query, parts.headers);
    let had_auth_cookie = AUTH_COOKIES.iter().any(|name| ctx.cookie(name).is_some());
    handle.rewriter.on_request(&mut ctx);
    scrub_request_headers(&mut ctx.headers);

    let url = format!("http://{}{}", handle.target, ctx.path_and_query());
    let upstream = handle
        .client
        .request(ctx.method.clone(), &url)
        .headers(ctx.headers.clone())
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send()
        .await;

    let upstream = match upstream {
        Ok(response) => response,
        Err(error) => return bad_gateway(&handle.key, &error),
    };

    let mut resp_ctx = ResponseCtx {
        status: upstream.status(),
        headers: upstream.headers().clone(),
        request_path: path,
        request_had_auth_cookie: had_auth_cookie,
    };
    if let Some(synthetic) = handle.rewriter.on_response(&mut resp_ctx) {
        if !is_probe {
            handle.touch();
        }
        return synthetic.into_response();
    }
    scrub_hop_by_hop(&mut resp_ctx.headers);

    // The guard rides the body stream: activity is stamped when the response
    // finishes (or the client walks away), which is what "completed
    // response" means for long-poll upstreams.
    let guard = ActivityGuard::new(&handle, !is_probe);
    let stream = upstream.bytes_stream().map(move |chunk| {
        let _held = &guard;
        chunk
    });

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = resp_ctx.status;
    *response.headers_mut() = resp_ctx.headers;
    response
}

/// 502 with a user-facing retry hint. Detail goes to the log under the
/// correlation id embedded in the page.
fn bad_gateway(key: &SessionKey, error: &reqwest::Error) -> Response {
    let correlation_id = gw_core::correlation_id();
    warn!(session = %key, %correlation_id, "proxy upstream failed: {error}");
    let body = format!(
        "<!doctype html><html><body>\
         <h1>IDE not reachable</h1>\
         <p>The session is up but its IDE did not answer. It may still be \
         starting; retry in a few seconds.</p>\
         <p><small>ref {correlation_id}</small></p>\
         </body></html>"
    );
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::BAD_GATEWAY;
    response.headers_mut().insert(
        axum::http::header::CONTENT_TYPE,
        axum::http::HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

fn scrub_request_headers(headers: &mut HeaderMap) {
    scrub_hop_by_hop(headers);
    // The client targets us; reqwest derives the upstream Host, and a
    // streamed body re-derives its own framing.
    headers.remove(axum::http::header::HOST);
    headers.remove(axum::http::header::CONTENT_LENGTH);
    headers.remove(HeaderName::from_static(PROBE_HEADER));
}

fn scrub_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

impl SyntheticResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        for (name, value) in self.headers {
            if let (Ok(name), Ok(value)) = (
                name.parse::<HeaderName>(),
                value.parse::<axum::http::HeaderValue>(),
            ) {
                response.headers_mut().append(name, value);
            }
        }
        response
    }
}

/// Stamps activity exactly once when dropped.
struct ActivityGuard {
    activity: crate::activity::ActivityTracker,
    key: SessionKey,
    enabled: bool,
}

impl ActivityGuard {
    fn new(handle: &ProxyHandle, enabled: bool) -> Self {
        Self { activity: handle.activity.clone(), key: handle.key.clone(), enabled }
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        if self.enabled {
            self.activity.touch(&self.key);
        }
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
