// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-IDE request/response surgery.
//!
//! Each IDE needs different header, cookie and path rewriting; those
//! differences are first-class vtables installed at proxy creation and
//! closed over the session record only, never over a request. The contexts
//! here are plain data so every rewriter is testable without a socket.

mod editor;
mod jupyter;
mod rstudio;

pub use editor::EditorRewriter;
pub use jupyter::JupyterRewriter;
pub use rstudio::RStudioRewriter;

pub(crate) use editor::AUTH_COOKIES;

use axum::http::{HeaderMap, Method, StatusCode};

/// Mutable view of an outbound request before it is forwarded upstream.
#[derive(Debug, Clone)]
pub struct RequestCtx {
    pub method: Method,
    /// Path component only, always starting with `/`.
    pub path: String,
    /// Raw query string, without the `?`.
    pub query: Option<String>,
    pub headers: HeaderMap,
}

impl RequestCtx {
    pub fn new(method: Method, path: impl Into<String>, query: Option<String>, headers: HeaderMap) -> Self {
        Self { method, path: path.into(), query, headers }
    }

    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(q) if !q.is_empty() => format!("{}?{}", self.path, q),
            _ => self.path.clone(),
        }
    }

    /// Value of a cookie on the request, if present.
    pub fn cookie(&self, name: &str) -> Option<String> {
        for value in self.headers.get_all(axum::http::header::COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            for pair in raw.split(';') {
                let pair = pair.trim();
                if let Some((k, v)) = pair.split_once('=') {
                    if k.trim() == name {
                        return Some(v.trim().to_string());
                    }
                }
            }
        }
        None
    }

    /// Append a `key=value` pair to the query string.
    pub fn append_query(&mut self, pair: String) {
        self.query = Some(match self.query.take() {
            Some(q) if !q.is_empty() => format!("{q}&{pair}"),
            _ => pair,
        });
    }
}

/// Mutable view of an upstream response before it returns to the client.
#[derive(Debug, Clone)]
pub struct ResponseCtx {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Path the client requested (pre-rewrite), for recovery redirects.
    pub request_path: String,
    /// Whether the client sent any known auth cookie.
    pub request_had_auth_cookie: bool,
}

/// A response fabricated by a rewriter instead of the upstream's.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl SyntheticResponse {
    /// 302 with optional Set-Cookie clears.
    pub fn redirect(location: &str, clears: Vec<String>) -> Self {
        let mut headers = vec![("location".to_string(), location.to_string())];
        for clear in clears {
            headers.push(("set-cookie".to_string(), clear));
        }
        Self { status: StatusCode::FOUND, headers, body: String::new() }
    }
}

/// The vtable: request surgery going up, response surgery coming back.
pub trait Rewrite: Send + Sync {
    fn on_request(&self, req: &mut RequestCtx);

    /// Return Some to short-circuit: the upstream body is dropped and the
    /// synthetic response goes to the client instead.
    fn on_response(&self, resp: &mut ResponseCtx) -> Option<SyntheticResponse> {
        let _ = resp;
        None
    }
}

/// Passthrough vtable for `/port/:n` dev-server proxies.
pub struct PassthroughRewriter;

impl Rewrite for PassthroughRewriter {
    fn on_request(&self, _req: &mut RequestCtx) {}
}

/// Rewrite every Set-Cookie header on a response with `f`, preserving order.
pub(crate) fn map_set_cookies(headers: &mut HeaderMap, f: impl Fn(&str) -> String) {
    use axum::http::header::SET_COOKIE;
    let rewritten: Vec<String> = headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(&f)
        .collect();
    if rewritten.is_empty() {
        return;
    }
    headers.remove(SET_COOKIE);
    for cookie in rewritten {
        if let Ok(value) = cookie.parse() {
            headers.append(SET_COOKIE, value);
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
