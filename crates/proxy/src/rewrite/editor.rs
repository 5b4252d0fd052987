// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Editor rewriter: cookie-token auth with stale-cookie recovery.

use super::{map_set_cookies, RequestCtx, ResponseCtx, Rewrite, SyntheticResponse};
use axum::http::StatusCode;

/// Auth cookies the editor is known to set across releases.
pub(crate) const AUTH_COOKIES: [&str; 1] = ["auth-tkn"];

/// Cookie-based editor auth.
///
/// First contact: the browser has no (or a stale) auth cookie, so requests
/// to the base path are rewritten to the upstream's root auth path with the
/// session token as a query parameter, and the upstream answers by setting a
/// fresh cookie. Stale cookies from a previous control-plane life make the
/// upstream return 403; that is short-circuited into a redirect that clears
/// every known auth cookie and lands the browser back on the base path,
/// where the first-contact rewrite runs again.
pub struct EditorRewriter {
    token: String,
    base_path: String,
}

impl EditorRewriter {
    pub fn new(token: impl Into<String>, base_path: impl Into<String>) -> Self {
        Self { token: token.into(), base_path: base_path.into() }
    }

    fn is_base_path(&self, path: &str) -> bool {
        path == self.base_path || path == format!("{}/", self.base_path)
    }
}

impl Rewrite for EditorRewriter {
    fn on_request(&self, req: &mut RequestCtx) {
        let cookie_ok = req.cookie(AUTH_COOKIES[0]).is_some_and(|v| v == self.token);
        if !cookie_ok && self.is_base_path(&req.path) {
            req.path = "/".to_string();
            req.query = Some(format!("tkn={}", self.token));
        }
    }

    fn on_response(&self, resp: &mut ResponseCtx) -> Option<SyntheticResponse> {
        if resp.status == StatusCode::FORBIDDEN && resp.request_had_auth_cookie {
            let clears = AUTH_COOKIES
                .iter()
                .map(|name| format!("{name}=; Expires=Thu, 01 Jan 1970 00:00:00 GMT"))
                .collect();
            return Some(SyntheticResponse::redirect(&format!("{}/", self.base_path), clears));
        }

        map_set_cookies(&mut resp.headers, |cookie| {
            rescope_cookie(cookie, &self.base_path)
        });
        None
    }
}

/// Drop `Domain=`, pin `Path=` to the session's base path.
fn rescope_cookie(cookie: &str, base_path: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut saw_path = false;
    for part in cookie.split(';') {
        let trimmed = part.trim();
        let attr = trimmed.split('=').next().unwrap_or("").to_ascii_lowercase();
        match attr.as_str() {
            "domain" => continue,
            "path" => {
                saw_path = true;
                parts.push(format!("Path={base_path}"));
            }
            _ => parts.push(trimmed.to_string()),
        }
    }
    if !saw_path {
        parts.push(format!("Path={base_path}"));
    }
    parts.join("; ")
}

#[cfg(test)]
#[path = "editor_tests.rs"]
mod tests;
