// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! R IDE rewriter: no login, lives inside an iframe.

use super::{map_set_cookies, RequestCtx, ResponseCtx, Rewrite, SyntheticResponse};
use axum::http::header::{HeaderName, HeaderValue, LOCATION};

/// Header the upstream reads to learn its public base path.
const ROOT_PATH_HEADER: &str = "x-rstudio-root-path";

/// Iframe-hosted R IDE.
///
/// The upstream signs its cookies with an HMAC over (name, value, path), so
/// `Path=` is preserved exactly; only `Secure; SameSite=None` is added so
/// the cookies survive cross-context iframe loading. Absolute redirects
/// pointing at the tunnel target or the configured external host are
/// stripped to root-relative, and root-relative redirects gain the session's
/// base path so the proxy chain is preserved.
pub struct RStudioRewriter {
    base_path: String,
    /// The loopback authority the upstream believes it is, e.g.
    /// `127.0.0.1:37241`.
    internal_authority: String,
    external_host: Option<String>,
}

impl RStudioRewriter {
    pub fn new(
        base_path: impl Into<String>,
        internal_authority: impl Into<String>,
        external_host: Option<String>,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            internal_authority: internal_authority.into(),
            external_host,
        }
    }

    fn strip_absolute<'a>(&self, location: &'a str) -> &'a str {
        for scheme in ["http://", "https://"] {
            let Some(rest) = location.strip_prefix(scheme) else { continue };
            let (authority, path) = match rest.find('/') {
                Some(idx) => (&rest[..idx], &rest[idx..]),
                None => (rest, "/"),
            };
            let internal = authority == self.internal_authority;
            let external = self
                .external_host
                .as_deref()
                .is_some_and(|h| authority == h || authority.strip_suffix(":443") == Some(h));
            if internal || external {
                return path;
            }
        }
        location
    }
}

impl Rewrite for RStudioRewriter {
    fn on_request(&self, req: &mut RequestCtx) {
        if let (Ok(name), Ok(value)) = (
            ROOT_PATH_HEADER.parse::<HeaderName>(),
            HeaderValue::from_str(&self.base_path),
        ) {
            req.headers.insert(name, value);
        }
    }

    fn on_response(&self, resp: &mut ResponseCtx) -> Option<SyntheticResponse> {
        // The surrounding page frames this IDE; the upstream's own opinion
        // on framing does not apply.
        resp.headers.remove("x-frame-options");

        map_set_cookies(&mut resp.headers, secure_same_site_none);

        let location = resp
            .headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Some(location) = location {
            let stripped = self.strip_absolute(&location);
            let rewritten = if stripped.starts_with('/') && !stripped.starts_with(&self.base_path)
            {
                format!("{}{}", self.base_path, stripped)
            } else {
                stripped.to_string()
            };
            if let Ok(value) = HeaderValue::from_str(&rewritten) {
                resp.headers.insert(LOCATION, value);
            }
        }
        None
    }
}

/// Add `Secure; SameSite=None`, preserving everything else, in particular
/// `Path=`, which participates in the upstream's cookie HMAC.
fn secure_same_site_none(cookie: &str) -> String {
    let lower = cookie.to_ascii_lowercase();
    let mut out = cookie.trim_end().trim_end_matches(';').to_string();
    if !lower.contains("secure") {
        out.push_str("; Secure");
    }
    if !lower.contains("samesite") {
        out.push_str("; SameSite=None");
    }
    out
}

#[cfg(test)]
#[path = "rstudio_tests.rs"]
mod tests;
