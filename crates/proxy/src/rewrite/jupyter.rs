// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notebook rewriter: query-token auth and base-url mapping.

use super::{RequestCtx, ResponseCtx, Rewrite, SyntheticResponse};
use axum::http::header::{HeaderValue, LOCATION};

/// Query-token notebook.
///
/// The upstream runs with `base_url` set to the internal prefix; the public
/// route differs, so the path prefix is rewritten on the way up and
/// `Location` headers on the way back. The session token is injected as a
/// `token=` query parameter when the client did not send one.
pub struct JupyterRewriter {
    token: String,
    public_prefix: String,
    internal_prefix: String,
}

impl JupyterRewriter {
    pub fn new(
        token: impl Into<String>,
        public_prefix: impl Into<String>,
        internal_prefix: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            public_prefix: public_prefix.into(),
            internal_prefix: internal_prefix.into(),
        }
    }

    fn has_token(query: Option<&str>) -> bool {
        query.is_some_and(|q| q.split('&').any(|pair| pair.starts_with("token=")))
    }
}

impl Rewrite for JupyterRewriter {
    fn on_request(&self, req: &mut RequestCtx) {
        if let Some(rest) = req.path.strip_prefix(&self.public_prefix) {
            if rest.is_empty() || rest.starts_with('/') {
                req.path = format!("{}{}", self.internal_prefix, rest);
            }
        }
        if !Self::has_token(req.query.as_deref()) {
            req.append_query(format!("token={}", self.token));
        }
    }

    fn on_response(&self, resp: &mut ResponseCtx) -> Option<SyntheticResponse> {
        let location = resp
            .headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Some(location) = location {
            if let Some(rest) = location.strip_prefix(&self.internal_prefix) {
                if rest.is_empty() || rest.starts_with('/') || rest.starts_with('?') {
                    let rewritten = format!("{}{}", self.public_prefix, rest);
                    if let Ok(value) = HeaderValue::from_str(&rewritten) {
                        resp.headers.insert(LOCATION, value);
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
#[path = "jupyter_tests.rs"]
mod tests;
