// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use axum::http::{HeaderMap, Method};

fn rewriter() -> EditorRewriter {
    EditorRewriter::new("tok123", "/code")
}

fn request(path: &str, cookie: Option<&str>) -> RequestCtx {
    let mut headers = HeaderMap::new();
    if let Some(cookie) = cookie {
        headers.insert(axum::http::header::COOKIE, cookie.parse().unwrap());
    }
    RequestCtx::new(Method::GET, path, None, headers)
}

fn response(status: u16, had_cookie: bool) -> ResponseCtx {
    ResponseCtx {
        status: StatusCode::from_u16(status).unwrap(),
        headers: HeaderMap::new(),
        request_path: "/code/".to_string(),
        request_had_auth_cookie: had_cookie,
    }
}

#[test]
fn missing_cookie_on_base_path_redirects_through_auth() {
    let mut req = request("/code/", None);
    rewriter().on_request(&mut req);
    assert_eq!(req.path, "/");
    assert_eq!(req.query.as_deref(), Some("tkn=tok123"));
}

#[test]
fn stale_cookie_on_base_path_redirects_through_auth() {
    let mut req = request("/code", Some("auth-tkn=OLD"));
    rewriter().on_request(&mut req);
    assert_eq!(req.path_and_query(), "/?tkn=tok123");
}

#[test]
fn valid_cookie_passes_through() {
    let mut req = request("/code/", Some("auth-tkn=tok123"));
    rewriter().on_request(&mut req);
    assert_eq!(req.path, "/code/");
    assert_eq!(req.query, None);
}

#[test]
fn deep_paths_never_rewrite_even_without_cookie() {
    let mut req = request("/code/static/app.js", None);
    rewriter().on_request(&mut req);
    assert_eq!(req.path, "/code/static/app.js");
}

#[test]
fn forbidden_with_cookie_clears_and_redirects() {
    // A 403 against a known cookie means the cookie predates this session:
    // clear it and land the browser back on the base path.
    let mut resp = response(403, true);
    let synthetic = rewriter().on_response(&mut resp).unwrap();
    assert_eq!(synthetic.status, StatusCode::FOUND);
    assert!(synthetic
        .headers
        .iter()
        .any(|(k, v)| k == "location" && v == "/code/"));
    assert!(synthetic
        .headers
        .iter()
        .any(|(k, v)| k == "set-cookie"
            && v == "auth-tkn=; Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
}

#[test]
fn forbidden_without_cookie_is_passed_through() {
    let mut resp = response(403, false);
    assert!(rewriter().on_response(&mut resp).is_none());
}

#[yare::parameterized(
    domain_stripped = {
        "auth-tkn=abc; Domain=.example.org; HttpOnly",
        "auth-tkn=abc; HttpOnly; Path=/code"
    },
    path_rescoped = {
        "auth-tkn=abc; Path=/; HttpOnly",
        "auth-tkn=abc; Path=/code; HttpOnly"
    },
    path_added = { "auth-tkn=abc", "auth-tkn=abc; Path=/code" },
)]
fn set_cookie_is_rescoped(input: &str, expected: &str) {
    let mut resp = response(200, false);
    resp.headers
        .insert(axum::http::header::SET_COOKIE, input.parse().unwrap());
    assert!(rewriter().on_response(&mut resp).is_none());
    let got = resp.headers.get(axum::http::header::SET_COOKIE).unwrap();
    assert_eq!(got.to_str().unwrap(), expected);
}
