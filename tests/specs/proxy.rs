// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proxy plane specs against a live loopback upstream.

use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use gw_core::{IdeKind, SessionKey};
use gw_proxy::http::serve_http;
use gw_proxy::{ActivityTracker, ProxyRegistry};

async fn spawn_upstream(app: Router) -> u16 {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    port
}

// A stale editor cookie earns a 403 from the upstream; the proxy turns
// it into a 302 back to the base path with the known cookie cleared.
#[tokio::test]
async fn stale_cookie_recovery() {
    let app = Router::new().route(
        "/code/workbench",
        get(|| async { (StatusCode::FORBIDDEN, "stale") }),
    );
    let port = spawn_upstream(app).await;

    let registry = ProxyRegistry::new(ActivityTracker::new(), None);
    let key = SessionKey::new("alice", "gemini", IdeKind::Editor);
    let handle = registry.ensure(&key, port, Some("freshtoken")).unwrap();

    let req = Request::builder()
        .uri("/code/workbench")
        .header("cookie", "auth-tkn=OLD")
        .body(Body::empty())
        .unwrap();
    let response = serve_http(handle, req).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers().get("location").unwrap(), "/code/");
    assert_eq!(
        response.headers().get("set-cookie").unwrap().to_str().unwrap(),
        "auth-tkn=; Expires=Thu, 01 Jan 1970 00:00:00 GMT"
    );
}

// First contact without a cookie rides through the auth path and comes back
// with a rescoped cookie.
#[tokio::test]
async fn first_contact_sets_a_scoped_cookie() {
    let app = Router::new().route(
        "/",
        get(|req: Request| async move {
            // The auth path must carry the session token as a query param.
            assert_eq!(req.uri().query(), Some("tkn=freshtoken"));
            (
                [("set-cookie", "auth-tkn=freshtoken; Path=/; HttpOnly")],
                "welcome",
            )
        }),
    );
    let port = spawn_upstream(app).await;

    let registry = ProxyRegistry::new(ActivityTracker::new(), None);
    let key = SessionKey::new("alice", "gemini", IdeKind::Editor);
    let handle = registry.ensure(&key, port, Some("freshtoken")).unwrap();

    let req = Request::builder().uri("/code/").body(Body::empty()).unwrap();
    let response = serve_http(handle, req).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response.headers().get("set-cookie").unwrap().to_str().unwrap();
    assert!(cookie.contains("Path=/code"), "cookie not rescoped: {cookie}");
    assert!(!cookie.contains("Domain="));
}

// Activity is stamped by real traffic and skipped for probes.
#[tokio::test]
async fn activity_tracks_traffic_not_probes() {
    let app = Router::new().route("/rstudio/", get(|| async { "ok" }));
    let port = spawn_upstream(app).await;

    let tracker = ActivityTracker::new();
    let registry = ProxyRegistry::new(tracker.clone(), None);
    let key = SessionKey::new("alice", "gemini", IdeKind::RStudio);
    let handle = registry.ensure(&key, port, None).unwrap();

    let probe = Request::builder()
        .uri("/rstudio/")
        .header("x-gangway-probe", "1")
        .body(Body::empty())
        .unwrap();
    let response = serve_http(handle.clone(), probe).await;
    let _ = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert!(tracker.last(&key).is_none());

    let real = Request::builder().uri("/rstudio/").body(Body::empty()).unwrap();
    let response = serve_http(handle, real).await;
    let _ = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert!(tracker.last(&key).is_some());
}
