// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::activity::ActivityTracker;
use crate::registry::ProxyRegistry;
use axum::extract::State;
use axum::routing::any;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use gw_core::{IdeKind, SessionKey};
use tokio_tungstenite::tungstenite::Message;

/// Upstream: a bare tungstenite echo server on an ephemeral port.
async fn spawn_echo_upstream() -> u16 {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else { return };
                let (mut tx, mut rx) = ws.split();
                while let Some(Ok(msg)) = rx.next().await {
                    if msg.is_text() || msg.is_binary() {
                        if tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                }
            });
        }
    });
    port
}

/// Front door stand-in: one route that bridges upgrades through the handle.
async fn spawn_front(handle: Arc<ProxyHandle>) -> u16 {
    let app = Router::new()
        .route(
            "/rstudio/*rest",
            any(
                |State(handle): State<Arc<ProxyHandle>>,
                 ws: WebSocketUpgrade,
                 req: axum::extract::Request| async move {
                    let path = req.uri().path().to_string();
                    let query = req.uri().query().map(str::to_string);
                    serve_ws(handle, ws, path, query, req.headers().clone())
                },
            ),
        )
        .with_state(handle);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    port
}

#[tokio::test]
async fn frames_round_trip_and_stamp_activity() {
    let upstream_port = spawn_echo_upstream().await;

    let tracker = ActivityTracker::new();
    let registry = ProxyRegistry::new(tracker.clone(), None);
    let key = SessionKey::new("alice", "gemini", IdeKind::RStudio);
    let handle = registry.ensure(&key, upstream_port, None).unwrap();
    let front_port = spawn_front(handle).await;

    let (mut client, _) =
        tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{front_port}/rstudio/events"))
            .await
            .unwrap();

    client.send(Message::Text("ping-1".into())).await.unwrap();
    let echoed = tokio::time::timeout(std::time::Duration::from_secs(5), client.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(echoed.into_text().unwrap().as_str(), "ping-1");

    client.send(Message::Binary(vec![1u8, 2, 3].into())).await.unwrap();
    let echoed = tokio::time::timeout(std::time::Duration::from_secs(5), client.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(echoed, Message::Binary(b) if b.as_ref() == [1u8, 2, 3]));

    assert!(tracker.last(&key).is_some());
}

#[tokio::test]
async fn client_close_shuts_the_bridge_down() {
    let upstream_port = spawn_echo_upstream().await;
    let registry = ProxyRegistry::new(ActivityTracker::new(), None);
    let key = SessionKey::new("bob", "gemini", IdeKind::RStudio);
    let handle = registry.ensure(&key, upstream_port, None).unwrap();
    let front_port = spawn_front(handle).await;

    let (mut client, _) =
        tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{front_port}/rstudio/events"))
            .await
            .unwrap();
    client.close(None).await.unwrap();
    // The bridge should answer the close handshake rather than hang.
    let done = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while let Some(msg) = client.next().await {
            if matches!(msg, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
    })
    .await;
    assert!(done.is_ok());
}
