// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket bridging: client socket ↔ upstream IDE socket.
//!
//! No frame rewriting: only the request-path rewrite (token injection,
//! prefix mapping) applies, then frames are pumped verbatim in both
//! directions until either side closes.

use crate::registry::ProxyHandle;
use crate::rewrite::RequestCtx;
use axum::extract::ws::{CloseFrame, Message as ClientMsg, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, Method};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as UpstreamClose;
use tokio_tungstenite::tungstenite::Message as UpstreamMsg;
use tracing::{debug, warn};

/// Accept the client upgrade and bridge it to the session's IDE.
pub fn serve_ws(
    handle: Arc<ProxyHandle>,
    ws: WebSocketUpgrade,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
) -> Response {
    let mut ctx = RequestCtx::new(Method::GET, path, query, headers);
    handle.rewriter.on_request(&mut ctx);
    let url = format!("ws://{}{}", handle.target, ctx.path_and_query());

    ws.on_upgrade(move |client| async move {
        match connect_async(url.as_str()).await {
            Ok((upstream, _)) => bridge(handle, client, upstream).await,
            Err(error) => {
                warn!(session = %handle.key, url, "ws upstream connect failed: {error}");
                // Dropping `client` sends the close handshake.
            }
        }
    })
}

async fn bridge(
    handle: Arc<ProxyHandle>,
    client: WebSocket,
    upstream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) {
    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    loop {
        tokio::select! {
            msg = client_rx.next() => {
                let Some(Ok(msg)) = msg else { break };
                handle.touch();
                if let Some(msg) = to_upstream(msg) {
                    if upstream_tx.send(msg).await.is_err() {
                        break;
                    }
                }
            }
            msg = upstream_rx.next() => {
                let Some(Ok(msg)) = msg else { break };
                handle.touch();
                if let Some(msg) = to_client(msg) {
                    if client_tx.send(msg).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
    debug!(session = %handle.key, "ws bridge closed");
    let _ = client_tx.close().await;
    let _ = upstream_tx.close().await;
}

fn to_upstream(msg: ClientMsg) -> Option<UpstreamMsg> {
    Some(match msg {
        ClientMsg::Text(text) => UpstreamMsg::Text(text.into()),
        ClientMsg::Binary(data) => UpstreamMsg::Binary(data.into()),
        ClientMsg::Ping(data) => UpstreamMsg::Ping(data.into()),
        ClientMsg::Pong(data) => UpstreamMsg::Pong(data.into()),
        ClientMsg::Close(frame) => UpstreamMsg::Close(frame.map(|f| UpstreamClose {
            code: f.code.into(),
            reason: f.reason.into_owned().into(),
        })),
    })
}

fn to_client(msg: UpstreamMsg) -> Option<ClientMsg> {
    match msg {
        UpstreamMsg::Text(text) => Some(ClientMsg::Text(text.as_str().to_string())),
        UpstreamMsg::Binary(data) => Some(ClientMsg::Binary(data.to_vec())),
        UpstreamMsg::Ping(data) => Some(ClientMsg::Ping(data.to_vec())),
        UpstreamMsg::Pong(data) => Some(ClientMsg::Pong(data.to_vec())),
        UpstreamMsg::Close(frame) => Some(ClientMsg::Close(frame.map(|f| CloseFrame {
            code: f.code.into(),
            reason: f.reason.as_str().to_string().into(),
        }))),
        // Raw frames never surface from a configured client.
        UpstreamMsg::Frame(_) => None,
    }
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
