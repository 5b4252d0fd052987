// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `POST /stop/:cluster/:ide` and `POST /logout`.

use super::{AppState, Principal};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use gw_core::{EndReason, IdeKind, SessionKey};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopBody {
    #[serde(default)]
    pub cancel_job: bool,
}

pub async fn stop_session(
    State(state): State<AppState>,
    Principal(user): Principal,
    Path((cluster, ide)): Path<(String, String)>,
    body: Option<Json<StopBody>>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let ide: IdeKind = ide
        .parse()
        .map_err(|_| (StatusCode::NOT_FOUND, format!("unknown ide {ide:?}")))?;
    let cancel_job = body.map(|Json(b)| b.cancel_job).unwrap_or(false);

    let key = SessionKey::new(&user, &cluster, ide);
    state
        .engine
        .stop(&key, cancel_job, EndReason::User)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(json!({ "ok": true })))
}

/// Logout hook from the auth layer. With `revoke_on_logout` (the default)
/// every active session the user holds is stopped and its job cancelled;
/// otherwise sessions ride on and only the browser's credentials die.
pub async fn logout(
    State(state): State<AppState>,
    Principal(user): Principal,
) -> Json<Value> {
    if state.config.revoke_on_logout {
        let sessions = state.engine.store().active_for_user(&user);
        info!(%user, count = sessions.len(), "revoking sessions on logout");
        for session in sessions {
            let _ = state.engine.stop(&session.key, true, EndReason::User).await;
        }
    }
    Json(json!({ "ok": true }))
}
