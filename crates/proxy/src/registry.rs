// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The proxy registry: one handle per running session.

use crate::activity::ActivityTracker;
use crate::rewrite::{
    EditorRewriter, JupyterRewriter, PassthroughRewriter, RStudioRewriter, Rewrite,
};
use gw_core::{IdeKind, SessionKey};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from proxy creation.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("{ide} sessions need a token to proxy")]
    MissingToken { ide: IdeKind },
}

/// One live reverse proxy: target, vtable, client, activity callback.
/// Safe for concurrent serve calls.
pub struct ProxyHandle {
    pub key: SessionKey,
    pub target: SocketAddr,
    pub(crate) rewriter: Box<dyn Rewrite>,
    pub(crate) client: reqwest::Client,
    pub(crate) activity: ActivityTracker,
}

impl std::fmt::Debug for ProxyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyHandle")
            .field("key", &self.key)
            .field("target", &self.target)
            .finish()
    }
}

impl ProxyHandle {
    pub(crate) fn touch(&self) {
        self.activity.touch(&self.key);
    }
}

/// Owns every live [`ProxyHandle`], keyed like sessions. Handles are created
/// lazily when traffic first needs them and invalidated on session end.
pub struct ProxyRegistry {
    handles: Mutex<HashMap<SessionKey, Arc<ProxyHandle>>>,
    activity: ActivityTracker,
    /// Public hostname of this control plane, for Location rewrites.
    external_host: Option<String>,
}

impl ProxyRegistry {
    pub fn new(activity: ActivityTracker, external_host: Option<String>) -> Self {
        Self { handles: Mutex::new(HashMap::new()), activity, external_host }
    }

    pub fn get(&self, key: &SessionKey) -> Option<Arc<ProxyHandle>> {
        self.handles.lock().get(key).cloned()
    }

    /// Create (or return the existing) handle for a running session.
    pub fn ensure(
        &self,
        key: &SessionKey,
        local_port: u16,
        token: Option<&str>,
    ) -> Result<Arc<ProxyHandle>, ProxyError> {
        if let Some(handle) = self.get(key) {
            return Ok(handle);
        }

        let target = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), local_port);
        let rewriter: Box<dyn Rewrite> = match key.ide {
            IdeKind::Editor => {
                let token = token.ok_or(ProxyError::MissingToken { ide: key.ide })?;
                Box::new(EditorRewriter::new(token, key.ide.route_prefix()))
            }
            IdeKind::RStudio => Box::new(RStudioRewriter::new(
                key.ide.route_prefix(),
                target.to_string(),
                self.external_host.clone(),
            )),
            IdeKind::Jupyter => {
                let token = token.ok_or(ProxyError::MissingToken { ide: key.ide })?;
                Box::new(JupyterRewriter::new(
                    token,
                    key.ide.route_prefix(),
                    key.ide.internal_base(),
                ))
            }
        };

        let handle = Arc::new(ProxyHandle {
            key: key.clone(),
            target,
            rewriter,
            client: build_client(key.ide)?,
            activity: self.activity.clone(),
        });
        self.handles.lock().insert(key.clone(), Arc::clone(&handle));
        info!(session = %key, %target, "proxy bound");
        Ok(handle)
    }

    /// Raw passthrough proxy for a user dev server on the compute node.
    /// Not registered: these are cheap and follow the session's lifetime via
    /// the tunnel, not the registry.
    pub fn passthrough(
        &self,
        key: &SessionKey,
        local_port: u16,
    ) -> Result<Arc<ProxyHandle>, ProxyError> {
        Ok(Arc::new(ProxyHandle {
            key: key.clone(),
            target: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), local_port),
            rewriter: Box::new(PassthroughRewriter),
            client: build_client(key.ide)?,
            activity: self.activity.clone(),
        }))
    }

    /// Invalidate a session's proxy. Idempotent.
    pub fn release(&self, key: &SessionKey) -> bool {
        let removed = self.handles.lock().remove(key).is_some();
        if removed {
            self.activity.remove(key);
            debug!(session = %key, "proxy released");
        }
        removed
    }

    pub fn active_count(&self) -> usize {
        self.handles.lock().len()
    }
}

/// Per-IDE client tuning. The R IDE long-polls with `Connection: close`;
/// connection reuse there turns into body-after-close errors, so its pool
/// keeps no idle connections.
fn build_client(ide: IdeKind) -> Result<reqwest::Client, ProxyError> {
    let mut builder = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(Duration::from_secs(5));
    if ide == IdeKind::RStudio {
        builder = builder.pool_max_idle_per_host(0);
    }
    builder.build().map_err(ProxyError::Client)
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
