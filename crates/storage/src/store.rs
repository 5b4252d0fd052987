// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session store: ordered map + atomic-rename snapshot file.

use chrono::{DateTime, Utc};
use gw_core::{IdeKind, Session, SessionKey, SessionStatus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Current state file schema version
pub const CURRENT_STATE_VERSION: u32 = 1;

/// Errors from state persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported state file version {0}")]
    UnsupportedVersion(u32),
}

/// On-disk shape: a versioned envelope around the session list.
#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    #[serde(rename = "v")]
    version: u32,
    sessions: Vec<Session>,
}

/// Outcome of an atomic reserve-by-key.
#[derive(Debug)]
pub enum Reservation {
    /// No active session held the key; the new record is in and persisted.
    Created,
    /// An active session already holds the key.
    Conflict(Session),
}

/// Durable ordered mapping of session key → session record.
///
/// Writes are serialised by the inner mutex and hit the disk before the
/// mutating call returns. Reads clone; callers never hold references into
/// the map.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    retention: Duration,
    inner: Mutex<BTreeMap<SessionKey, Session>>,
}

impl StateStore {
    /// Load the store from `path`, creating the parent directory if needed.
    ///
    /// A missing file is an empty store. A present-but-corrupt file is an
    /// error; the caller decides whether that is fatal. Terminal records
    /// older than `retention` are dropped during load.
    pub fn open(path: impl Into<PathBuf>, retention: Duration, now: DateTime<Utc>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut map = BTreeMap::new();
        if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let file: StateFile = serde_json::from_str(&raw)?;
            if file.version > CURRENT_STATE_VERSION {
                return Err(StoreError::UnsupportedVersion(file.version));
            }
            let total = file.sessions.len();
            for session in file.sessions {
                if is_expired(&session, retention, now) {
                    continue;
                }
                map.insert(session.key.clone(), session);
            }
            info!(
                loaded = map.len(),
                pruned = total - map.len(),
                path = %path.display(),
                "state store loaded"
            );
        }

        Ok(Self { path, retention, inner: Mutex::new(map) })
    }

    pub fn get(&self, key: &SessionKey) -> Option<Session> {
        self.inner.lock().get(key).cloned()
    }

    /// All records, in key order.
    pub fn snapshot(&self) -> Vec<Session> {
        self.inner.lock().values().cloned().collect()
    }

    /// All pending/running records, in key order.
    pub fn active_sessions(&self) -> Vec<Session> {
        self.inner.lock().values().filter(|s| s.is_active()).cloned().collect()
    }

    /// Distinct users with at least one active session.
    pub fn active_users(&self) -> Vec<String> {
        let map = self.inner.lock();
        let mut users: Vec<String> =
            map.values().filter(|s| s.is_active()).map(|s| s.key.user.clone()).collect();
        users.dedup();
        users
    }

    /// Active sessions for one user.
    pub fn active_for_user(&self, user: &str) -> Vec<Session> {
        self.inner
            .lock()
            .values()
            .filter(|s| s.is_active() && s.key.user == user)
            .cloned()
            .collect()
    }

    /// The running session serving `user`'s `ide` traffic, if any. With
    /// several clusters the most recently started wins.
    pub fn find_running(&self, user: &str, ide: IdeKind) -> Option<Session> {
        self.inner
            .lock()
            .values()
            .filter(|s| {
                s.status == SessionStatus::Running && s.key.user == user && s.key.ide == ide
            })
            .max_by_key(|s| s.started_at)
            .cloned()
    }

    /// Atomically insert a new session unless an active one holds the key.
    pub fn reserve(&self, session: Session) -> Result<Reservation, StoreError> {
        let mut map = self.inner.lock();
        if let Some(existing) = map.get(&session.key) {
            if existing.is_active() {
                return Ok(Reservation::Conflict(existing.clone()));
            }
        }
        map.insert(session.key.clone(), session);
        self.persist_locked(&map)?;
        Ok(Reservation::Created)
    }

    /// Insert or replace a record and persist.
    pub fn upsert(&self, session: Session) -> Result<(), StoreError> {
        let mut map = self.inner.lock();
        map.insert(session.key.clone(), session);
        self.persist_locked(&map)
    }

    /// Mutate a record in place and persist. Returns the updated record, or
    /// None if the key is absent.
    pub fn update<F>(&self, key: &SessionKey, f: F) -> Result<Option<Session>, StoreError>
    where
        F: FnOnce(&mut Session),
    {
        let mut map = self.inner.lock();
        let updated = match map.get_mut(key) {
            Some(session) => {
                f(session);
                Some(session.clone())
            }
            None => None,
        };
        if updated.is_some() {
            self.persist_locked(&map)?;
        }
        Ok(updated)
    }

    pub fn remove(&self, key: &SessionKey) -> Result<Option<Session>, StoreError> {
        let mut map = self.inner.lock();
        let removed = map.remove(key);
        if removed.is_some() {
            self.persist_locked(&map)?;
        }
        Ok(removed)
    }

    /// Drop terminal records that have aged out of retention.
    pub fn prune(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut map = self.inner.lock();
        let before = map.len();
        map.retain(|_, s| !is_expired(s, self.retention, now));
        let pruned = before - map.len();
        if pruned > 0 {
            self.persist_locked(&map)?;
        }
        Ok(pruned)
    }

    /// Write the full map to a temp file, fsync, and rename over the real
    /// path. A partial write never touches the readable copy.
    fn persist_locked(&self, map: &BTreeMap<SessionKey, Session>) -> Result<(), StoreError> {
        let file = StateFile {
            version: CURRENT_STATE_VERSION,
            sessions: map.values().cloned().collect(),
        };
        let json = serde_json::to_string(&file)?;

        let tmp = tmp_path(&self.path);
        {
            let mut out = File::create(&tmp)?;
            out.write_all(json.as_bytes())?;
            out.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            warn!(path = %self.path.display(), "state rename failed: {e}");
            return Err(e.into());
        }
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn is_expired(session: &Session, retention: Duration, now: DateTime<Utc>) -> bool {
    if !session.status.is_terminal() {
        return false;
    }
    let Some(ended_at) = session.ended_at else {
        return false;
    };
    match (now - ended_at).to_std() {
        Ok(age) => age > retention,
        Err(_) => false, // ended in the future: clock skew, keep it
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
