// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The three interactive IDE families Gangway can launch.
//!
//! Everything that differs per IDE but is static per build lives here: job
//! naming, default ports, proxy route prefixes, and the authentication mode
//! the IDE binary speaks. Release-specific details (image paths, library
//! trees) come from configuration instead.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How an IDE authenticates the browser once traffic reaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Token handed over as a query parameter once; the upstream then sets
    /// an auth cookie it checks on every request (editor).
    CookieToken,
    /// No login at all; the upstream is protected only by the proxy (R IDE).
    None,
    /// Token expected as a `token=` query parameter on every request
    /// (notebook).
    QueryToken,
}

/// One of the IDE families known to this build.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IdeKind {
    Editor,
    RStudio,
    Jupyter,
}

impl IdeKind {
    /// All IDE kinds, in a stable order.
    pub const ALL: [IdeKind; 3] = [IdeKind::Editor, IdeKind::RStudio, IdeKind::Jupyter];

    /// Canonical slug used in session keys, job names and API paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdeKind::Editor => "editor",
            IdeKind::RStudio => "rstudio",
            IdeKind::Jupyter => "jupyter",
        }
    }

    /// Port the IDE binary binds when the port finder finds its default free.
    /// The finder scans upward from here.
    pub fn default_port(&self) -> u16 {
        match self {
            IdeKind::Editor => 8080,
            IdeKind::RStudio => 8787,
            IdeKind::Jupyter => 8888,
        }
    }

    /// Public route prefix the proxy serves this IDE under.
    pub fn route_prefix(&self) -> &'static str {
        match self {
            IdeKind::Editor => "/code",
            IdeKind::RStudio => "/rstudio",
            IdeKind::Jupyter => "/jupyter",
        }
    }

    /// Iframe-root twin of [`route_prefix`](Self::route_prefix).
    pub fn direct_prefix(&self) -> &'static str {
        match self {
            IdeKind::Editor => "/code-direct",
            IdeKind::RStudio => "/rstudio-direct",
            IdeKind::Jupyter => "/jupyter-direct",
        }
    }

    /// Base path the upstream binary is configured to serve under. The
    /// notebook's internal base differs from its public prefix; the proxy
    /// rewrites between the two.
    pub fn internal_base(&self) -> &'static str {
        match self {
            IdeKind::Editor => "/code",
            IdeKind::RStudio => "/rstudio",
            IdeKind::Jupyter => "/notebook",
        }
    }

    pub fn auth_mode(&self) -> AuthMode {
        match self {
            IdeKind::Editor => AuthMode::CookieToken,
            IdeKind::RStudio => AuthMode::None,
            IdeKind::Jupyter => AuthMode::QueryToken,
        }
    }

    /// Scheduler job name for this IDE and user, e.g. `editor-alice`.
    pub fn job_name(&self, user: &str) -> String {
        format!("{}-{}", self.as_str(), user)
    }

    /// Reverse of [`job_name`](Self::job_name): recover the IDE kind and the
    /// user from a queue row's name column.
    pub fn parse_job_name(name: &str) -> Option<(IdeKind, &str)> {
        let (slug, user) = name.split_once('-')?;
        let kind = IdeKind::from_str(slug).ok()?;
        if user.is_empty() {
            return None;
        }
        Some((kind, user))
    }
}

impl fmt::Display for IdeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognized IDE slug.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown ide: {0}")]
pub struct UnknownIde(pub String);

impl FromStr for IdeKind {
    type Err = UnknownIde;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "editor" | "code" => Ok(IdeKind::Editor),
            "rstudio" => Ok(IdeKind::RStudio),
            "jupyter" | "notebook" => Ok(IdeKind::Jupyter),
            other => Err(UnknownIde(other.to_string())),
        }
    }
}

#[cfg(test)]
#[path = "ide_tests.rs"]
mod tests;
