// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job script assembly.
//!
//! The script crosses two quoting contexts: once as a single-quoted `--wrap`
//! argument inside the command line sent over the remote shell, then again
//! as the shell text the scheduler runs on the compute node. The rule that
//! keeps this sane: every embedded asset (helper scripts, config files) is
//! base64-encoded here and decoded on the node; the outer line contains only
//! command words, double-quoted `$NAME` references that must expand on the
//! node, and base64 blobs. Single quotes and `${` never appear in the outer
//! line; the builder refuses to emit them.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use gw_core::IdeKind;
use thiserror::Error;

/// How many ports the finder scans upward from the IDE default.
const PORT_SCAN_WINDOW: u16 = 100;

/// Everything the builder needs for one job script.
#[derive(Debug, Clone)]
pub struct ScriptSpec {
    pub ide: IdeKind,
    pub cpus: u32,
    /// Resolved container image path for the chosen release.
    pub image: String,
    /// Release-specific shared library tree (`R_LIBS_SITE` / `PYTHONPATH`).
    pub library_tree: Option<String>,
    /// Bind mounts, `host[:container]` notation.
    pub binds: Vec<String>,
    /// Session auth token; required for token-authenticated IDEs.
    pub token: Option<String>,
    /// Request accelerator passthrough.
    pub gpu: bool,
}

/// Errors from script assembly.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("script would contain forbidden sequence {0:?}")]
    Forbidden(&'static str),
    #[error("{0} requires a session token")]
    MissingToken(IdeKind),
}

/// Build the single-line job script for `spec`.
pub fn build_script(spec: &ScriptSpec) -> Result<String, ScriptError> {
    if spec.token.is_none() && !matches!(spec.ide, IdeKind::RStudio) {
        return Err(ScriptError::MissingToken(spec.ide));
    }

    let mut parts: Vec<String> = Vec::new();
    parts.push("mkdir -p \"$HOME/.gangway\"".to_string());

    // The port finder is always the first asset: everything after it can
    // rely on IDE_PORT.
    parts.push(frame_sourced(&port_finder_asset(spec.ide), &format!("portfind-{}", spec.ide)));

    match spec.ide {
        IdeKind::Editor => {
            parts.push(frame_file(
                EDITOR_DEFAULT_SETTINGS,
                "editor-settings.default.json",
            ));
            parts.push(frame_sourced(EDITOR_SETUP, "editor-setup"));
        }
        IdeKind::RStudio => {
            parts.push(frame_sourced(RSTUDIO_KEY_SETUP, "rstudio-key-setup"));
        }
        IdeKind::Jupyter => {}
    }

    parts.push(thread_pins(spec.cpus));
    match (&spec.library_tree, spec.ide) {
        (Some(tree), IdeKind::RStudio) => parts.push(format!("export R_LIBS_SITE={tree}")),
        (Some(tree), IdeKind::Jupyter) => parts.push(format!("export PYTHONPATH={tree}")),
        _ => {}
    }
    if let (Some(token), IdeKind::Editor) = (&spec.token, spec.ide) {
        parts.push(format!("export GW_TOKEN={token}"));
    }

    parts.push(exec_line(spec));

    let script = parts.join(" && ");
    validate_outer(&script)?;
    Ok(script)
}

/// The outer line must survive single-quote wrapping and must not expand on
/// the originating host.
fn validate_outer(script: &str) -> Result<(), ScriptError> {
    if script.contains('\'') {
        return Err(ScriptError::Forbidden("'"));
    }
    if script.contains("${") {
        return Err(ScriptError::Forbidden("${"));
    }
    if script.contains('\n') {
        return Err(ScriptError::Forbidden("\\n"));
    }
    Ok(())
}

/// Decode an asset to a file under `$HOME/.gangway/`.
fn frame_file(asset: &str, name: &str) -> String {
    format!(
        "printf %s {} | base64 -d > \"$HOME/.gangway/{name}\"",
        B64.encode(asset)
    )
}

/// Decode an asset and source it, so variables it exports reach the rest of
/// the script.
fn frame_sourced(asset: &str, name: &str) -> String {
    format!(
        "printf %s {b64} | base64 -d > \"$HOME/.gangway/{name}.sh\" && . \"$HOME/.gangway/{name}.sh\"",
        b64 = B64.encode(asset)
    )
}

/// Shell snippet that scans for a free port from the IDE default upward and
/// records the winner. Runs on the compute node, so localised collisions are
/// its only concern.
fn port_finder_asset(ide: IdeKind) -> String {
    let start = ide.default_port();
    let limit = start + PORT_SCAN_WINDOW;
    format!(
        r#"port={start}
limit={limit}
used=$(ss -Htan 2>/dev/null | awk '{{print $4}}')
while [ "$port" -lt "$limit" ]; do
    printf '%s\n' "$used" | grep -q ":$port$" || break
    port=$((port+1))
done
printf '%s' "$port" > "$HOME/.gangway/port-{ide}"
IDE_PORT=$port
export IDE_PORT
"#,
        start = start,
        limit = limit,
        ide = ide,
    )
}

/// Seed editor settings on first launch only.
const EDITOR_SETUP: &str = r#"dir="$HOME/.gangway/editor/User"
mkdir -p "$dir"
if [ ! -f "$dir/settings.json" ]; then
    cp "$HOME/.gangway/editor-settings.default.json" "$dir/settings.json"
fi
"#;

const EDITOR_DEFAULT_SETTINGS: &str = r#"{
    "workbench.startupEditor": "none",
    "telemetry.telemetryLevel": "off",
    "update.mode": "none"
}
"#;

/// Per-session secure-cookie key, named by port so two simultaneous sessions
/// for one user never race on the same file.
const RSTUDIO_KEY_SETUP: &str = r#"dir="$HOME/.gangway/rstudio"
mkdir -p "$dir"
keyfile="$dir/key-$IDE_PORT"
cat /proc/sys/kernel/random/uuid > "$keyfile"
chmod 600 "$keyfile"
RS_KEY_FILE=$keyfile
export RS_KEY_FILE
"#;

/// BLAS/OpenMP pools sized to the cpu request, not the node.
fn thread_pins(cpus: u32) -> String {
    format!(
        "export OMP_NUM_THREADS={cpus} MKL_NUM_THREADS={cpus} OPENBLAS_NUM_THREADS={cpus} NUMEXPR_NUM_THREADS={cpus}"
    )
}

fn exec_line(spec: &ScriptSpec) -> String {
    let mut cmd = String::from("exec singularity exec");
    if spec.gpu {
        cmd.push_str(" --nv");
    }
    for bind in &spec.binds {
        cmd.push_str(&format!(" --bind {bind}"));
    }
    cmd.push(' ');
    cmd.push_str(&spec.image);

    match spec.ide {
        IdeKind::Editor => {
            cmd.push_str(
                " code serve-web --host 0.0.0.0 --port \"$IDE_PORT\" \
                 --connection-token \"$GW_TOKEN\" --server-base-path /code \
                 --server-data-dir \"$HOME/.gangway/editor\" --accept-server-license-terms",
            );
        }
        IdeKind::RStudio => {
            cmd.push_str(
                " rserver --www-address 0.0.0.0 --www-port \"$IDE_PORT\" \
                 --www-root-path /rstudio --www-frame-origin any --auth-none 1 \
                 --secure-cookie-key-file \"$RS_KEY_FILE\" --server-daemonize 0",
            );
        }
        IdeKind::Jupyter => {
            let token = spec.token.as_deref().unwrap_or_default();
            cmd.push_str(&format!(
                " jupyter lab --no-browser --ip 0.0.0.0 --port \"$IDE_PORT\" \
                 --ServerApp.base_url=/notebook --IdentityProvider.token={token} \
                 --ServerApp.allow_remote_access=True"
            ));
        }
    }
    cmd
}

#[cfg(test)]
#[path = "script_tests.rs"]
mod tests;
