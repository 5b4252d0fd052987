// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! gwd, the Gangway control-plane daemon.
//!
//! Exit codes: 0 after a clean SIGTERM drain, 1 on unrecoverable startup.

use gw_daemon::http::{router, AppState};
use gw_daemon::{startup, Config};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config_path = Config::default_path();
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("gwd: {e}");
            std::process::exit(1);
        }
    };

    // Logging: env-filtered stdout plus a daily file in the state dir. The
    // guard must outlive main so the last lines flush on exit.
    let _log_guard = match init_tracing(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("gwd: logging setup failed: {e}");
            std::process::exit(1);
        }
    };

    // Fail-fast startup: no degraded mode.
    let (daemon, listener) = match startup(config).await {
        Ok(started) => started,
        Err(e) => {
            error!("startup failed: {e}");
            std::process::exit(1);
        }
    };

    let state = AppState { engine: daemon.engine.clone(), config: daemon.config.clone() };
    let app = router(state);

    let signal_token = daemon.shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received; draining");
        signal_token.cancel();
    });

    let drain_token = daemon.shutdown.clone();
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(drain_token.cancelled_owned())
        .await
    {
        error!("server error: {e}");
        std::process::exit(1);
    }

    daemon.drain().await;
    info!("clean shutdown");
}

async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            error!("cannot install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = term.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}

fn init_tracing(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, gw_daemon::LifecycleError> {
    let state_dir = config.state_dir()?;
    std::fs::create_dir_all(state_dir.join("logs"))?;
    let appender = tracing_appender::rolling::daily(state_dir.join("logs"), "gwd.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_env("GW_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();
    Ok(guard)
}
