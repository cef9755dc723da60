// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;
use std::time::Duration;

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use relational_tip_wallet::{
    api::router,
    config::{AppConfig, LogFormat, WalletSettings, DEFAULT_LOG_FILTER},
    reconciler::Reconciler,
    state::AppState,
};

/// Grace period for in-flight requests after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::from_env();
    init_logging(config.log_format);
    for warning in &config.warnings {
        warn!("{warning}");
    }

    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "Failed to install rustls crypto provider")?;

    let state = AppState::from_config(&config);
    let shutdown = CancellationToken::new();

    let reconciler_task = match (&config.wallet, state.wallet()) {
        (WalletSettings::Enabled(wallet_config), Ok(services)) => {
            let reconciler =
                Reconciler::new(services.orchestrator.clone(), wallet_config.reconcile_interval);
            Some(tokio::spawn(reconciler.run(shutdown.clone())))
        }
        _ => None,
    };
    let ledger = state.wallet().ok().map(|services| services.ledger.clone());

    let addr: SocketAddr = config.bind_address().parse()?;
    let app = router(state);

    let handle = Handle::new();
    let signal_handle = handle.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received, draining connections");
        signal_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    let served = match &config.tls {
        Some(tls) => {
            let tls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key).await?;
            info!(%addr, "Relational Tip Wallet listening on https (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
        None => {
            info!(%addr, "Relational Tip Wallet listening on http (docs at /docs)");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
    };

    shutdown.cancel();
    if let Some(task) = reconciler_task {
        if let Err(e) = task.await {
            error!(error = %e, "Reconciler task ended abnormally");
        }
    }
    if let Some(ledger) = ledger {
        ledger.shutdown().await;
    }

    served?;
    info!("Relational Tip Wallet stopped");
    Ok(())
}

/// Initialize tracing with `RUST_LOG` (or the default filter) and the
/// configured output format.
fn init_logging(format: LogFormat) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init(),
    }
}
