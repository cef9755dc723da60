// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transfer Reconciler
//!
//! Background task that resolves pending transfer records against the ledger.
//! A transfer stays `pending` when its broadcast timed out or the process
//! stopped before the outcome was persisted; each sweep looks the submission
//! up and moves the record to `success` or `failed` once the ledger knows.
//!
//! ## Shutdown
//!
//! Stops on a `tokio_util::sync::CancellationToken` between sweeps.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::wallet::TransferOrchestrator;

/// Default interval between reconciliation sweeps.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(60);

pub struct Reconciler {
    orchestrator: TransferOrchestrator,
    interval: Duration,
}

impl Reconciler {
    pub fn new(orchestrator: TransferOrchestrator, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    /// Run sweeps until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(reconciler.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Transfer reconciler starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Transfer reconciler shutting down");
                return;
            }

            self.sweep().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Transfer reconciler shutting down");
                    return;
                }
            }
        }
    }

    async fn sweep(&self) {
        if let Err(e) = self.orchestrator.reconcile_pending().await {
            warn!(error = %e, "Reconciliation sweep failed");
        }
    }
}
