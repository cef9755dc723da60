// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin-only API endpoints for operating the wallet subsystem.
//!
//! These endpoints require the Admin role and provide:
//! - On-demand reconciliation of pending transfers
//! - Wallet backfill for users registered before wallets existed
//! - Cached balance resynchronization

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AdminOnly,
    error::{ApiError, ErrorResponse},
    state::AppState,
    storage::{TransferRecord, UserId},
    wallet::{BackfillSummary, ReconcileSummary, SyncSummary},
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BackfillRequest {
    /// Users to provision wallets for; those with a wallet are skipped.
    pub user_ids: Vec<UserId>,
}

/// Resolve every pending transfer against the ledger now.
#[utoipa::path(
    post,
    path = "/v1/admin/reconcile",
    tag = "Admin",
    responses(
        (status = 200, description = "Reconciliation pass result", body = ReconcileSummary),
        (status = 403, description = "Admin role required", body = ErrorResponse)
    )
)]
pub async fn reconcile_pending(
    AdminOnly(caller): AdminOnly,
    State(state): State<AppState>,
) -> Result<Json<ReconcileSummary>, ApiError> {
    tracing::info!(admin_id = caller.user_id, "Manual reconciliation requested");
    let summary = state.wallet()?.orchestrator.reconcile_pending().await?;
    Ok(Json(summary))
}

/// Resolve a single transfer against the ledger.
#[utoipa::path(
    post,
    path = "/v1/admin/transfers/{transfer_id}/reconcile",
    tag = "Admin",
    params(
        ("transfer_id" = Uuid, Path, description = "Transfer identifier")
    ),
    responses(
        (status = 200, description = "Transfer after reconciliation", body = TransferRecord),
        (status = 403, description = "Admin role required", body = ErrorResponse),
        (status = 404, description = "Transfer not found", body = ErrorResponse)
    )
)]
pub async fn reconcile_transfer(
    AdminOnly(caller): AdminOnly,
    State(state): State<AppState>,
    Path(transfer_id): Path<Uuid>,
) -> Result<Json<TransferRecord>, ApiError> {
    tracing::info!(admin_id = caller.user_id, transfer_id = %transfer_id, "Transfer reconciliation requested");
    let record = state
        .wallet()?
        .orchestrator
        .reconcile_transfer(&transfer_id)
        .await?;
    Ok(Json(record))
}

/// Create wallets for the listed users.
#[utoipa::path(
    post,
    path = "/v1/admin/wallets/backfill",
    tag = "Admin",
    request_body = BackfillRequest,
    responses(
        (status = 200, description = "Per-user backfill result", body = BackfillSummary),
        (status = 403, description = "Admin role required", body = ErrorResponse)
    )
)]
pub async fn backfill_wallets(
    AdminOnly(caller): AdminOnly,
    State(state): State<AppState>,
    Json(request): Json<BackfillRequest>,
) -> Result<Json<BackfillSummary>, ApiError> {
    tracing::info!(
        admin_id = caller.user_id,
        users = request.user_ids.len(),
        "Wallet backfill requested"
    );
    let summary = state.wallet()?.directory.backfill(&request.user_ids).await;
    Ok(Json(summary))
}

/// Refresh every wallet's cached balance from the ledger.
#[utoipa::path(
    post,
    path = "/v1/admin/wallets/sync-balances",
    tag = "Admin",
    responses(
        (status = 200, description = "Sync result", body = SyncSummary),
        (status = 403, description = "Admin role required", body = ErrorResponse)
    )
)]
pub async fn sync_balances(
    AdminOnly(caller): AdminOnly,
    State(state): State<AppState>,
) -> Result<Json<SyncSummary>, ApiError> {
    tracing::info!(admin_id = caller.user_id, "Balance sync requested");
    let summary = state.wallet()?.directory.sync_balances().await?;
    Ok(Json(summary))
}
