// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tip and transfer history endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    auth::Auth,
    error::{ApiError, ErrorResponse},
    state::AppState,
    storage::{Page, TransferRecord, UserId},
};

/// Request to tip another user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TipRequest {
    pub recipient_user_id: UserId,
    /// Amount in whole units, must be positive
    pub amount: Decimal,
    /// Optional note, at most 100 bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Page size (default 20, at most 100)
    pub limit: Option<i64>,
    /// Records to skip (default 0)
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransferListResponse {
    pub transfers: Vec<TransferRecord>,
    pub limit: usize,
    pub offset: usize,
}

/// Send a tip from the caller to another user.
///
/// A `202` answer means the transfer was submitted but not yet confirmed;
/// the returned `transfer_id` stays `pending` until reconciliation resolves it.
#[utoipa::path(
    post,
    path = "/v1/tips",
    tag = "Transfers",
    request_body = TipRequest,
    responses(
        (status = 201, description = "Transfer settled", body = TransferRecord),
        (status = 202, description = "Submitted, outcome pending", body = ErrorResponse),
        (status = 400, description = "Invalid amount, recipient or memo", body = ErrorResponse),
        (status = 404, description = "Sender or recipient has no wallet", body = ErrorResponse),
        (status = 422, description = "Rejected by the ledger", body = ErrorResponse),
        (status = 503, description = "Ledger unavailable", body = ErrorResponse)
    )
)]
pub async fn send_tip(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Json(request): Json<TipRequest>,
) -> Result<(StatusCode, Json<TransferRecord>), ApiError> {
    let record = state
        .wallet()?
        .orchestrator
        .transfer_value(caller.user_id, request.recipient_user_id, request.amount, request.memo)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// List transfers sent or received by the caller, newest first.
#[utoipa::path(
    get,
    path = "/v1/transfers",
    tag = "Transfers",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Transfer history", body = TransferListResponse),
        (status = 401, description = "Missing caller identity", body = ErrorResponse)
    )
)]
pub async fn list_transfers(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<TransferListResponse>, ApiError> {
    let page = Page::new(query.limit, query.offset);
    let transfers = state
        .wallet()?
        .orchestrator
        .transfer_history(caller.user_id, page)?;

    Ok(Json(TransferListResponse {
        transfers,
        limit: page.limit,
        offset: page.offset,
    }))
}

/// Get one transfer. Only its sender, its recipient, or an admin may read it.
#[utoipa::path(
    get,
    path = "/v1/transfers/{transfer_id}",
    tag = "Transfers",
    params(
        ("transfer_id" = Uuid, Path, description = "Transfer identifier")
    ),
    responses(
        (status = 200, description = "Transfer found", body = TransferRecord),
        (status = 404, description = "No such transfer visible to the caller", body = ErrorResponse)
    )
)]
pub async fn get_transfer(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Path(transfer_id): Path<Uuid>,
) -> Result<Json<TransferRecord>, ApiError> {
    let record = state.wallet()?.orchestrator.get_transfer(&transfer_id)?;

    if !caller.is_admin() && !record.involves(caller.user_id) {
        return Err(ApiError::not_found(format!("transfer {transfer_id}")));
    }
    Ok(Json(record))
}
