// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet API endpoints.
//!
//! Each user owns exactly one custodial wallet. Responses never include key
//! material.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::Auth,
    error::{ApiError, ErrorResponse},
    state::AppState,
    storage::{UserId, WalletResponse},
};

/// Live ledger balance of a wallet.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub user_id: UserId,
    pub account_id: String,
    /// Balance in whole units, as reported by the ledger
    pub balance: Decimal,
}

/// Create the caller's wallet.
///
/// Provisions a funded ledger account and stores its sealed signing key.
#[utoipa::path(
    post,
    path = "/v1/wallet",
    tag = "Wallet",
    responses(
        (status = 201, description = "Wallet created", body = WalletResponse),
        (status = 401, description = "Missing caller identity", body = ErrorResponse),
        (status = 409, description = "Caller already has a wallet", body = ErrorResponse),
        (status = 503, description = "Ledger unavailable or wallet feature disabled", body = ErrorResponse)
    )
)]
pub async fn create_wallet(
    Auth(caller): Auth,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<WalletResponse>), ApiError> {
    let wallet = state.wallet()?.directory.create_wallet(caller.user_id).await?;
    Ok((StatusCode::CREATED, Json(wallet.into())))
}

/// Get the caller's wallet with its cached balance.
#[utoipa::path(
    get,
    path = "/v1/wallet",
    tag = "Wallet",
    responses(
        (status = 200, description = "Wallet found", body = WalletResponse),
        (status = 401, description = "Missing caller identity", body = ErrorResponse),
        (status = 404, description = "Caller has no wallet", body = ErrorResponse)
    )
)]
pub async fn get_wallet(
    Auth(caller): Auth,
    State(state): State<AppState>,
) -> Result<Json<WalletResponse>, ApiError> {
    let wallet = state.wallet()?.directory.get_wallet(caller.user_id)?;
    Ok(Json(wallet.into()))
}

/// Get the caller's live balance from the ledger.
#[utoipa::path(
    get,
    path = "/v1/wallet/balance",
    tag = "Wallet",
    responses(
        (status = 200, description = "Current balance", body = BalanceResponse),
        (status = 404, description = "Caller has no wallet", body = ErrorResponse),
        (status = 503, description = "Ledger unavailable", body = ErrorResponse)
    )
)]
pub async fn get_balance(
    Auth(caller): Auth,
    State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, ApiError> {
    live_balance(&state, caller.user_id).await.map(Json)
}

/// Get another user's live balance.
#[utoipa::path(
    get,
    path = "/v1/users/{user_id}/balance",
    tag = "Wallet",
    params(
        ("user_id" = i64, Path, description = "User whose balance to read")
    ),
    responses(
        (status = 200, description = "Current balance", body = BalanceResponse),
        (status = 404, description = "User has no wallet", body = ErrorResponse),
        (status = 503, description = "Ledger unavailable", body = ErrorResponse)
    )
)]
pub async fn get_user_balance(
    Auth(_caller): Auth,
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<BalanceResponse>, ApiError> {
    live_balance(&state, user_id).await.map(Json)
}

async fn live_balance(state: &AppState, user_id: UserId) -> Result<BalanceResponse, ApiError> {
    let directory = &state.wallet()?.directory;
    let wallet = directory.get_wallet(user_id)?;
    let balance = directory.live_balance(user_id).await?;
    Ok(BalanceResponse {
        user_id,
        account_id: wallet.external_account_id,
        balance,
    })
}
