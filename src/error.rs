// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::wallet::WalletError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    /// Set when a transfer was submitted but its outcome is still open.
    pub transfer_id: Option<Uuid>,
}

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<Uuid>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            transfer_id: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Internal server error",
        )
    }
}

impl From<WalletError> for ApiError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::Validation(msg) => Self::bad_request(msg),
            WalletError::NotFound(msg) => Self::not_found(msg),
            WalletError::AccountNotFound(_) => Self::new(
                StatusCode::NOT_FOUND,
                "account_not_found",
                "Ledger account not found",
            ),
            WalletError::AlreadyExists(msg) => Self::new(StatusCode::CONFLICT, "already_exists", msg),
            WalletError::TransferRejected(reason) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "transfer_rejected",
                format!("Transfer rejected: {reason}"),
            ),
            WalletError::TimedOut { transfer_id } => Self {
                transfer_id: Some(transfer_id),
                ..Self::new(
                    StatusCode::ACCEPTED,
                    "transfer_pending",
                    "Transfer submitted; confirmation is pending",
                )
            },
            WalletError::LedgerUnavailable(_) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "ledger_unavailable",
                "Ledger is temporarily unavailable, retry later",
            ),
            WalletError::FeatureDisabled => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "feature_disabled",
                "Wallet feature is disabled",
            ),
            WalletError::KeyCorrupted(_)
            | WalletError::Configuration(_)
            | WalletError::Storage(_)
            | WalletError::Internal(_) => Self::internal(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
            error_code: self.code.to_string(),
            transfer_id: self.transfer_id,
        });
        (self.status, body).into_response()
    }
}
