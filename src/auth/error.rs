// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::ErrorResponse;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No `X-User-Id` header present
    MissingUserId,
    /// `X-User-Id` is not an integer
    InvalidUserId,
    /// `X-User-Role` holds an unknown role
    InvalidRole,
    /// Authenticated, but not allowed here
    InsufficientPermissions,
}

impl AuthError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingUserId => "missing_user_id",
            AuthError::InvalidUserId => "invalid_user_id",
            AuthError::InvalidRole => "invalid_role",
            AuthError::InsufficientPermissions => "insufficient_permissions",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingUserId | AuthError::InvalidUserId | AuthError::InvalidRole => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::InsufficientPermissions => StatusCode::FORBIDDEN,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingUserId => write!(f, "Caller identity is required"),
            AuthError::InvalidUserId => write!(f, "Caller user id must be an integer"),
            AuthError::InvalidRole => write!(f, "Caller role is not recognized"),
            AuthError::InsufficientPermissions => {
                write!(f, "Insufficient permissions for this operation")
            }
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
            transfer_id: None,
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn missing_identity_returns_401() {
        let response = AuthError::MissingUserId.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["error_code"], "missing_user_id");
    }

    #[tokio::test]
    async fn insufficient_permissions_returns_403() {
        let response = AuthError::InsufficientPermissions.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
