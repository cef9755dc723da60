// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::Request,
    http::HeaderName,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    error::ErrorResponse,
    state::AppState,
    storage::{TransferRecord, TransferStatus, WalletResponse},
    wallet::{BackfillFailure, BackfillSummary, ReconcileSummary, SyncSummary},
};

pub mod admin;
pub mod health;
pub mod transfers;
pub mod wallets;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route(
            "/wallet",
            get(wallets::get_wallet).post(wallets::create_wallet),
        )
        .route("/wallet/balance", get(wallets::get_balance))
        .route("/users/{user_id}/balance", get(wallets::get_user_balance))
        .route("/tips", post(transfers::send_tip))
        .route("/transfers", get(transfers::list_transfers))
        .route("/transfers/{transfer_id}", get(transfers::get_transfer))
        .route("/admin/reconcile", post(admin::reconcile_pending))
        .route(
            "/admin/transfers/{transfer_id}/reconcile",
            post(admin::reconcile_transfer),
        )
        .route("/admin/wallets/backfill", post(admin::backfill_wallets))
        .route("/admin/wallets/sync-balances", post(admin::sync_balances));

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
                    let request_id = request
                        .headers()
                        .get(REQUEST_ID_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id,
                    )
                }))
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        wallets::create_wallet,
        wallets::get_wallet,
        wallets::get_balance,
        wallets::get_user_balance,
        transfers::send_tip,
        transfers::list_transfers,
        transfers::get_transfer,
        admin::reconcile_pending,
        admin::reconcile_transfer,
        admin::backfill_wallets,
        admin::sync_balances
    ),
    components(
        schemas(
            ErrorResponse,
            WalletResponse,
            wallets::BalanceResponse,
            TransferRecord,
            TransferStatus,
            transfers::TipRequest,
            transfers::TransferListResponse,
            admin::BackfillRequest,
            BackfillSummary,
            BackfillFailure,
            SyncSummary,
            ReconcileSummary,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Wallet", description = "Custodial wallet provisioning and balances"),
        (name = "Transfers", description = "Tips and transfer history"),
        (name = "Admin", description = "Reconciliation and maintenance")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::BroadcastFault;
    use crate::state::test_support::enabled_state;
    use axum::{body::Body, http::StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        caller: Option<(i64, &str)>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = axum::http::Request::builder().method(method).uri(uri);
        if let Some((user_id, role)) = caller {
            request = request
                .header("x-user-id", user_id.to_string())
                .header("x-user-role", role);
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    fn user(id: i64) -> Option<(i64, &'static str)> {
        Some((id, "user"))
    }

    fn admin(id: i64) -> Option<(i64, &'static str)> {
        Some((id, "admin"))
    }

    #[tokio::test]
    async fn openapi_document_lists_the_routes() {
        let (state, _ledger, _dir) = enabled_state();
        let app = router(state);

        let (status, body) = send(&app, "GET", "/api-doc/openapi.json", None, None).await;
        assert_eq!(status, StatusCode::OK);
        for path in ["/v1/tips", "/v1/transfers/{transfer_id}", "/v1/admin/reconcile", "/health/ready"] {
            assert!(body["paths"].get(path).is_some(), "missing {path}");
        }
    }

    #[tokio::test]
    async fn disabled_wallet_answers_feature_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(AppState::disabled("no operator key", dir.path().to_path_buf()));

        let (status, body) = send(&app, "GET", "/v1/wallet", user(1), None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error_code"], "feature_disabled");

        let (status, body) = send(&app, "GET", "/health/ready", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["ledger"], "disabled");
        assert_eq!(body["checks"]["reason"], "no operator key");
    }

    #[tokio::test]
    async fn health_reports_enabled_ledger() {
        let (state, _ledger, _dir) = enabled_state();
        let app = router(state);

        let (status, body) = send(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["ledger"], "enabled");
        assert_eq!(body["checks"]["network"], "In-memory ledger");

        let (status, _) = send(&app, "GET", "/health/live", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn responses_carry_a_request_id() {
        let (state, _ledger, _dir) = enabled_state();
        let response = router(state)
            .oneshot(axum::http::Request::builder().uri("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn wallet_routes_require_identity() {
        let (state, _ledger, _dir) = enabled_state();
        let app = router(state);

        let (status, body) = send(&app, "POST", "/v1/wallet", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "missing_user_id");
    }

    #[tokio::test]
    async fn create_get_and_duplicate_wallet() {
        let (state, _ledger, _dir) = enabled_state();
        let app = router(state);

        let (status, created) = send(&app, "POST", "/v1/wallet", user(1), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(created.get("encrypted_private_key").is_none());

        let (status, fetched) = send(&app, "GET", "/v1/wallet", user(1), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["account_id"], created["account_id"]);

        let (status, body) = send(&app, "POST", "/v1/wallet", user(1), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error_code"], "already_exists");

        let (status, _) = send(&app, "GET", "/v1/users/2/balance", user(1), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn tip_is_visible_to_participants_only() {
        let (state, _ledger, _dir) = enabled_state();
        let app = router(state);
        for id in [1, 2] {
            send(&app, "POST", "/v1/wallet", user(id), None).await;
        }

        let tip = json!({"recipient_user_id": 2, "amount": "2", "memo": "thanks"});
        let (status, record) = send(&app, "POST", "/v1/tips", user(1), Some(tip)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(record["status"], "success");
        let transfer_uri = format!("/v1/transfers/{}", record["id"].as_str().unwrap());

        let (status, history) = send(&app, "GET", "/v1/transfers?limit=500", user(2), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history["limit"], 100);
        assert_eq!(history["transfers"][0]["id"], record["id"]);

        let (status, _) = send(&app, "GET", &transfer_uri, user(2), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, "GET", &transfer_uri, user(3), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "GET", &transfer_uri, admin(3), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn invalid_tip_is_bad_request() {
        let (state, ledger, _dir) = enabled_state();
        let app = router(state);
        for id in [1, 2] {
            send(&app, "POST", "/v1/wallet", user(id), None).await;
        }
        let before = ledger.calls().total();

        let tip = json!({"recipient_user_id": 2, "amount": "0"});
        let (status, body) = send(&app, "POST", "/v1/tips", user(1), Some(tip)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_code"], "validation_error");
        assert_eq!(ledger.calls().total(), before);
    }

    #[tokio::test]
    async fn timed_out_tip_is_accepted_then_reconciled_by_admin() {
        let (state, ledger, _dir) = enabled_state();
        let app = router(state);
        for id in [1, 2] {
            send(&app, "POST", "/v1/wallet", user(id), None).await;
        }

        ledger.fail_next_broadcast(BroadcastFault::TimeoutAfterApply);
        let tip = json!({"recipient_user_id": 2, "amount": "1"});
        let (status, body) = send(&app, "POST", "/v1/tips", user(1), Some(tip)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let transfer_id = body["transfer_id"].as_str().unwrap().to_string();

        let (status, _) = send(&app, "POST", "/v1/admin/reconcile", user(9), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, summary) = send(&app, "POST", "/v1/admin/reconcile", admin(9), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["settled"], 1);

        let uri = format!("/v1/admin/transfers/{transfer_id}/reconcile");
        let (status, record) = send(&app, "POST", &uri, admin(9), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["status"], "success");
    }

    #[tokio::test]
    async fn admin_backfill_and_sync() {
        let (state, _ledger, _dir) = enabled_state();
        let app = router(state);
        send(&app, "POST", "/v1/wallet", user(1), None).await;

        let (status, summary) = send(
            &app,
            "POST",
            "/v1/admin/wallets/backfill",
            admin(9),
            Some(json!({"user_ids": [1, 2, 3]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["created"], json!([2, 3]));
        assert_eq!(summary["skipped"], json!([1]));

        let (status, summary) =
            send(&app, "POST", "/v1/admin/wallets/sync-balances", admin(9), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["updated"], 3);
    }
}
