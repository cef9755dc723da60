// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet directory: provisioning and balance bookkeeping.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::WalletError;
use crate::ledger::LedgerClient;
use crate::storage::{StorageError, UserId, Wallet, WalletDatabase, WalletRepository};
use crate::vault::KeyVault;

/// Per-user failure during a bulk operation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BackfillFailure {
    pub user_id: UserId,
    pub error: String,
}

/// Result of provisioning wallets for a batch of users.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct BackfillSummary {
    pub created: Vec<UserId>,
    /// Users that already had a wallet.
    pub skipped: Vec<UserId>,
    pub failed: Vec<BackfillFailure>,
}

/// Result of refreshing every cached balance.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SyncSummary {
    pub updated: usize,
    pub failed: Vec<BackfillFailure>,
}

#[derive(Clone)]
pub struct WalletDirectory {
    db: Arc<WalletDatabase>,
    vault: Arc<KeyVault>,
    ledger: Arc<dyn LedgerClient>,
    initial_balance: Decimal,
}

impl WalletDirectory {
    pub fn new(
        db: Arc<WalletDatabase>,
        vault: Arc<KeyVault>,
        ledger: Arc<dyn LedgerClient>,
        initial_balance: Decimal,
    ) -> Self {
        Self {
            db,
            vault,
            ledger,
            initial_balance,
        }
    }

    /// Provision a ledger account for `user_id` and store its sealed key.
    pub async fn create_wallet(&self, user_id: UserId) -> Result<Wallet, WalletError> {
        let repo = WalletRepository::new(&self.db);

        // Fast path only; the insert below is what enforces uniqueness.
        if repo.exists(user_id)? {
            return Err(WalletError::AlreadyExists(format!(
                "user {user_id} already has a wallet"
            )));
        }

        let account = self.ledger.create_account(self.initial_balance).await?;
        let encrypted_private_key = self.vault.encrypt(&account.private_key)?;

        let now = Utc::now();
        let wallet = Wallet {
            user_id,
            external_account_id: account.account_id.clone(),
            public_key: account.public_key.clone(),
            encrypted_private_key,
            cached_balance: self.initial_balance,
            balance_synced_at: None,
            created_at: now,
            updated_at: now,
        };

        match repo.insert_new(&wallet) {
            Ok(()) => {
                tracing::info!(
                    user_id,
                    account_id = %wallet.external_account_id,
                    "Wallet created"
                );
                Ok(wallet)
            }
            Err(StorageError::AlreadyExists(conflict)) => {
                tracing::error!(
                    user_id,
                    account_id = %account.account_id,
                    conflict = %conflict,
                    "Wallet provisioning conflicted; ledger account is orphaned"
                );
                Err(WalletError::AlreadyExists(conflict))
            }
            Err(e) => {
                tracing::error!(
                    user_id,
                    account_id = %account.account_id,
                    error = %e,
                    "Failed to store new wallet; ledger account is orphaned"
                );
                Err(e.into())
            }
        }
    }

    pub fn get_wallet(&self, user_id: UserId) -> Result<Wallet, WalletError> {
        WalletRepository::new(&self.db)
            .get(user_id)?
            .ok_or_else(|| WalletError::NotFound(format!("wallet for user {user_id}")))
    }

    /// Balance straight from the ledger; the cached copy is refreshed on the way.
    pub async fn live_balance(&self, user_id: UserId) -> Result<Decimal, WalletError> {
        self.refresh_balance(user_id).await
    }

    /// Re-read the ledger balance of `user_id` into the cache.
    pub async fn refresh_balance(&self, user_id: UserId) -> Result<Decimal, WalletError> {
        let wallet = self.get_wallet(user_id)?;
        let balance = self.ledger.get_balance(&wallet.external_account_id).await?;

        WalletRepository::new(&self.db).update_balance(user_id, balance, Utc::now())?;
        tracing::debug!(user_id, balance = %balance, "Cached balance refreshed");
        Ok(balance)
    }

    /// Create wallets for the listed users that lack one.
    ///
    /// Runs sequentially; a failure for one user does not stop the rest.
    pub async fn backfill(&self, user_ids: &[UserId]) -> BackfillSummary {
        let mut summary = BackfillSummary::default();

        for &user_id in user_ids {
            match self.create_wallet(user_id).await {
                Ok(_) => summary.created.push(user_id),
                Err(WalletError::AlreadyExists(_)) => summary.skipped.push(user_id),
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "Backfill failed for user");
                    summary.failed.push(BackfillFailure {
                        user_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            created = summary.created.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "Wallet backfill complete"
        );
        summary
    }

    /// Refresh every wallet's cached balance from the ledger.
    pub async fn sync_balances(&self) -> Result<SyncSummary, WalletError> {
        let wallets = WalletRepository::new(&self.db).list_all()?;
        let mut summary = SyncSummary::default();

        for wallet in wallets {
            match self.refresh_balance(wallet.user_id).await {
                Ok(_) => summary.updated += 1,
                Err(e) => {
                    tracing::warn!(user_id = wallet.user_id, error = %e, "Balance sync failed");
                    summary.failed.push(BackfillFailure {
                        user_id: wallet.user_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            updated = summary.updated,
            failed = summary.failed.len(),
            "Balance sync complete"
        );
        Ok(summary)
    }

    /// Open the sealed signing key of a wallet.
    pub(crate) fn unseal_key(&self, wallet: &Wallet) -> Result<zeroize::Zeroizing<Vec<u8>>, WalletError> {
        self.vault.decrypt(&wallet.encrypted_private_key).map_err(|e| {
            tracing::error!(
                user_id = wallet.user_id,
                account_id = %wallet.external_account_id,
                "Stored signing key failed authentication"
            );
            WalletError::from(e)
        })
    }
}
