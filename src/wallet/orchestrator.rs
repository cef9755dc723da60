// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transfer orchestration and reconciliation.
//!
//! ## Transfer lifecycle
//!
//! ```text
//! validate → unseal key → prepare (sign) → insert pending → broadcast
//!                                                         ├─ receipt   → success
//!                                                         ├─ rejection → failed
//!                                                         └─ no answer → stays pending
//! ```
//!
//! A pending record always exists before the signed instruction leaves the
//! process, so a crash or timeout can at worst leave a record for the
//! reconciler, never an untracked ledger movement. Status transitions are
//! conditional on the record still being pending; whichever of the transfer
//! call and the reconciler gets there first wins and the other is a no-op.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{WalletDirectory, WalletError, MAX_MEMO_BYTES};
use crate::ledger::{LedgerClient, LedgerError, LedgerOutcome, TransferInstruction, TransferLookup};
use crate::storage::{
    Page, TransferRecord, TransferRepository, TransferStatus, UserId, WalletDatabase,
};

/// Attempts to record a confirmed transfer before giving up.
const PERSIST_ATTEMPTS: u32 = 3;
const PERSIST_BACKOFF: Duration = Duration::from_millis(200);

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReconcileSummary {
    pub examined: usize,
    pub settled: usize,
    pub failed: usize,
    /// Still unknown on the ledger; left pending.
    pub unresolved: usize,
    pub errors: usize,
}

enum Resolution {
    Settled,
    Failed,
    Unresolved,
    /// Someone else moved the record out of pending first.
    AlreadyFinal,
}

#[derive(Clone)]
pub struct TransferOrchestrator {
    db: Arc<WalletDatabase>,
    ledger: Arc<dyn LedgerClient>,
    directory: WalletDirectory,
}

impl TransferOrchestrator {
    pub fn new(
        db: Arc<WalletDatabase>,
        ledger: Arc<dyn LedgerClient>,
        directory: WalletDirectory,
    ) -> Self {
        Self {
            db,
            ledger,
            directory,
        }
    }

    /// Move `amount` from `sender` to `receiver`.
    ///
    /// Runs on its own task: dropping the returned future does not abort a
    /// submission that is already under way.
    pub async fn transfer_value(
        &self,
        sender: UserId,
        receiver: UserId,
        amount: Decimal,
        memo: Option<String>,
    ) -> Result<TransferRecord, WalletError> {
        let this = self.clone();
        tokio::spawn(async move { this.execute_transfer(sender, receiver, amount, memo).await })
            .await
            .map_err(|e| WalletError::Internal(format!("transfer task failed: {e}")))?
    }

    async fn execute_transfer(
        &self,
        sender: UserId,
        receiver: UserId,
        amount: Decimal,
        memo: Option<String>,
    ) -> Result<TransferRecord, WalletError> {
        let from = self.directory.get_wallet(sender)?;
        let to = self.directory.get_wallet(receiver)?;

        validate_transfer(sender, receiver, amount, memo.as_deref())?;

        let signing_key = self.directory.unseal_key(&from)?;

        let instruction = TransferInstruction {
            from: from.external_account_id.clone(),
            to: to.external_account_id.clone(),
            amount,
            memo: memo.clone(),
        };
        let prepared = match self.ledger.prepare_transfer(&instruction, &signing_key).await {
            Ok(prepared) => prepared,
            Err(LedgerError::TransferRejected(reason)) => {
                tracing::warn!(sender, receiver, reason = %reason, "Transfer rejected by ledger");
                let record = TransferRecord::new_failed(sender, receiver, amount, memo, reason.clone());
                TransferRepository::new(&self.db).insert_failed(&record)?;
                return Err(WalletError::TransferRejected(reason));
            }
            Err(LedgerError::InvalidKey(msg)) => {
                tracing::error!(
                    sender,
                    account_id = %from.external_account_id,
                    error = %msg,
                    "Ledger refused the stored signing key"
                );
                return Err(WalletError::KeyCorrupted(msg));
            }
            Err(e) => {
                tracing::warn!(sender, receiver, error = %e, "Transfer could not be prepared");
                return Err(e.into());
            }
        };
        drop(signing_key);

        let mut record = TransferRecord::new_pending(
            sender,
            receiver,
            amount,
            prepared.transaction_id.clone(),
            memo,
        );
        let transfers = TransferRepository::new(&self.db);
        if let Err(e) = transfers.insert_pending(&record) {
            tracing::error!(transfer_id = %record.id, error = %e, "Failed to record transfer; not submitted");
            self.ledger.release(&prepared).await;
            return Err(e.into());
        }

        tracing::info!(
            transfer_id = %record.id,
            sender,
            receiver,
            amount = %amount,
            submission_id = %record.submission_id,
            "Submitting transfer"
        );

        match self.ledger.broadcast_transfer(&prepared).await {
            Ok(transaction_id) => {
                self.persist_success(&record.id, &transaction_id).await;
                self.refresh_participants(sender, receiver).await;

                record.status = TransferStatus::Success;
                record.external_transaction_id = Some(transaction_id);
                record.updated_at = chrono::Utc::now();
                Ok(record)
            }
            Err(LedgerError::TransferRejected(reason)) => {
                tracing::warn!(transfer_id = %record.id, reason = %reason, "Transfer rejected by ledger");
                transfers.mark_failed(&record.id, &reason)?;
                Err(WalletError::TransferRejected(reason))
            }
            Err(e) => {
                tracing::warn!(
                    transfer_id = %record.id,
                    error = %e,
                    "Transfer outcome unknown; left pending for reconciliation"
                );
                Err(WalletError::TimedOut {
                    transfer_id: record.id,
                })
            }
        }
    }

    /// Record a ledger success, retrying briefly.
    ///
    /// On exhaustion the record stays pending and the reconciler repairs it.
    async fn persist_success(&self, transfer_id: &Uuid, transaction_id: &str) {
        let transfers = TransferRepository::new(&self.db);
        for attempt in 1..=PERSIST_ATTEMPTS {
            match transfers.mark_success(transfer_id, transaction_id) {
                Ok(_) => return,
                Err(e) => {
                    tracing::warn!(
                        transfer_id = %transfer_id,
                        attempt,
                        error = %e,
                        "Failed to record confirmed transfer"
                    );
                    if attempt < PERSIST_ATTEMPTS {
                        tokio::time::sleep(PERSIST_BACKOFF * attempt).await;
                    }
                }
            }
        }
        tracing::error!(
            transfer_id = %transfer_id,
            transaction_id = %transaction_id,
            "Ledger transfer succeeded but was not recorded; manual reconciliation required"
        );
    }

    /// Re-read both balances from the ledger. Never derived locally.
    async fn refresh_participants(&self, sender: UserId, receiver: UserId) {
        for user_id in [sender, receiver] {
            if let Err(e) = self.directory.refresh_balance(user_id).await {
                tracing::warn!(user_id, error = %e, "Balance refresh after transfer failed");
            }
        }
    }

    /// Resolve every pending record against the ledger, oldest first.
    pub async fn reconcile_pending(&self) -> Result<ReconcileSummary, WalletError> {
        let pending = TransferRepository::new(&self.db).list_pending()?;
        let mut summary = ReconcileSummary::default();

        for record in pending {
            summary.examined += 1;
            match self.resolve(&record).await {
                Ok(Resolution::Settled) => summary.settled += 1,
                Ok(Resolution::Failed) => summary.failed += 1,
                Ok(Resolution::Unresolved) => summary.unresolved += 1,
                Ok(Resolution::AlreadyFinal) => {}
                Err(e) => {
                    summary.errors += 1;
                    tracing::warn!(transfer_id = %record.id, error = %e, "Reconciliation lookup failed");
                }
            }
        }

        if summary.examined > 0 {
            tracing::info!(
                examined = summary.examined,
                settled = summary.settled,
                failed = summary.failed,
                unresolved = summary.unresolved,
                errors = summary.errors,
                "Reconciliation pass complete"
            );
        }
        Ok(summary)
    }

    /// Resolve a single record on demand and return its current state.
    pub async fn reconcile_transfer(&self, transfer_id: &Uuid) -> Result<TransferRecord, WalletError> {
        let record = self.get_transfer(transfer_id)?;
        if record.status == TransferStatus::Pending {
            self.resolve(&record).await?;
        }
        self.get_transfer(transfer_id)
    }

    async fn resolve(&self, record: &TransferRecord) -> Result<Resolution, WalletError> {
        let lookup = TransferLookup {
            transaction_id: record.submission_id.clone(),
            submitted_at: record.created_at,
        };
        let transfers = TransferRepository::new(&self.db);

        match self.ledger.lookup_transfer(&lookup).await? {
            LedgerOutcome::Settled { transaction_id } => {
                if !transfers.mark_success(&record.id, &transaction_id)? {
                    return Ok(Resolution::AlreadyFinal);
                }
                tracing::info!(
                    transfer_id = %record.id,
                    transaction_id = %transaction_id,
                    "Pending transfer settled"
                );
                self.refresh_participants(record.from_user, record.to_user).await;
                Ok(Resolution::Settled)
            }
            LedgerOutcome::Failed { reason } => {
                if !transfers.mark_failed(&record.id, &reason)? {
                    return Ok(Resolution::AlreadyFinal);
                }
                tracing::info!(transfer_id = %record.id, reason = %reason, "Pending transfer failed");
                Ok(Resolution::Failed)
            }
            LedgerOutcome::Unknown => Ok(Resolution::Unresolved),
        }
    }

    pub fn get_transfer(&self, transfer_id: &Uuid) -> Result<TransferRecord, WalletError> {
        TransferRepository::new(&self.db)
            .get(transfer_id)?
            .ok_or_else(|| WalletError::NotFound(format!("transfer {transfer_id}")))
    }

    /// Sent and received transfers of `user_id`, newest first.
    pub fn transfer_history(&self, user_id: UserId, page: Page) -> Result<Vec<TransferRecord>, WalletError> {
        Ok(TransferRepository::new(&self.db).list_for_user(user_id, page)?)
    }
}

fn validate_transfer(
    sender: UserId,
    receiver: UserId,
    amount: Decimal,
    memo: Option<&str>,
) -> Result<(), WalletError> {
    if amount <= Decimal::ZERO {
        return Err(WalletError::Validation("amount must be greater than zero".to_string()));
    }
    if sender == receiver {
        return Err(WalletError::Validation("cannot transfer to yourself".to_string()));
    }
    if memo.is_some_and(|m| m.len() > MAX_MEMO_BYTES) {
        return Err(WalletError::Validation(format!(
            "memo exceeds {MAX_MEMO_BYTES} bytes"
        )));
    }
    Ok(())
}
