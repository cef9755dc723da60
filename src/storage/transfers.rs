// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Local mirror of value transfers.
//!
//! Records are append-only apart from a single status transition out of
//! `pending`. Each record is indexed under both participants so a user's
//! history (sent and received) is one newest-first range scan.

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::database::{
    StorageError, StorageResult, WalletDatabase, PENDING_TRANSFERS, TRANSFERS,
    USER_TRANSFER_INDEX,
};
use super::wallets::UserId;

/// Transfer status. `pending` moves once to a terminal state and stays there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Success,
    Failed,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One user-to-user value transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TransferRecord {
    pub id: Uuid,
    pub from_user: UserId,
    pub to_user: UserId,
    /// Amount in whole units, always positive
    pub amount: Decimal,
    /// Ledger transaction id, set once confirmed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_transaction_id: Option<String>,
    /// Ledger reference fixed before submission, used for reconciliation.
    /// Empty when the ledger refused the transfer before it was signed.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub submission_id: String,
    pub status: TransferStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransferRecord {
    pub fn new_pending(
        from_user: UserId,
        to_user: UserId,
        amount: Decimal,
        submission_id: String,
        memo: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            from_user,
            to_user,
            amount,
            external_transaction_id: None,
            submission_id,
            status: TransferStatus::Pending,
            memo,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A transfer the ledger refused before anything was submitted.
    pub fn new_failed(
        from_user: UserId,
        to_user: UserId,
        amount: Decimal,
        memo: Option<String>,
        reason: String,
    ) -> Self {
        let mut record = Self::new_pending(from_user, to_user, amount, String::new(), memo);
        record.status = TransferStatus::Failed;
        record.failure_reason = Some(reason);
        record
    }

    pub fn involves(&self, user_id: UserId) -> bool {
        self.from_user == user_id || self.to_user == user_id
    }
}

/// Normalized limit/offset pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    pub const DEFAULT_LIMIT: usize = 20;
    pub const MAX_LIMIT: usize = 100;

    /// Missing or non-positive limit → 20, capped at 100; negative offset → 0.
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        let limit = match limit {
            Some(l) if l > 0 => (l as u64).min(Self::MAX_LIMIT as u64) as usize,
            _ => Self::DEFAULT_LIMIT,
        };
        let offset = offset.filter(|o| *o > 0).unwrap_or(0) as usize;
        Self { limit, offset }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

// =============================================================================
// Index Key Helpers
// =============================================================================

/// Build a composite key for the user_transfer_index table.
///
/// Format: `user_be | inverted_micros_be | transfer_id`. The inverted
/// timestamp makes a forward scan return newest first.
fn make_index_key(user_id: UserId, created_at: DateTime<Utc>, id: &Uuid) -> Vec<u8> {
    let micros = created_at.timestamp_micros();
    let mut key = Vec::with_capacity(8 + 8 + 36);
    key.extend_from_slice(&user_id.to_be_bytes());
    key.extend_from_slice(&(!micros as u64).to_be_bytes());
    key.extend_from_slice(id.to_string().as_bytes());
    key
}

fn make_prefix(user_id: UserId) -> [u8; 8] {
    user_id.to_be_bytes()
}

/// Repository for the transfer mirror.
pub struct TransferRepository<'a> {
    db: &'a WalletDatabase,
}

impl<'a> TransferRepository<'a> {
    pub fn new(db: &'a WalletDatabase) -> Self {
        Self { db }
    }

    /// Insert a new pending record and index it under both participants.
    pub fn insert_pending(&self, record: &TransferRecord) -> StorageResult<()> {
        self.insert(record)
    }

    /// Insert a record that was refused before submission. It never enters
    /// the pending set.
    pub fn insert_failed(&self, record: &TransferRecord) -> StorageResult<()> {
        if record.status != TransferStatus::Failed {
            return Err(StorageError::InvalidState(format!(
                "transfer {} is not failed",
                record.id
            )));
        }
        self.insert(record)
    }

    fn insert(&self, record: &TransferRecord) -> StorageResult<()> {
        let id = record.id.to_string();
        let json = serde_json::to_vec(record)?;

        let write_txn = self.db.db.begin_write()?;
        let existed = {
            let mut transfers = write_txn.open_table(TRANSFERS)?;
            let existed = transfers.insert(id.as_str(), json.as_slice())?.is_some();
            if !existed {
                let mut index = write_txn.open_table(USER_TRANSFER_INDEX)?;
                for user in [record.from_user, record.to_user] {
                    let key = make_index_key(user, record.created_at, &record.id);
                    index.insert(key.as_slice(), id.as_str())?;
                }
                if record.status == TransferStatus::Pending {
                    let mut pending = write_txn.open_table(PENDING_TRANSFERS)?;
                    pending.insert(id.as_str(), record.created_at.timestamp_micros())?;
                }
            }
            existed
        };

        if existed {
            write_txn.abort()?;
            return Err(StorageError::AlreadyExists(format!("transfer {id}")));
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get(&self, id: &Uuid) -> StorageResult<Option<TransferRecord>> {
        let read_txn = self.db.db.begin_read()?;
        let table = read_txn.open_table(TRANSFERS)?;
        match table.get(id.to_string().as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Transition a pending record to `success`.
    ///
    /// Returns `false` without writing if the record is already terminal.
    pub fn mark_success(&self, id: &Uuid, transaction_id: &str) -> StorageResult<bool> {
        self.transition(id, TransferStatus::Success, Some(transaction_id), None)
    }

    /// Transition a pending record to `failed`.
    ///
    /// Returns `false` without writing if the record is already terminal.
    pub fn mark_failed(&self, id: &Uuid, reason: &str) -> StorageResult<bool> {
        self.transition(id, TransferStatus::Failed, None, Some(reason))
    }

    fn transition(
        &self,
        id: &Uuid,
        status: TransferStatus,
        transaction_id: Option<&str>,
        reason: Option<&str>,
    ) -> StorageResult<bool> {
        let key = id.to_string();

        let write_txn = self.db.db.begin_write()?;
        let changed = {
            let mut table = write_txn.open_table(TRANSFERS)?;

            let existing_bytes = {
                let existing = table
                    .get(key.as_str())?
                    .ok_or_else(|| StorageError::NotFound(format!("transfer {key}")))?;
                existing.value().to_vec()
            };

            let mut record: TransferRecord = serde_json::from_slice(&existing_bytes)?;
            if record.status.is_terminal() {
                false
            } else {
                record.status = status;
                record.external_transaction_id = transaction_id.map(str::to_string);
                record.failure_reason = reason.map(str::to_string);
                record.updated_at = Utc::now();

                let json = serde_json::to_vec(&record)?;
                table.insert(key.as_str(), json.as_slice())?;

                let mut pending = write_txn.open_table(PENDING_TRANSFERS)?;
                pending.remove(key.as_str())?;
                true
            }
        };

        if changed {
            write_txn.commit()?;
        } else {
            write_txn.abort()?;
        }
        Ok(changed)
    }

    /// Transfers sent or received by `user_id`, newest first.
    pub fn list_for_user(&self, user_id: UserId, page: Page) -> StorageResult<Vec<TransferRecord>> {
        let read_txn = self.db.db.begin_read()?;
        let index = read_txn.open_table(USER_TRANSFER_INDEX)?;
        let transfers = read_txn.open_table(TRANSFERS)?;

        let prefix = make_prefix(user_id);
        let mut results = Vec::with_capacity(page.limit);

        for entry in index.range(prefix.as_slice()..)?.skip(page.offset) {
            let (key, id) = entry?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            if let Some(value) = transfers.get(id.value())? {
                results.push(serde_json::from_slice(value.value())?);
            }
            if results.len() >= page.limit {
                break;
            }
        }

        Ok(results)
    }

    /// Delete a record outright, leaving its index entries dangling.
    #[cfg(test)]
    pub(crate) fn remove(&self, id: &Uuid) -> StorageResult<()> {
        let key = id.to_string();
        let write_txn = self.db.db.begin_write()?;
        {
            let mut transfers = write_txn.open_table(TRANSFERS)?;
            transfers.remove(key.as_str())?;
            let mut pending = write_txn.open_table(PENDING_TRANSFERS)?;
            pending.remove(key.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// All records still pending, oldest first.
    pub fn list_pending(&self) -> StorageResult<Vec<TransferRecord>> {
        let read_txn = self.db.db.begin_read()?;
        let pending = read_txn.open_table(PENDING_TRANSFERS)?;
        let transfers = read_txn.open_table(TRANSFERS)?;

        let mut ids = Vec::new();
        for entry in pending.iter()? {
            let (id, micros) = entry?;
            ids.push((micros.value(), id.value().to_string()));
        }
        ids.sort();

        let mut records = Vec::with_capacity(ids.len());
        for (_, id) in ids {
            if let Some(value) = transfers.get(id.as_str())? {
                records.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(records)
    }
}
