// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded wallet database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `wallets`: user_id → serialized Wallet
//! - `account_owners`: ledger account id → user_id
//! - `transfers`: transfer id → serialized TransferRecord
//! - `user_transfer_index`: composite key (user|!micros|id) → transfer id
//! - `pending_transfers`: transfer id → created_at micros

use std::path::Path;

use redb::{Database, TableDefinition};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: user_id → serialized Wallet (JSON bytes).
pub(super) const WALLETS: TableDefinition<i64, &[u8]> = TableDefinition::new("wallets");

/// Index: ledger account id → owning user_id.
pub(super) const ACCOUNT_OWNERS: TableDefinition<&str, i64> = TableDefinition::new("account_owners");

/// Primary table: transfer id → serialized TransferRecord (JSON bytes).
pub(super) const TRANSFERS: TableDefinition<&str, &[u8]> = TableDefinition::new("transfers");

/// Index: composite key → transfer id.
/// Key format: `user_be | !created_micros_be | transfer_id` for newest-first range scans.
pub(super) const USER_TRANSFER_INDEX: TableDefinition<&[u8], &str> =
    TableDefinition::new("user_transfer_index");

/// Set of transfers still awaiting a terminal status: id → created_at micros.
pub(super) const PENDING_TRANSFERS: TableDefinition<&str, i64> =
    TableDefinition::new("pending_transfers");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// WalletDatabase
// =============================================================================

/// Embedded ACID database holding wallets and the transfer mirror.
pub struct WalletDatabase {
    pub(super) db: Database,
}

impl WalletDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(WALLETS)?;
            let _ = write_txn.open_table(ACCOUNT_OWNERS)?;
            let _ = write_txn.open_table(TRANSFERS)?;
            let _ = write_txn.open_table(USER_TRANSFER_INDEX)?;
            let _ = write_txn.open_table(PENDING_TRANSFERS)?;
        }
        write_txn.commit()?;

        tracing::info!(path = %path.display(), "Wallet database opened");
        Ok(Self { db })
    }
}

#[cfg(test)]
pub(crate) fn temp_db() -> (WalletDatabase, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = WalletDatabase::open(&dir.path().join("wallet.redb")).unwrap();
    (db, dir)
}
