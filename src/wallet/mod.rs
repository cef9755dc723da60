// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wallet Services
//!
//! - [`directory::WalletDirectory`]: one custodial ledger account per user.
//! - [`orchestrator::TransferOrchestrator`]: user-to-user transfers and
//!   reconciliation of the local mirror against the ledger.

pub mod directory;
pub mod orchestrator;

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::ledger::{LedgerClient, LedgerError};
use crate::storage::{StorageError, WalletDatabase};
use crate::vault::{KeyVault, VaultError};

pub use directory::{BackfillFailure, BackfillSummary, SyncSummary, WalletDirectory};
pub use orchestrator::{ReconcileSummary, TransferOrchestrator};

/// Longest accepted transfer memo, in bytes.
pub const MAX_MEMO_BYTES: usize = 100;

/// Errors surfaced by the wallet services.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Stored key material failed authentication. Needs operator attention.
    #[error("Signing key is corrupted: {0}")]
    KeyCorrupted(String),

    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// Submitted, outcome not yet known. Reconciliation will settle it.
    #[error("Transfer {transfer_id} was submitted but not confirmed in time")]
    TimedOut { transfer_id: Uuid },

    #[error("Transfer rejected: {0}")]
    TransferRejected(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Ledger account not found: {0}")]
    AccountNotFound(String),

    #[error("Wallet feature is disabled")]
    FeatureDisabled,

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WalletError {
    /// Whether repeating the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LedgerUnavailable(_))
    }
}

impl From<StorageError> for WalletError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::AlreadyExists(what) => Self::AlreadyExists(what),
            StorageError::NotFound(what) => Self::NotFound(what),
            other => Self::Storage(other),
        }
    }
}

impl From<LedgerError> for WalletError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Unavailable(msg) => Self::LedgerUnavailable(msg),
            LedgerError::InvalidResponse(msg) => Self::LedgerUnavailable(msg),
            LedgerError::TimedOut { transaction_id } => {
                Self::LedgerUnavailable(format!("no receipt for {transaction_id}"))
            }
            LedgerError::InvalidParameters(msg) | LedgerError::InvalidAccountId(msg) => {
                Self::Validation(msg)
            }
            LedgerError::AccountNotFound(id) => Self::AccountNotFound(id),
            LedgerError::InvalidKey(msg) => Self::KeyCorrupted(msg),
            LedgerError::TransferRejected(reason) => Self::TransferRejected(reason),
        }
    }
}

impl From<VaultError> for WalletError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::Decryption => Self::KeyCorrupted(err.to_string()),
            other => Self::Configuration(other.to_string()),
        }
    }
}

/// Wallet services sharing one database, vault, and ledger client.
#[derive(Clone)]
pub struct WalletServices {
    pub directory: WalletDirectory,
    pub orchestrator: TransferOrchestrator,
    pub ledger: Arc<dyn LedgerClient>,
}

impl WalletServices {
    pub fn new(
        db: Arc<WalletDatabase>,
        vault: Arc<KeyVault>,
        ledger: Arc<dyn LedgerClient>,
        initial_balance: Decimal,
    ) -> Self {
        let directory = WalletDirectory::new(db.clone(), vault, ledger.clone(), initial_balance);
        let orchestrator = TransferOrchestrator::new(db, ledger.clone(), directory.clone());
        Self {
            directory,
            orchestrator,
            ledger,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::ledger::memory::InMemoryLedger;

    pub fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    /// Services over a fresh database and an in-memory ledger.
    pub fn services(initial_balance: &str) -> (WalletServices, Arc<InMemoryLedger>, tempfile::TempDir) {
        let (db, dir) = crate::storage::database::temp_db();
        let ledger = Arc::new(InMemoryLedger::new());
        let services = WalletServices::new(
            Arc::new(db),
            Arc::new(KeyVault::ephemeral()),
            ledger.clone(),
            dec(initial_balance),
        );
        (services, ledger, dir)
    }
}
