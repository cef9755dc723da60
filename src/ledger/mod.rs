// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Client
//!
//! Boundary to the external value ledger. Everything past this trait is
//! network I/O against a system that can fail independently of ours.
//!
//! Two implementations ship with the crate:
//!
//! - [`avalanche::AvalancheLedger`]: Avalanche C-Chain over JSON-RPC.
//! - [`memory::InMemoryLedger`]: simulated ledger with real signatures and
//!   fault injection, used by tests and the `memory` network in dev builds.
//!
//! Transfers are split in two phases. [`LedgerClient::prepare_transfer`]
//! signs the instruction and fixes its transaction id without touching the
//! ledger state, so the caller can persist a pending record keyed on that id
//! before anything leaves the process. [`LedgerClient::broadcast_transfer`]
//! then submits it and waits for the receipt.

pub mod avalanche;
#[cfg(any(test, feature = "dev"))]
pub mod memory;
pub mod types;
pub mod units;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use zeroize::Zeroizing;

pub use types::{LedgerNetwork, NetworkConfig, AVAX_FUJI, AVAX_MAINNET, NATIVE_DECIMALS};

/// Errors surfaced by a ledger client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Transport failure, rate limit, or node error before anything was submitted.
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Invalid account id: {0}")]
    InvalidAccountId(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    /// Definitive denial by the ledger. Nothing was applied.
    #[error("Transfer rejected: {0}")]
    TransferRejected(String),

    /// The instruction may have been applied; only a lookup can tell.
    #[error("Timed out waiting for receipt of {transaction_id}")]
    TimedOut { transaction_id: String },

    #[error("Invalid ledger response: {0}")]
    InvalidResponse(String),
}

/// Freshly provisioned ledger account.
pub struct LedgerAccount {
    pub account_id: String,
    /// Hex-encoded public key.
    pub public_key: String,
    /// Raw private key bytes, wiped on drop.
    pub private_key: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for LedgerAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerAccount")
            .field("account_id", &self.account_id)
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Zero-sum value movement: debit `from` by `amount`, credit `to` by the same.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferInstruction {
    pub from: String,
    pub to: String,
    pub amount: Decimal,
    pub memo: Option<String>,
}

/// A signed instruction with its ledger transaction id already fixed.
#[derive(Debug, Clone)]
pub struct PreparedTransfer {
    pub transaction_id: String,
    pub instruction: TransferInstruction,
    /// Implementation-specific signed payload.
    pub payload: Vec<u8>,
}

/// What reconciliation knows about a submission.
#[derive(Debug, Clone)]
pub struct TransferLookup {
    pub transaction_id: String,
    pub submitted_at: DateTime<Utc>,
}

/// Ledger-side fate of a submitted transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutcome {
    Settled { transaction_id: String },
    Failed { reason: String },
    /// Not yet decidable; ask again later.
    Unknown,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Human-readable network name.
    fn network_name(&self) -> &str;

    /// Provision a new account funded with `initial_balance`.
    async fn create_account(&self, initial_balance: Decimal) -> Result<LedgerAccount, LedgerError>;

    /// Current balance of `account_id` in whole units.
    async fn get_balance(&self, account_id: &str) -> Result<Decimal, LedgerError>;

    /// Build and sign a transfer. Read-only towards the ledger.
    async fn prepare_transfer(
        &self,
        instruction: &TransferInstruction,
        signing_key: &[u8],
    ) -> Result<PreparedTransfer, LedgerError>;

    /// Submit a prepared transfer and wait for its receipt.
    async fn broadcast_transfer(&self, prepared: &PreparedTransfer) -> Result<String, LedgerError>;

    /// Prepare and broadcast in one step. Never retried.
    async fn submit_transfer(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
        signing_key: &[u8],
        memo: Option<&str>,
    ) -> Result<String, LedgerError> {
        let instruction = TransferInstruction {
            from: from.to_string(),
            to: to.to_string(),
            amount,
            memo: memo.map(str::to_string),
        };
        let prepared = self.prepare_transfer(&instruction, signing_key).await?;
        self.broadcast_transfer(&prepared).await
    }

    /// Forget a prepared transfer that will never be broadcast.
    async fn release(&self, _prepared: &PreparedTransfer) {}

    /// Resolve the fate of an earlier submission.
    async fn lookup_transfer(&self, lookup: &TransferLookup) -> Result<LedgerOutcome, LedgerError>;

    /// Release connections and background resources.
    async fn shutdown(&self) {}
}
