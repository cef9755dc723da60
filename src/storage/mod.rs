// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state of the wallet service in a single redb file under
//! `DATA_DIR`:
//!
//! ```text
//! {DATA_DIR}/
//!   wallet.redb
//!     wallets              # user_id → Wallet (encrypted key inside)
//!     account_owners       # ledger account → user_id
//!     transfers            # transfer id → TransferRecord
//!     user_transfer_index  # newest-first history per user
//!     pending_transfers    # records awaiting reconciliation
//! ```
//!
//! Private keys are sealed by the key vault before they reach this layer;
//! storage never sees plaintext key material.

pub mod database;
pub mod transfers;
pub mod wallets;

pub use database::{StorageError, StorageResult, WalletDatabase};
pub use transfers::{Page, TransferRecord, TransferRepository, TransferStatus};
pub use wallets::{UserId, Wallet, WalletRepository, WalletResponse};

/// File name of the database inside `DATA_DIR`.
pub const DATABASE_FILE: &str = "wallet.redb";
