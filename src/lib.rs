// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Tip Wallet - Custodial Wallet & Value-Transfer Service
//!
//! Provisions one custodial Avalanche C-Chain account per user, keeps each
//! signing key sealed under AES-256-GCM, and moves value between users with
//! a local transfer mirror reconciled against the ledger.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Caller identity forwarded by the session layer
//! - `ledger` - Ledger client trait, Avalanche and in-memory implementations
//! - `reconciler` - Background resolution of pending transfers
//! - `storage` - redb-backed wallet directory and transfer mirror
//! - `vault` - Sealing of custodial signing keys
//! - `wallet` - Wallet provisioning and transfer orchestration

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod ledger;
pub mod reconciler;
pub mod state;
pub mod storage;
pub mod vault;
pub mod wallet;
