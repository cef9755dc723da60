// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet repository.
//!
//! One wallet per user, keyed by user id. The uniqueness check and the
//! insert happen inside the same redb write transaction, and redb runs write
//! transactions one at a time, so two concurrent provisionings for the same
//! user cannot both commit.
//!
//! ## Security
//!
//! - Private keys are stored only as vault ciphertext
//! - Ciphertext is NEVER returned via API (see [`WalletResponse`])

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::database::{
    StorageError, StorageResult, WalletDatabase, ACCOUNT_OWNERS, WALLETS,
};

/// Application user identifier, owned by the social layer.
pub type UserId = i64;

/// Persistent binding of a user to a custodial ledger account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    /// Ledger-assigned account identifier. Immutable once set.
    pub external_account_id: String,
    pub public_key: String,
    /// `nonce || ciphertext || tag` produced by the key vault.
    #[serde(with = "hex_bytes")]
    pub encrypted_private_key: Vec<u8>,
    /// Last balance seen on the ledger. Advisory only.
    pub cached_balance: Decimal,
    pub balance_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Wallet as returned to API clients (never includes key material).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    pub user_id: UserId,
    /// Ledger account identifier
    pub account_id: String,
    /// Hex-encoded public key
    pub public_key: String,
    /// Last known balance in whole units
    pub cached_balance: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Wallet> for WalletResponse {
    fn from(wallet: Wallet) -> Self {
        Self {
            user_id: wallet.user_id,
            account_id: wallet.external_account_id,
            public_key: wallet.public_key,
            cached_balance: wallet.cached_balance,
            balance_synced_at: wallet.balance_synced_at,
            created_at: wallet.created_at,
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// Repository for wallet rows.
pub struct WalletRepository<'a> {
    db: &'a WalletDatabase,
}

impl<'a> WalletRepository<'a> {
    pub fn new(db: &'a WalletDatabase) -> Self {
        Self { db }
    }

    /// Insert a new wallet.
    ///
    /// Fails with `AlreadyExists` if the user has a wallet or the ledger
    /// account is already bound to any user.
    pub fn insert_new(&self, wallet: &Wallet) -> StorageResult<()> {
        let json = serde_json::to_vec(wallet)?;
        let account_id = wallet.external_account_id.as_str();

        let write_txn = self.db.db.begin_write()?;
        let conflict = {
            let mut wallets = write_txn.open_table(WALLETS)?;
            let mut owners = write_txn.open_table(ACCOUNT_OWNERS)?;

            let user_taken = wallets.get(wallet.user_id)?.is_some();
            let owner = owners.get(account_id)?.map(|v| v.value());

            if user_taken {
                Some(format!("wallet for user {}", wallet.user_id))
            } else if let Some(owner) = owner {
                Some(format!("ledger account {account_id} (bound to user {owner})"))
            } else {
                wallets.insert(wallet.user_id, json.as_slice())?;
                owners.insert(account_id, wallet.user_id)?;
                None
            }
        };

        if let Some(what) = conflict {
            write_txn.abort()?;
            return Err(StorageError::AlreadyExists(what));
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get(&self, user_id: UserId) -> StorageResult<Option<Wallet>> {
        let read_txn = self.db.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;
        match table.get(user_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn exists(&self, user_id: UserId) -> StorageResult<bool> {
        let read_txn = self.db.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;
        Ok(table.get(user_id)?.is_some())
    }

    /// All wallets, ordered by user id.
    pub fn list_all(&self) -> StorageResult<Vec<Wallet>> {
        let read_txn = self.db.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;

        let mut wallets = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            wallets.push(serde_json::from_slice(value.value())?);
        }
        Ok(wallets)
    }

    /// Store a freshly observed ledger balance.
    pub fn update_balance(
        &self,
        user_id: UserId,
        balance: Decimal,
        synced_at: DateTime<Utc>,
    ) -> StorageResult<Wallet> {
        let write_txn = self.db.db.begin_write()?;
        let wallet = {
            let mut table = write_txn.open_table(WALLETS)?;

            let existing_bytes = {
                let existing = table
                    .get(user_id)?
                    .ok_or_else(|| StorageError::NotFound(format!("wallet for user {user_id}")))?;
                existing.value().to_vec()
            };

            let mut wallet: Wallet = serde_json::from_slice(&existing_bytes)?;
            wallet.cached_balance = balance;
            wallet.balance_synced_at = Some(synced_at);
            wallet.updated_at = Utc::now();

            let json = serde_json::to_vec(&wallet)?;
            table.insert(user_id, json.as_slice())?;
            wallet
        };
        write_txn.commit()?;
        Ok(wallet)
    }
}

#[cfg(test)]
pub(crate) fn sample_wallet(user_id: UserId, account_id: &str) -> Wallet {
    let now = Utc::now();
    Wallet {
        user_id,
        external_account_id: account_id.to_string(),
        public_key: "02aa".to_string(),
        encrypted_private_key: vec![1, 2, 3, 4],
        cached_balance: Decimal::ONE,
        balance_synced_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::temp_db;

    #[test]
    fn insert_and_get_wallet() {
        let (db, _dir) = temp_db();
        let repo = WalletRepository::new(&db);
        repo.insert_new(&sample_wallet(1, "acct-1")).unwrap();

        let wallet = repo.get(1).unwrap().unwrap();
        assert_eq!(wallet.external_account_id, "acct-1");
        assert_eq!(wallet.encrypted_private_key, vec![1, 2, 3, 4]);
        assert!(repo.get(2).unwrap().is_none());
    }

    #[test]
    fn second_insert_is_rejected_and_leaves_first_intact() {
        let (db, _dir) = temp_db();
        let repo = WalletRepository::new(&db);
        repo.insert_new(&sample_wallet(1, "acct-1")).unwrap();

        let err = repo.insert_new(&sample_wallet(1, "acct-2")).unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));

        assert_eq!(repo.get(1).unwrap().unwrap().external_account_id, "acct-1");
        // The rejected row did not claim its account.
        repo.insert_new(&sample_wallet(2, "acct-2")).unwrap();
    }

    #[test]
    fn ledger_account_binds_to_one_user() {
        let (db, _dir) = temp_db();
        let repo = WalletRepository::new(&db);
        repo.insert_new(&sample_wallet(1, "acct-1")).unwrap();

        let err = repo.insert_new(&sample_wallet(2, "acct-1")).unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(ref what) if what.contains("acct-1")));
        assert!(repo.get(2).unwrap().is_none());
        assert_eq!(repo.list_all().unwrap().len(), 1);
    }

    #[test]
    fn concurrent_inserts_store_exactly_one() {
        let (db, _dir) = temp_db();
        let db = std::sync::Arc::new(db);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = db.clone();
                std::thread::spawn(move || {
                    WalletRepository::new(&db).insert_new(&sample_wallet(5, &format!("acct-{i}")))
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(StorageError::AlreadyExists(_))))
                .count(),
            7
        );
        assert_eq!(WalletRepository::new(&db).list_all().unwrap().len(), 1);
    }

    #[test]
    fn update_balance_sets_sync_time() {
        let (db, _dir) = temp_db();
        let repo = WalletRepository::new(&db);
        repo.insert_new(&sample_wallet(3, "acct-3")).unwrap();

        let now = Utc::now();
        let updated = repo.update_balance(3, Decimal::new(42, 1), now).unwrap();
        assert_eq!(updated.cached_balance, Decimal::new(42, 1));
        assert_eq!(updated.balance_synced_at, Some(now));

        assert!(matches!(
            repo.update_balance(99, Decimal::ONE, now),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn response_omits_key_material() {
        let response = WalletResponse::from(sample_wallet(1, "acct-1"));
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("encrypted_private_key").is_none());
        assert_eq!(json["account_id"], "acct-1");
    }
}
