// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Simulated ledger for tests and local development.
//!
//! Behaves like a real ledger where it matters for the wallet service:
//! accounts are secp256k1 keypairs, every transfer must carry a valid ECDSA
//! signature from the sender, balances are zero-sum, and overdrafts are
//! refused. Faults can be injected per broadcast to exercise the timeout and
//! reconciliation paths, and every call is counted.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::rand_core::OsRng;
use rust_decimal::Decimal;
use zeroize::Zeroizing;

use super::{
    LedgerAccount, LedgerClient, LedgerError, LedgerOutcome, PreparedTransfer,
    TransferInstruction, TransferLookup,
};

const ACCOUNT_PREFIX: &str = "acct-";

/// Fault applied to the next broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastFault {
    /// Apply the transfer, then report a timeout.
    TimeoutAfterApply,
    /// Drop the transfer and report a timeout.
    TimeoutBeforeApply,
    /// Deny the transfer with the given reason.
    Reject(String),
}

/// Snapshot of how often each ledger operation was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCalls {
    pub create_account: usize,
    pub get_balance: usize,
    pub prepare_transfer: usize,
    pub broadcast_transfer: usize,
    pub lookup_transfer: usize,
}

impl LedgerCalls {
    pub fn total(&self) -> usize {
        self.create_account
            + self.get_balance
            + self.prepare_transfer
            + self.broadcast_transfer
            + self.lookup_transfer
    }
}

#[derive(Default)]
struct Counters {
    create_account: AtomicUsize,
    get_balance: AtomicUsize,
    prepare_transfer: AtomicUsize,
    broadcast_transfer: AtomicUsize,
    lookup_transfer: AtomicUsize,
}

struct Account {
    verifying_key: VerifyingKey,
    balance: Decimal,
}

enum TxEntry {
    Settled,
    Failed(String),
}

#[derive(Default)]
struct State {
    accounts: HashMap<String, Account>,
    next_account: u64,
    next_tx: u64,
    /// Prepared but not yet broadcast.
    in_flight: HashSet<String>,
    transactions: HashMap<String, TxEntry>,
    faults: VecDeque<BroadcastFault>,
}

type BroadcastHook = Box<dyn Fn() + Send + Sync>;

/// In-process [`LedgerClient`].
pub struct InMemoryLedger {
    state: Mutex<State>,
    available: AtomicBool,
    calls: Counters,
    broadcast_hook: Mutex<Option<BroadcastHook>>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            available: AtomicBool::new(true),
            calls: Counters::default(),
            broadcast_hook: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_available(&self) -> Result<(), LedgerError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LedgerError::Unavailable("simulated outage".to_string()))
        }
    }

    /// Toggle a full outage: every call fails with `Unavailable` while off.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Queue a fault for the next broadcast.
    pub fn fail_next_broadcast(&self, fault: BroadcastFault) {
        self.state().faults.push_back(fault);
    }

    /// Run `hook` at the start of every broadcast, before the ledger acts.
    pub fn on_broadcast(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.broadcast_hook.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
    }

    /// Overwrite an account balance.
    pub fn set_balance(&self, account_id: &str, balance: Decimal) -> Result<(), LedgerError> {
        let mut state = self.state();
        let account = state
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;
        account.balance = balance;
        Ok(())
    }

    /// Number of transfers that moved value.
    pub fn settled_transfers(&self) -> usize {
        self.state()
            .transactions
            .values()
            .filter(|t| matches!(t, TxEntry::Settled))
            .count()
    }

    pub fn calls(&self) -> LedgerCalls {
        LedgerCalls {
            create_account: self.calls.create_account.load(Ordering::SeqCst),
            get_balance: self.calls.get_balance.load(Ordering::SeqCst),
            prepare_transfer: self.calls.prepare_transfer.load(Ordering::SeqCst),
            broadcast_transfer: self.calls.broadcast_transfer.load(Ordering::SeqCst),
            lookup_transfer: self.calls.lookup_transfer.load(Ordering::SeqCst),
        }
    }
}

fn validate_account_id(account_id: &str) -> Result<(), LedgerError> {
    let valid = account_id
        .strip_prefix(ACCOUNT_PREFIX)
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
    if valid {
        Ok(())
    } else {
        Err(LedgerError::InvalidAccountId(account_id.to_string()))
    }
}

fn signing_message(instruction: &TransferInstruction, transaction_id: &str) -> Vec<u8> {
    format!(
        "{}|{}|{}|{}|{}",
        instruction.from,
        instruction.to,
        instruction.amount.normalize(),
        instruction.memo.as_deref().unwrap_or_default(),
        transaction_id
    )
    .into_bytes()
}

/// Move value if the instruction is still valid against current state.
fn apply(state: &mut State, instruction: &TransferInstruction) -> Result<(), String> {
    let sender_balance = state
        .accounts
        .get(&instruction.from)
        .map(|a| a.balance)
        .ok_or_else(|| format!("unknown account {}", instruction.from))?;
    if !state.accounts.contains_key(&instruction.to) {
        return Err(format!("unknown account {}", instruction.to));
    }
    if sender_balance < instruction.amount {
        return Err("insufficient funds".to_string());
    }

    if let Some(from) = state.accounts.get_mut(&instruction.from) {
        from.balance -= instruction.amount;
    }
    if let Some(to) = state.accounts.get_mut(&instruction.to) {
        to.balance += instruction.amount;
    }
    Ok(())
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    fn network_name(&self) -> &str {
        "In-memory ledger"
    }

    async fn create_account(&self, initial_balance: Decimal) -> Result<LedgerAccount, LedgerError> {
        self.calls.create_account.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;
        if initial_balance <= Decimal::ZERO {
            return Err(LedgerError::InvalidParameters(
                "initial balance must be positive".to_string(),
            ));
        }

        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = *signing_key.verifying_key();

        let mut state = self.state();
        state.next_account += 1;
        let account_id = format!("{ACCOUNT_PREFIX}{}", state.next_account);
        state.accounts.insert(
            account_id.clone(),
            Account {
                verifying_key,
                balance: initial_balance,
            },
        );

        Ok(LedgerAccount {
            account_id,
            public_key: hex::encode(verifying_key.to_encoded_point(true).as_bytes()),
            private_key: Zeroizing::new(signing_key.to_bytes().to_vec()),
        })
    }

    async fn get_balance(&self, account_id: &str) -> Result<Decimal, LedgerError> {
        self.calls.get_balance.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;
        validate_account_id(account_id)?;

        self.state()
            .accounts
            .get(account_id)
            .map(|a| a.balance)
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    async fn prepare_transfer(
        &self,
        instruction: &TransferInstruction,
        signing_key: &[u8],
    ) -> Result<PreparedTransfer, LedgerError> {
        self.calls.prepare_transfer.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;
        validate_account_id(&instruction.from)?;
        validate_account_id(&instruction.to)?;
        if instruction.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidParameters(
                "amount must be positive".to_string(),
            ));
        }

        let signing_key =
            SigningKey::from_slice(signing_key).map_err(|e| LedgerError::InvalidKey(e.to_string()))?;

        let mut state = self.state();
        let sender = state
            .accounts
            .get(&instruction.from)
            .ok_or_else(|| LedgerError::TransferRejected(format!("unknown account {}", instruction.from)))?;
        if sender.verifying_key != *signing_key.verifying_key() {
            return Err(LedgerError::TransferRejected(format!(
                "signing key does not control {}",
                instruction.from
            )));
        }
        if sender.balance < instruction.amount {
            return Err(LedgerError::TransferRejected("insufficient funds".to_string()));
        }
        if !state.accounts.contains_key(&instruction.to) {
            return Err(LedgerError::TransferRejected(format!(
                "unknown account {}",
                instruction.to
            )));
        }

        state.next_tx += 1;
        let transaction_id = format!("{}@{:010}", instruction.from, state.next_tx);
        state.in_flight.insert(transaction_id.clone());

        let signature: Signature = signing_key.sign(&signing_message(instruction, &transaction_id));

        Ok(PreparedTransfer {
            transaction_id,
            instruction: instruction.clone(),
            payload: signature.to_bytes().to_vec(),
        })
    }

    async fn broadcast_transfer(&self, prepared: &PreparedTransfer) -> Result<String, LedgerError> {
        self.calls.broadcast_transfer.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self
            .broadcast_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            hook();
        }
        let tx_id = prepared.transaction_id.clone();
        let mut state = self.state();

        if !self.available.load(Ordering::SeqCst) {
            state.in_flight.remove(&tx_id);
            return Err(LedgerError::Unavailable("simulated outage".to_string()));
        }

        match state.transactions.get(&tx_id) {
            Some(TxEntry::Settled) => return Ok(tx_id),
            Some(TxEntry::Failed(reason)) => return Err(LedgerError::TransferRejected(reason.clone())),
            None => {}
        }

        let fault = state.faults.pop_front();
        if fault == Some(BroadcastFault::TimeoutBeforeApply) {
            state.in_flight.remove(&tx_id);
            return Err(LedgerError::TimedOut { transaction_id: tx_id });
        }
        if let Some(BroadcastFault::Reject(reason)) = fault {
            state.in_flight.remove(&tx_id);
            state.transactions.insert(tx_id, TxEntry::Failed(reason.clone()));
            return Err(LedgerError::TransferRejected(reason));
        }

        let signature = Signature::from_slice(&prepared.payload)
            .map_err(|_| LedgerError::TransferRejected("malformed signature".to_string()))?;
        let verified = state
            .accounts
            .get(&prepared.instruction.from)
            .map(|a| {
                a.verifying_key
                    .verify(&signing_message(&prepared.instruction, &tx_id), &signature)
                    .is_ok()
            })
            .unwrap_or(false);
        state.in_flight.remove(&tx_id);
        if !verified {
            let reason = "invalid signature".to_string();
            state.transactions.insert(tx_id, TxEntry::Failed(reason.clone()));
            return Err(LedgerError::TransferRejected(reason));
        }

        match apply(&mut state, &prepared.instruction) {
            Ok(()) => {
                state.transactions.insert(tx_id.clone(), TxEntry::Settled);
            }
            Err(reason) => {
                state.transactions.insert(tx_id, TxEntry::Failed(reason.clone()));
                return Err(LedgerError::TransferRejected(reason));
            }
        }

        if fault == Some(BroadcastFault::TimeoutAfterApply) {
            return Err(LedgerError::TimedOut { transaction_id: tx_id });
        }
        Ok(tx_id)
    }

    async fn release(&self, prepared: &PreparedTransfer) {
        self.state().in_flight.remove(&prepared.transaction_id);
    }

    async fn lookup_transfer(&self, lookup: &TransferLookup) -> Result<LedgerOutcome, LedgerError> {
        self.calls.lookup_transfer.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;

        let state = self.state();
        let outcome = match state.transactions.get(&lookup.transaction_id) {
            Some(TxEntry::Settled) => LedgerOutcome::Settled {
                transaction_id: lookup.transaction_id.clone(),
            },
            Some(TxEntry::Failed(reason)) => LedgerOutcome::Failed {
                reason: reason.clone(),
            },
            None if state.in_flight.contains(&lookup.transaction_id) => LedgerOutcome::Unknown,
            None => LedgerOutcome::Failed {
                reason: "transaction not found on ledger".to_string(),
            },
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn instruction(from: &str, to: &str, amount: &str) -> TransferInstruction {
        TransferInstruction {
            from: from.to_string(),
            to: to.to_string(),
            amount: dec(amount),
            memo: Some("thanks".to_string()),
        }
    }

    fn lookup(id: &str) -> TransferLookup {
        TransferLookup {
            transaction_id: id.to_string(),
            submitted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn transfer_is_zero_sum() {
        let ledger = InMemoryLedger::new();
        let alice = ledger.create_account(dec("5")).await.unwrap();
        let bob = ledger.create_account(dec("1")).await.unwrap();

        let tx_id = ledger
            .submit_transfer(&alice.account_id, &bob.account_id, dec("2"), &alice.private_key, Some("thanks"))
            .await
            .unwrap();

        assert_eq!(ledger.get_balance(&alice.account_id).await.unwrap(), dec("3"));
        assert_eq!(ledger.get_balance(&bob.account_id).await.unwrap(), dec("3"));
        assert_eq!(
            ledger.lookup_transfer(&lookup(&tx_id)).await.unwrap(),
            LedgerOutcome::Settled { transaction_id: tx_id }
        );
    }

    #[tokio::test]
    async fn overdraft_and_foreign_key_are_rejected() {
        let ledger = InMemoryLedger::new();
        let alice = ledger.create_account(dec("1")).await.unwrap();
        let bob = ledger.create_account(dec("1")).await.unwrap();

        let overdraft = ledger
            .prepare_transfer(&instruction(&alice.account_id, &bob.account_id, "2"), &alice.private_key)
            .await;
        assert!(matches!(overdraft, Err(LedgerError::TransferRejected(_))));

        let wrong_key = ledger
            .prepare_transfer(&instruction(&alice.account_id, &bob.account_id, "0.5"), &bob.private_key)
            .await;
        assert!(matches!(wrong_key, Err(LedgerError::TransferRejected(_))));
        assert_eq!(ledger.settled_transfers(), 0);
    }

    #[tokio::test]
    async fn tampered_payload_fails_signature_check() {
        let ledger = InMemoryLedger::new();
        let alice = ledger.create_account(dec("5")).await.unwrap();
        let bob = ledger.create_account(dec("1")).await.unwrap();

        let mut prepared = ledger
            .prepare_transfer(&instruction(&alice.account_id, &bob.account_id, "1"), &alice.private_key)
            .await
            .unwrap();
        prepared.instruction.amount = dec("4");

        let err = ledger.broadcast_transfer(&prepared).await.unwrap_err();
        assert_eq!(err, LedgerError::TransferRejected("invalid signature".to_string()));
        assert_eq!(ledger.get_balance(&alice.account_id).await.unwrap(), dec("5"));
    }

    #[tokio::test]
    async fn timeout_after_apply_settles_on_lookup() {
        let ledger = InMemoryLedger::new();
        let alice = ledger.create_account(dec("5")).await.unwrap();
        let bob = ledger.create_account(dec("0.1")).await.unwrap();
        ledger.fail_next_broadcast(BroadcastFault::TimeoutAfterApply);

        let prepared = ledger
            .prepare_transfer(&instruction(&alice.account_id, &bob.account_id, "2"), &alice.private_key)
            .await
            .unwrap();
        let err = ledger.broadcast_transfer(&prepared).await.unwrap_err();
        assert!(matches!(err, LedgerError::TimedOut { .. }));

        assert!(matches!(
            ledger.lookup_transfer(&lookup(&prepared.transaction_id)).await.unwrap(),
            LedgerOutcome::Settled { .. }
        ));
        assert_eq!(ledger.get_balance(&alice.account_id).await.unwrap(), dec("3"));
    }

    #[tokio::test]
    async fn in_flight_is_unknown_and_dropped_is_failed() {
        let ledger = InMemoryLedger::new();
        let alice = ledger.create_account(dec("5")).await.unwrap();
        let bob = ledger.create_account(dec("1")).await.unwrap();

        let prepared = ledger
            .prepare_transfer(&instruction(&alice.account_id, &bob.account_id, "1"), &alice.private_key)
            .await
            .unwrap();
        assert_eq!(
            ledger.lookup_transfer(&lookup(&prepared.transaction_id)).await.unwrap(),
            LedgerOutcome::Unknown
        );

        ledger.fail_next_broadcast(BroadcastFault::TimeoutBeforeApply);
        assert!(ledger.broadcast_transfer(&prepared).await.is_err());
        assert!(matches!(
            ledger.lookup_transfer(&lookup(&prepared.transaction_id)).await.unwrap(),
            LedgerOutcome::Failed { .. }
        ));
        assert_eq!(ledger.settled_transfers(), 0);
    }

    #[tokio::test]
    async fn released_transfer_is_never_applied() {
        let ledger = InMemoryLedger::new();
        let alice = ledger.create_account(dec("5")).await.unwrap();
        let bob = ledger.create_account(dec("1")).await.unwrap();

        let prepared = ledger
            .prepare_transfer(&instruction(&alice.account_id, &bob.account_id, "1"), &alice.private_key)
            .await
            .unwrap();
        ledger.release(&prepared).await;

        assert!(matches!(
            ledger.lookup_transfer(&lookup(&prepared.transaction_id)).await.unwrap(),
            LedgerOutcome::Failed { .. }
        ));
        assert_eq!(ledger.get_balance(&alice.account_id).await.unwrap(), dec("5"));
    }

    #[tokio::test]
    async fn unknown_and_malformed_accounts() {
        let ledger = InMemoryLedger::new();
        assert_eq!(
            ledger.get_balance("acct-42").await.unwrap_err(),
            LedgerError::AccountNotFound("acct-42".to_string())
        );
        assert!(matches!(
            ledger.get_balance("0.0.42").await,
            Err(LedgerError::InvalidAccountId(_))
        ));
        assert!(matches!(
            ledger.create_account(Decimal::ZERO).await,
            Err(LedgerError::InvalidParameters(_))
        ));
    }

    #[tokio::test]
    async fn outage_fails_every_call_and_counts_them() {
        let ledger = InMemoryLedger::new();
        ledger.set_available(false);
        assert!(matches!(
            ledger.create_account(Decimal::ONE).await,
            Err(LedgerError::Unavailable(_))
        ));
        assert!(matches!(
            ledger.get_balance("acct-1").await,
            Err(LedgerError::Unavailable(_))
        ));

        let calls = ledger.calls();
        assert_eq!(calls.create_account, 1);
        assert_eq!(calls.get_balance, 1);
        assert_eq!(calls.total(), 2);
    }
}
