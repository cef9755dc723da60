// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Avalanche C-Chain ledger client.
//!
//! Accounts are plain secp256k1 EOAs. An account only exists on-chain once
//! it holds value or has sent a transaction, so provisioning funds every new
//! address from the operator (treasury) key. Transfers are native-coin
//! EIP-1559 transactions; the memo travels as UTF-8 input data.
//!
//! Nonces are assigned here rather than by the provider: two transactions
//! from one address in flight at once would otherwise both read the node's
//! count and collide.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use alloy::{
    eips::Encodable2718,
    network::{Ethereum, EthereumWallet},
    primitives::{keccak256, Address, TxHash},
    providers::{
        fillers::{BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller},
        DynProvider, Identity, Provider, ProviderBuilder, RootProvider, SendableTx,
    },
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    transports::TransportError,
};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use zeroize::Zeroizing;

use super::types::{NetworkConfig, NATIVE_DECIMALS};
use super::units::{from_base_units, to_base_units};
use super::{
    LedgerAccount, LedgerClient, LedgerError, LedgerOutcome, PreparedTransfer,
    TransferInstruction, TransferLookup,
};

/// HTTP provider type for Avalanche C-Chain (with all fillers).
type HttpProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider<Ethereum>,
>;

/// How often to poll for a receipt while waiting.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A hash the node has never heard of after this long was dropped.
const DROP_WINDOW_SECS: i64 = 600;

/// Node error messages that refuse the transaction itself. Any other error
/// says nothing about whether it was or will be applied.
const DENIALS: &[&str] = &[
    "insufficient funds",
    "nonce too low",
    "intrinsic gas too low",
    "invalid sender",
    "invalid signature",
    "underpriced",
];

type NonceSlot = Arc<tokio::sync::Mutex<Option<u64>>>;

/// Next nonce to hand out per sending address.
///
/// A slot is locked from the nonce read until the transaction holding it is
/// signed (prepare) or sent (funding). `None` means "ask the node".
#[derive(Default)]
struct NonceTracker {
    slots: Mutex<HashMap<Address, NonceSlot>>,
}

impl NonceTracker {
    fn slot(&self, address: Address) -> NonceSlot {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(address)
            .or_default()
            .clone()
    }

    async fn forget(&self, address: Address) {
        *self.slot(address).lock().await = None;
    }
}

/// The node's pending count, unless more nonces were handed out locally.
fn next_nonce(handed_out: Option<u64>, on_node: u64) -> u64 {
    handed_out.map_or(on_node, |next| next.max(on_node))
}

/// Avalanche C-Chain implementation of [`LedgerClient`].
pub struct AvalancheLedger {
    network: NetworkConfig,
    rpc_url: url::Url,
    provider: HttpProvider,
    /// Long-lived provider signing with the operator key.
    funding: DynProvider,
    operator_address: Address,
    nonces: NonceTracker,
    receipt_timeout: Duration,
}

impl AvalancheLedger {
    /// Create a client for `network`, funding new accounts from `operator_key_hex`.
    ///
    /// `rpc_url` overrides the network's default endpoint.
    pub fn new(
        network: NetworkConfig,
        rpc_url: Option<&str>,
        operator_key_hex: &str,
        receipt_timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let rpc_url: url::Url = rpc_url
            .unwrap_or(network.rpc_url)
            .parse()
            .map_err(|e: url::ParseError| {
                LedgerError::InvalidParameters(format!("invalid RPC URL: {e}"))
            })?;

        let operator = signer_from_hex(operator_key_hex)?;
        let operator_address = operator.address();

        let provider = ProviderBuilder::new().connect_http(rpc_url.clone());
        let funding = ProviderBuilder::new()
            .wallet(EthereumWallet::from(operator))
            .connect_http(rpc_url.clone())
            .erased();

        tracing::info!(
            network = network.name,
            chain_id = network.chain_id,
            operator = %operator_address,
            "Avalanche ledger client configured"
        );

        Ok(Self {
            network,
            rpc_url,
            provider,
            funding,
            operator_address,
            nonces: NonceTracker::default(),
            receipt_timeout,
        })
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, TransportError> {
        self.provider.get_transaction_count(address).pending().await
    }

    /// Poll for a receipt until the configured timeout.
    ///
    /// Returns `Some(success)` once mined, `None` if the deadline passed.
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Option<bool> {
        let deadline = tokio::time::Instant::now() + self.receipt_timeout;
        loop {
            match self.provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => return Some(receipt.status()),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(tx_hash = %tx_hash, error = %e, "Receipt poll failed");
                }
            }
            if tokio::time::Instant::now() + RECEIPT_POLL_INTERVAL >= deadline {
                return None;
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }

    fn explorer_link(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.network.explorer_url, tx_hash)
    }
}

#[async_trait]
impl LedgerClient for AvalancheLedger {
    fn network_name(&self) -> &str {
        self.network.name
    }

    async fn create_account(&self, initial_balance: Decimal) -> Result<LedgerAccount, LedgerError> {
        if initial_balance <= Decimal::ZERO {
            return Err(LedgerError::InvalidParameters(
                "initial balance must be positive: an unfunded EVM account does not exist"
                    .to_string(),
            ));
        }
        let value = to_base_units(initial_balance, NATIVE_DECIMALS)?;

        let (private_key, public_key, address) = generate_secp256k1_keypair();

        let tx_hash = {
            let slot = self.nonces.slot(self.operator_address);
            let mut next = slot.lock().await;
            let on_node = self.pending_nonce(self.operator_address).await.map_err(|e| {
                LedgerError::Unavailable(format!("failed to read operator nonce: {e}"))
            })?;
            let nonce = next_nonce(*next, on_node);
            let tx = TransactionRequest::default()
                .from(self.operator_address)
                .to(address)
                .value(value)
                .nonce(nonce);

            match self.funding.send_transaction(tx).await {
                Ok(pending) => {
                    *next = Some(nonce + 1);
                    *pending.tx_hash()
                }
                Err(e) => {
                    *next = None;
                    return Err(LedgerError::Unavailable(format!(
                        "funding transaction not accepted: {e}"
                    )));
                }
            }
        };

        match self.wait_for_receipt(tx_hash).await {
            Some(true) => {}
            Some(false) => {
                return Err(LedgerError::Unavailable(format!(
                    "funding transaction {tx_hash:?} reverted"
                )));
            }
            None => {
                // The key is returned so the account is not lost if the funding lands later.
                tracing::warn!(
                    account_id = %address,
                    tx_hash = ?tx_hash,
                    "Funding not confirmed in time; returning account anyway"
                );
            }
        }

        Ok(LedgerAccount {
            account_id: format!("{address:?}"),
            public_key,
            private_key,
        })
    }

    async fn get_balance(&self, account_id: &str) -> Result<Decimal, LedgerError> {
        let addr = parse_address(account_id)?;

        let balance = self
            .provider
            .get_balance(addr)
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        if balance.is_zero() {
            let nonce = self
                .provider
                .get_transaction_count(addr)
                .await
                .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
            if nonce == 0 {
                return Err(LedgerError::AccountNotFound(account_id.to_string()));
            }
        }

        from_base_units(balance, NATIVE_DECIMALS)
    }

    async fn prepare_transfer(
        &self,
        instruction: &TransferInstruction,
        signing_key: &[u8],
    ) -> Result<PreparedTransfer, LedgerError> {
        let from = parse_address(&instruction.from)?;
        let to = parse_address(&instruction.to)?;
        if instruction.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidParameters(
                "amount must be positive".to_string(),
            ));
        }
        let value = to_base_units(instruction.amount, NATIVE_DECIMALS)?;

        let signer = PrivateKeySigner::from_slice(signing_key)
            .map_err(|e| LedgerError::InvalidKey(e.to_string()))?;
        if signer.address() != from {
            return Err(LedgerError::TransferRejected(format!(
                "signing key does not control {}",
                instruction.from
            )));
        }

        let mut tx = TransactionRequest::default().from(from).to(to).value(value);
        if let Some(memo) = instruction.memo.as_deref().filter(|m| !m.is_empty()) {
            tx = tx.input(memo.as_bytes().to_vec().into());
        }

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(self.rpc_url.clone());

        let slot = self.nonces.slot(from);
        let mut next = slot.lock().await;
        let on_node = self
            .pending_nonce(from)
            .await
            .map_err(|e| classify_prepare_error("failed to read nonce", &e))?;
        let nonce = next_nonce(*next, on_node);
        let sendable = provider
            .fill(tx.nonce(nonce))
            .await
            .map_err(|e| classify_prepare_error("failed to prepare transfer", &e))?;
        *next = Some(nonce + 1);
        drop(next);

        let envelope = match sendable {
            SendableTx::Envelope(envelope) => envelope,
            SendableTx::Builder(_) => {
                return Err(LedgerError::InvalidKey(
                    "transaction was filled but not signed".to_string(),
                ));
            }
        };

        Ok(PreparedTransfer {
            transaction_id: format!("{:?}", envelope.tx_hash()),
            instruction: instruction.clone(),
            payload: envelope.encoded_2718(),
        })
    }

    async fn broadcast_transfer(&self, prepared: &PreparedTransfer) -> Result<String, LedgerError> {
        let tx_hash = TxHash::from_str(&prepared.transaction_id)
            .map_err(|e| LedgerError::InvalidParameters(format!("invalid tx hash: {e}")))?;
        let timed_out = || LedgerError::TimedOut {
            transaction_id: prepared.transaction_id.clone(),
        };

        if let Err(e) = self.provider.send_raw_transaction(&prepared.payload).await {
            match e.as_error_resp().map(|payload| payload.message.to_string()) {
                // Re-submission of an identical payload; fall through to the receipt wait.
                Some(message) if message.contains("already known") => {}
                Some(message) if is_denial(&message) => {
                    if let Ok(from) = parse_address(&prepared.instruction.from) {
                        self.nonces.forget(from).await;
                    }
                    return Err(LedgerError::TransferRejected(message));
                }
                _ => {
                    tracing::warn!(
                        tx_hash = %prepared.transaction_id,
                        error = %e,
                        "Broadcast failed; outcome unknown"
                    );
                    return Err(timed_out());
                }
            }
        }

        match self.wait_for_receipt(tx_hash).await {
            Some(true) => {
                tracing::info!(
                    tx_hash = %prepared.transaction_id,
                    explorer = %self.explorer_link(&prepared.transaction_id),
                    "Transfer confirmed"
                );
                Ok(prepared.transaction_id.clone())
            }
            Some(false) => Err(LedgerError::TransferRejected(format!(
                "transaction {} reverted",
                prepared.transaction_id
            ))),
            None => Err(timed_out()),
        }
    }

    async fn release(&self, prepared: &PreparedTransfer) {
        if let Ok(from) = parse_address(&prepared.instruction.from) {
            self.nonces.forget(from).await;
        }
    }

    async fn lookup_transfer(&self, lookup: &TransferLookup) -> Result<LedgerOutcome, LedgerError> {
        let tx_hash = TxHash::from_str(&lookup.transaction_id)
            .map_err(|e| LedgerError::InvalidParameters(format!("invalid tx hash: {e}")))?;

        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| LedgerError::Unavailable(format!("failed to get receipt: {e}")))?;

        if let Some(receipt) = receipt {
            return Ok(if receipt.status() {
                LedgerOutcome::Settled {
                    transaction_id: lookup.transaction_id.clone(),
                }
            } else {
                LedgerOutcome::Failed {
                    reason: format!(
                        "reverted in block {}",
                        receipt.block_number.unwrap_or_default()
                    ),
                }
            });
        }

        let known = self
            .provider
            .get_transaction_by_hash(tx_hash)
            .await
            .map_err(|e| LedgerError::Unavailable(format!("failed to get transaction: {e}")))?;
        if known.is_some() {
            return Ok(LedgerOutcome::Unknown);
        }

        let age = Utc::now() - lookup.submitted_at;
        if age > chrono::Duration::seconds(DROP_WINDOW_SECS) {
            Ok(LedgerOutcome::Failed {
                reason: "transaction dropped by the network".to_string(),
            })
        } else {
            Ok(LedgerOutcome::Unknown)
        }
    }

    async fn shutdown(&self) {
        tracing::info!(network = self.network.name, "Avalanche ledger client shut down");
    }
}

fn parse_address(account_id: &str) -> Result<Address, LedgerError> {
    Address::from_str(account_id).map_err(|e| LedgerError::InvalidAccountId(format!("{account_id}: {e}")))
}

fn signer_from_hex(private_key_hex: &str) -> Result<PrivateKeySigner, LedgerError> {
    let trimmed = private_key_hex.trim();
    let key_bytes = Zeroizing::new(
        alloy::hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
            .map_err(|e| LedgerError::InvalidKey(e.to_string()))?,
    );
    PrivateKeySigner::from_slice(&key_bytes).map_err(|e| LedgerError::InvalidKey(e.to_string()))
}

fn is_denial(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    DENIALS.iter().any(|denial| message.contains(denial))
}

/// Nothing has been sent yet, so anything short of a denial is retryable.
fn classify_prepare_error(context: &str, err: &TransportError) -> LedgerError {
    let message = match err.as_error_resp() {
        Some(payload) => payload.message.to_string(),
        None => err.to_string(),
    };
    if is_denial(&message) {
        LedgerError::TransferRejected(message)
    } else {
        LedgerError::Unavailable(format!("{context}: {message}"))
    }
}

/// Generate a secp256k1 keypair and derive its C-Chain address.
///
/// The address is the last 20 bytes of keccak256 over the uncompressed
/// public key without its 0x04 prefix. Returns
/// `(private_key, compressed_public_key_hex, address)`.
fn generate_secp256k1_keypair() -> (Zeroizing<Vec<u8>>, String, Address) {
    use k256::ecdsa::SigningKey;
    use k256::elliptic_curve::rand_core::OsRng;

    let signing_key = SigningKey::random(&mut OsRng);
    let verifying_key = signing_key.verifying_key();

    let uncompressed = verifying_key.to_encoded_point(false);
    let hash = keccak256(&uncompressed.as_bytes()[1..]);
    let address = Address::from_slice(&hash[12..]);

    let public_key = hex::encode(verifying_key.to_encoded_point(true).as_bytes());
    let private_key = Zeroizing::new(signing_key.to_bytes().to_vec());

    (private_key, public_key, address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::AVAX_FUJI;

    // Well-known development key (anvil/hardhat account #0).
    const OPERATOR_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn offline_ledger() -> AvalancheLedger {
        AvalancheLedger::new(
            AVAX_FUJI,
            Some("http://127.0.0.1:1"),
            OPERATOR_KEY,
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn generated_address_matches_alloy_signer() {
        for _ in 0..5 {
            let (private_key, public_key, address) = generate_secp256k1_keypair();
            let signer = PrivateKeySigner::from_slice(&private_key).unwrap();
            assert_eq!(signer.address(), address);
            assert_eq!(public_key.len(), 66, "compressed SEC1 key is 33 bytes");
            assert!(format!("{address:?}").starts_with("0x"));
        }
    }

    #[test]
    fn generated_addresses_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10 {
            let (_, _, address) = generate_secp256k1_keypair();
            assert!(seen.insert(address));
        }
    }

    #[test]
    fn rejects_bad_operator_key_and_url() {
        let bad_key = AvalancheLedger::new(AVAX_FUJI, None, "not-hex", Duration::from_secs(1));
        assert!(matches!(bad_key, Err(LedgerError::InvalidKey(_))));

        let bad_url =
            AvalancheLedger::new(AVAX_FUJI, Some("not a url"), OPERATOR_KEY, Duration::from_secs(1));
        assert!(matches!(bad_url, Err(LedgerError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn invalid_account_id_is_rejected_before_rpc() {
        let ledger = offline_ledger();
        let err = ledger.get_balance("0.0.1234").await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAccountId(_)));
    }

    #[tokio::test]
    async fn unreachable_node_is_unavailable() {
        let ledger = offline_ledger();
        let err = ledger
            .get_balance("0x1111111111111111111111111111111111111111")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unavailable(_)));
    }

    #[tokio::test]
    async fn non_positive_initial_balance_is_invalid() {
        let ledger = offline_ledger();
        let err = ledger.create_account(Decimal::ZERO).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidParameters(_)));
    }

    /// JSON-RPC node that answers every call with the same error.
    async fn failing_node(code: i64, message: &'static str) -> String {
        use axum::{routing::post, Json, Router};
        use serde_json::{json, Value};

        let reply = move |request: &Value| {
            json!({
                "jsonrpc": "2.0",
                "id": request["id"].clone(),
                "error": { "code": code, "message": message },
            })
        };
        let app = Router::new().route(
            "/",
            post(move |Json(request): Json<Value>| async move {
                Json(match &request {
                    Value::Array(batch) => Value::Array(batch.iter().map(reply).collect()),
                    single => reply(single),
                })
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn ledger_at(url: &str) -> AvalancheLedger {
        AvalancheLedger::new(AVAX_FUJI, Some(url), OPERATOR_KEY, Duration::from_secs(1)).unwrap()
    }

    fn own_transfer() -> (TransferInstruction, Zeroizing<Vec<u8>>) {
        let (key, _, address) = generate_secp256k1_keypair();
        let instruction = TransferInstruction {
            from: format!("{address:?}"),
            to: "0x2222222222222222222222222222222222222222".to_string(),
            amount: Decimal::ONE,
            memo: None,
        };
        (instruction, key)
    }

    fn signed(instruction: TransferInstruction) -> PreparedTransfer {
        PreparedTransfer {
            transaction_id: format!("{:?}", TxHash::ZERO),
            instruction,
            payload: vec![0x02, 0xc0],
        }
    }

    #[test]
    fn only_known_denials_are_rejections() {
        assert!(is_denial("insufficient funds for gas * price + value"));
        assert!(is_denial("Nonce too low: next nonce 7, tx nonce 5"));
        assert!(is_denial("replacement transaction underpriced"));
        assert!(!is_denial("rate limit exceeded, retry later"));
        assert!(!is_denial("internal error"));
        assert!(!is_denial("504 Gateway Timeout"));
    }

    #[test]
    fn local_nonces_run_ahead_of_the_node() {
        assert_eq!(next_nonce(None, 4), 4);
        assert_eq!(next_nonce(Some(6), 4), 6);
        assert_eq!(next_nonce(Some(3), 4), 4);
    }

    #[tokio::test]
    async fn concurrent_reservations_get_distinct_nonces() {
        let tracker = Arc::new(NonceTracker::default());
        let address = Address::repeat_byte(0x11);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    let slot = tracker.slot(address);
                    let mut next = slot.lock().await;
                    let nonce = next_nonce(*next, 9);
                    tokio::task::yield_now().await;
                    *next = Some(nonce + 1);
                    nonce
                })
            })
            .collect();

        let mut nonces = Vec::new();
        for handle in handles {
            nonces.push(handle.await.unwrap());
        }
        nonces.sort_unstable();
        assert_eq!(nonces, vec![9, 10, 11, 12]);

        tracker.forget(address).await;
        assert_eq!(*tracker.slot(address).lock().await, None);
    }

    #[tokio::test]
    async fn rate_limited_prepare_is_unavailable() {
        let url = failing_node(-32005, "rate limit exceeded, retry later").await;
        let (instruction, key) = own_transfer();

        let err = ledger_at(&url).prepare_transfer(&instruction, &key).await.unwrap_err();
        assert!(matches!(err, LedgerError::Unavailable(_)), "{err}");
    }

    #[tokio::test]
    async fn unfunded_prepare_is_rejected() {
        let url = failing_node(-32000, "insufficient funds for gas * price + value").await;
        let (instruction, key) = own_transfer();

        let err = ledger_at(&url).prepare_transfer(&instruction, &key).await.unwrap_err();
        assert!(matches!(err, LedgerError::TransferRejected(_)), "{err}");
    }

    #[tokio::test]
    async fn node_error_during_broadcast_is_a_timeout() {
        let url = failing_node(-32603, "internal error").await;
        let (instruction, _) = own_transfer();

        let err = ledger_at(&url).broadcast_transfer(&signed(instruction)).await.unwrap_err();
        assert!(matches!(err, LedgerError::TimedOut { .. }), "{err}");
    }

    #[tokio::test]
    async fn stale_nonce_at_broadcast_is_rejected() {
        let url = failing_node(-32000, "nonce too low").await;
        let (instruction, _) = own_transfer();

        let err = ledger_at(&url).broadcast_transfer(&signed(instruction)).await.unwrap_err();
        assert!(matches!(err, LedgerError::TransferRejected(_)), "{err}");
    }

    #[tokio::test]
    async fn foreign_signing_key_is_rejected() {
        let ledger = offline_ledger();
        let (other_key, _, _) = generate_secp256k1_keypair();
        let instruction = TransferInstruction {
            from: "0x1111111111111111111111111111111111111111".to_string(),
            to: "0x2222222222222222222222222222222222222222".to_string(),
            amount: Decimal::ONE,
            memo: None,
        };

        let err = ledger
            .prepare_transfer(&instruction, &other_key)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::TransferRejected(_)));
    }
}
