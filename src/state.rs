// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{AppConfig, WalletConfig, WalletSettings};
use crate::ledger::avalanche::AvalancheLedger;
use crate::ledger::LedgerClient;
use crate::storage::{WalletDatabase, DATABASE_FILE};
use crate::vault::KeyVault;
use crate::wallet::{WalletError, WalletServices};

#[derive(Clone)]
pub struct AppState {
    wallet: Option<WalletServices>,
    /// Why the wallet subsystem is off, when it is.
    pub disabled_reason: Option<String>,
    pub data_dir: PathBuf,
}

impl AppState {
    pub fn new(wallet: WalletServices, data_dir: PathBuf) -> Self {
        Self {
            wallet: Some(wallet),
            disabled_reason: None,
            data_dir,
        }
    }

    /// State for a server whose wallet subsystem could not be configured.
    pub fn disabled(reason: impl Into<String>, data_dir: PathBuf) -> Self {
        Self {
            wallet: None,
            disabled_reason: Some(reason.into()),
            data_dir,
        }
    }

    /// Build the state from configuration. Failures disable the wallet
    /// subsystem instead of stopping the server.
    pub fn from_config(config: &AppConfig) -> Self {
        let data_dir = config.data_dir.clone();
        match &config.wallet {
            WalletSettings::Disabled { reason } => {
                tracing::warn!(reason = %reason, "Wallet subsystem disabled");
                Self::disabled(reason.clone(), data_dir)
            }
            WalletSettings::Enabled(wallet_config) => {
                match build_services(&data_dir, wallet_config) {
                    Ok(services) => {
                        tracing::info!(
                            network = services.ledger.network_name(),
                            "Wallet subsystem enabled"
                        );
                        Self::new(services, data_dir)
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Wallet subsystem failed to start");
                        Self::disabled(e.to_string(), data_dir)
                    }
                }
            }
        }
    }

    pub fn wallet(&self) -> Result<&WalletServices, WalletError> {
        self.wallet.as_ref().ok_or(WalletError::FeatureDisabled)
    }

    pub fn wallet_enabled(&self) -> bool {
        self.wallet.is_some()
    }
}

fn build_services(data_dir: &Path, config: &WalletConfig) -> Result<WalletServices, WalletError> {
    let db = WalletDatabase::open(&data_dir.join(DATABASE_FILE))?;

    let vault = match &config.encryption_key {
        Some(key) => KeyVault::new(key)?,
        None => {
            tracing::warn!(
                "WALLET_ENCRYPTION_KEY not set; using an ephemeral key. \
                 Wallets created by this process cannot be used after a restart"
            );
            KeyVault::ephemeral()
        }
    };

    let ledger = build_ledger(config)?;

    Ok(WalletServices::new(
        Arc::new(db),
        Arc::new(vault),
        ledger,
        config.initial_balance,
    ))
}

fn build_ledger(config: &WalletConfig) -> Result<Arc<dyn LedgerClient>, WalletError> {
    let Some(network) = config.network.evm_config() else {
        return memory_ledger();
    };
    let operator_key = config.operator_key.as_ref().ok_or_else(|| {
        WalletError::Configuration(format!("operator key is required on {}", network.name))
    })?;

    let ledger = AvalancheLedger::new(
        network,
        config.rpc_url.as_deref(),
        operator_key,
        config.ledger_timeout,
    )
    .map_err(|e| WalletError::Configuration(e.to_string()))?;
    Ok(Arc::new(ledger))
}

#[cfg(any(test, feature = "dev"))]
fn memory_ledger() -> Result<Arc<dyn LedgerClient>, WalletError> {
    tracing::warn!("Using the in-memory ledger; balances are not real");
    Ok(Arc::new(crate::ledger::memory::InMemoryLedger::new()))
}

#[cfg(not(any(test, feature = "dev")))]
fn memory_ledger() -> Result<Arc<dyn LedgerClient>, WalletError> {
    Err(WalletError::Configuration(
        "the in-memory ledger requires the `dev` feature".to_string(),
    ))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerNetwork;

    #[test]
    fn disabled_state_reports_feature_disabled() {
        let state = AppState::disabled("no operator key", PathBuf::from("/tmp"));
        assert!(!state.wallet_enabled());
        assert!(matches!(state.wallet(), Err(WalletError::FeatureDisabled)));
        assert_eq!(state.disabled_reason.as_deref(), Some("no operator key"));
    }

    fn wallet_config(network: LedgerNetwork) -> WalletConfig {
        WalletConfig {
            network,
            rpc_url: None,
            operator_key: None,
            encryption_key: None,
            ledger_timeout: std::time::Duration::from_secs(1),
            initial_balance: rust_decimal::Decimal::ONE,
            reconcile_interval: std::time::Duration::from_secs(60),
        }
    }

    fn app_config(dir: &Path, wallet: WalletSettings) -> AppConfig {
        AppConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            data_dir: dir.to_path_buf(),
            log_format: Default::default(),
            tls: None,
            wallet,
            warnings: Vec::new(),
        }
    }

    #[tokio::test]
    async fn from_config_builds_memory_services() {
        let dir = tempfile::tempdir().unwrap();
        let config = app_config(
            dir.path(),
            WalletSettings::Enabled(wallet_config(LedgerNetwork::Memory)),
        );

        let state = AppState::from_config(&config);
        let services = state.wallet().unwrap();
        services.directory.create_wallet(1).await.unwrap();
        assert!(dir.path().join(DATABASE_FILE).exists());
    }

    #[test]
    fn missing_operator_key_disables_evm_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let config = app_config(
            dir.path(),
            WalletSettings::Enabled(wallet_config(LedgerNetwork::Fuji)),
        );

        let state = AppState::from_config(&config);
        assert!(!state.wallet_enabled());
        assert!(state.disabled_reason.unwrap().contains("operator key"));
    }

    #[test]
    fn enabled_state_exposes_services() {
        let (state, _ledger, _dir) = test_support::enabled_state();
        assert!(state.wallet().is_ok());
        assert!(state.disabled_reason.is_none());
    }
}
