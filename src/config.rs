// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variables are read once at startup into an [`AppConfig`].
//! A bad wallet/ledger setting never stops the server: the wallet subsystem
//! is reported disabled with the reason, and health endpoints keep working.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding `wallet.redb` | `./data` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `WALLET_ENCRYPTION_KEY` | Hex AES-256 key sealing user keys | ephemeral, with a warning |
//! | `LEDGER_ENABLED` | Explicit on/off switch | on iff an operator key is set |
//! | `LEDGER_NETWORK` | `fuji`, `mainnet` (`memory` with the `dev` feature) | `fuji` |
//! | `LEDGER_RPC_URL` | RPC endpoint override | network default |
//! | `LEDGER_OPERATOR_KEY` | Hex key of the account funding new wallets | none |
//! | `LEDGER_TIMEOUT_SECS` | Receipt wait bound | `30` |
//! | `INITIAL_ACCOUNT_BALANCE` | Funding for each new account | `1` |
//! | `RECONCILE_INTERVAL_SECS` | Reconciler period | `60` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files enabling HTTPS | plain HTTP |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use zeroize::Zeroizing;

use crate::ledger::LedgerNetwork;
use crate::reconciler::DEFAULT_RECONCILE_INTERVAL;
use crate::vault::KEY_LEN;
use crate::wallet::WalletError;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const WALLET_ENCRYPTION_KEY_ENV: &str = "WALLET_ENCRYPTION_KEY";
pub const LEDGER_ENABLED_ENV: &str = "LEDGER_ENABLED";
pub const LEDGER_NETWORK_ENV: &str = "LEDGER_NETWORK";
pub const LEDGER_RPC_URL_ENV: &str = "LEDGER_RPC_URL";
pub const LEDGER_OPERATOR_KEY_ENV: &str = "LEDGER_OPERATOR_KEY";
pub const LEDGER_TIMEOUT_SECS_ENV: &str = "LEDGER_TIMEOUT_SECS";
pub const INITIAL_ACCOUNT_BALANCE_ENV: &str = "INITIAL_ACCOUNT_BALANCE";
pub const RECONCILE_INTERVAL_SECS_ENV: &str = "RECONCILE_INTERVAL_SECS";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";
pub const DEFAULT_LEDGER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Settings of the wallet subsystem once enabled.
pub struct WalletConfig {
    pub network: LedgerNetwork,
    pub rpc_url: Option<String>,
    pub operator_key: Option<Zeroizing<String>>,
    /// Decoded vault key; `None` means an ephemeral key is generated.
    pub encryption_key: Option<Zeroizing<Vec<u8>>>,
    pub ledger_timeout: Duration,
    pub initial_balance: Decimal,
    pub reconcile_interval: Duration,
}

impl std::fmt::Debug for WalletConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletConfig")
            .field("network", &self.network)
            .field("rpc_url", &self.rpc_url)
            .field("operator_key", &self.operator_key.as_ref().map(|_| "[REDACTED]"))
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "[REDACTED]"))
            .field("ledger_timeout", &self.ledger_timeout)
            .field("initial_balance", &self.initial_balance)
            .field("reconcile_interval", &self.reconcile_interval)
            .finish()
    }
}

#[derive(Debug)]
pub enum WalletSettings {
    Enabled(WalletConfig),
    Disabled { reason: String },
}

#[derive(Debug)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub log_format: LogFormat,
    pub tls: Option<TlsPaths>,
    pub wallet: WalletSettings,
    /// Non-fatal problems found while parsing, logged once tracing is up.
    pub warnings: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut warnings = Vec::new();

        let host = get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match get(PORT_ENV).map(|v| v.parse::<u16>()) {
            None => DEFAULT_PORT,
            Some(Ok(port)) => port,
            Some(Err(_)) => {
                warnings.push(format!("{PORT_ENV} is not a valid port, using {DEFAULT_PORT}"));
                DEFAULT_PORT
            }
        };
        let data_dir = PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()));
        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => {
                warnings.push(format!(
                    "{TLS_CERT_PATH_ENV} and {TLS_KEY_PATH_ENV} must be set together, serving plain HTTP"
                ));
                None
            }
        };

        let wallet = match wallet_settings(&get) {
            Ok(Some(config)) => WalletSettings::Enabled(config),
            Ok(None) => WalletSettings::Disabled {
                reason: "ledger is not configured".to_string(),
            },
            Err(e) => WalletSettings::Disabled { reason: e.to_string() },
        };

        Self {
            host,
            port,
            data_dir,
            log_format,
            tls,
            wallet,
            warnings,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `Ok(None)` when the ledger is switched off rather than misconfigured.
fn wallet_settings<G>(get: &G) -> Result<Option<WalletConfig>, WalletError>
where
    G: Fn(&str) -> Option<String>,
{
    let network = match get(LEDGER_NETWORK_ENV) {
        Some(v) => LedgerNetwork::from_str(&v)
            .map_err(|e| WalletError::Configuration(format!("{LEDGER_NETWORK_ENV}: {e}")))?,
        None => LedgerNetwork::Fuji,
    };
    let operator_key = get(LEDGER_OPERATOR_KEY_ENV).map(Zeroizing::new);
    let has_credentials = operator_key.is_some() || network == LedgerNetwork::Memory;

    let enabled = match get(LEDGER_ENABLED_ENV) {
        Some(v) => parse_bool(&v)
            .ok_or_else(|| WalletError::Configuration(format!("{LEDGER_ENABLED_ENV} must be true or false")))?,
        None => has_credentials,
    };
    if !enabled {
        return Ok(None);
    }
    if !has_credentials {
        return Err(WalletError::Configuration(format!(
            "{LEDGER_OPERATOR_KEY_ENV} is required on {}",
            network.as_str()
        )));
    }

    let encryption_key = get(WALLET_ENCRYPTION_KEY_ENV)
        .map(|v| parse_encryption_key(&v))
        .transpose()?;

    let ledger_timeout = parse_secs(get, LEDGER_TIMEOUT_SECS_ENV)?.unwrap_or(DEFAULT_LEDGER_TIMEOUT);
    let reconcile_interval =
        parse_secs(get, RECONCILE_INTERVAL_SECS_ENV)?.unwrap_or(DEFAULT_RECONCILE_INTERVAL);

    let initial_balance = match get(INITIAL_ACCOUNT_BALANCE_ENV) {
        Some(v) => Decimal::from_str(&v)
            .map_err(|_| WalletError::Configuration(format!("{INITIAL_ACCOUNT_BALANCE_ENV} is not a decimal")))?,
        None => Decimal::ONE,
    };
    if initial_balance <= Decimal::ZERO {
        return Err(WalletError::Configuration(format!(
            "{INITIAL_ACCOUNT_BALANCE_ENV} must be greater than zero"
        )));
    }

    Ok(Some(WalletConfig {
        network,
        rpc_url: get(LEDGER_RPC_URL_ENV),
        operator_key,
        encryption_key,
        ledger_timeout,
        initial_balance,
        reconcile_interval,
    }))
}

fn parse_encryption_key(value: &str) -> Result<Zeroizing<Vec<u8>>, WalletError> {
    let trimmed = value.strip_prefix("0x").unwrap_or(value);
    let bytes = Zeroizing::new(hex::decode(trimmed).map_err(|_| {
        WalletError::Configuration(format!("{WALLET_ENCRYPTION_KEY_ENV} is not valid hex"))
    })?);
    if bytes.len() != KEY_LEN {
        return Err(WalletError::Configuration(format!(
            "{WALLET_ENCRYPTION_KEY_ENV} must be {KEY_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

fn parse_secs<G>(get: &G, name: &str) -> Result<Option<Duration>, WalletError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(None),
        Some(v) => match v.parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Some(Duration::from_secs(secs))),
            _ => Err(WalletError::Configuration(format!(
                "{name} must be a positive number of seconds"
            ))),
        },
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const OPERATOR: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn config(vars: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    fn enabled(config: &AppConfig) -> &WalletConfig {
        match &config.wallet {
            WalletSettings::Enabled(c) => c,
            WalletSettings::Disabled { reason } => panic!("wallet disabled: {reason}"),
        }
    }

    fn disabled_reason(config: &AppConfig) -> &str {
        match &config.wallet {
            WalletSettings::Disabled { reason } => reason,
            WalletSettings::Enabled(_) => panic!("wallet unexpectedly enabled"),
        }
    }

    #[test]
    fn defaults_without_environment() {
        let cfg = config(&[]);
        assert_eq!(cfg.bind_address(), "0.0.0.0:8080");
        assert_eq!(cfg.data_dir, PathBuf::from("./data"));
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert!(cfg.tls.is_none());
        assert_eq!(disabled_reason(&cfg), "ledger is not configured");
    }

    #[test]
    fn operator_key_enables_the_ledger_with_defaults() {
        let cfg = config(&[(LEDGER_OPERATOR_KEY_ENV, OPERATOR)]);
        let wallet = enabled(&cfg);
        assert_eq!(wallet.network, LedgerNetwork::Fuji);
        assert_eq!(wallet.ledger_timeout, Duration::from_secs(30));
        assert_eq!(wallet.reconcile_interval, Duration::from_secs(60));
        assert_eq!(wallet.initial_balance, Decimal::ONE);
        assert!(wallet.encryption_key.is_none());
    }

    #[test]
    fn explicit_switch_wins_over_credentials() {
        let cfg = config(&[
            (LEDGER_OPERATOR_KEY_ENV, OPERATOR),
            (LEDGER_ENABLED_ENV, "false"),
        ]);
        assert_eq!(disabled_reason(&cfg), "ledger is not configured");

        let cfg = config(&[(LEDGER_ENABLED_ENV, "true")]);
        assert!(disabled_reason(&cfg).contains(LEDGER_OPERATOR_KEY_ENV));
    }

    #[test]
    fn invalid_values_disable_the_subsystem_only() {
        for (name, value) in [
            (LEDGER_NETWORK_ENV, "ropsten"),
            (LEDGER_TIMEOUT_SECS_ENV, "0"),
            (RECONCILE_INTERVAL_SECS_ENV, "soon"),
            (INITIAL_ACCOUNT_BALANCE_ENV, "-1"),
            (WALLET_ENCRYPTION_KEY_ENV, "abcd"),
            (LEDGER_ENABLED_ENV, "maybe"),
        ] {
            let cfg = config(&[(LEDGER_OPERATOR_KEY_ENV, OPERATOR), (name, value), (PORT_ENV, "9000")]);
            assert!(
                matches!(cfg.wallet, WalletSettings::Disabled { .. }),
                "{name}={value} should disable the wallet"
            );
            assert_eq!(cfg.port, 9000);
        }
    }

    #[test]
    fn encryption_key_is_decoded() {
        let key = format!("0x{}", "11".repeat(32));
        let cfg = config(&[
            (LEDGER_OPERATOR_KEY_ENV, OPERATOR),
            (WALLET_ENCRYPTION_KEY_ENV, key.as_str()),
            (INITIAL_ACCOUNT_BALANCE_ENV, "0.25"),
        ]);
        let wallet = enabled(&cfg);
        assert_eq!(wallet.encryption_key.as_deref(), Some(&vec![0x11u8; 32]));
        assert_eq!(wallet.initial_balance, Decimal::new(25, 2));
    }

    #[test]
    fn bad_port_and_half_tls_fall_back_with_warnings() {
        let cfg = config(&[
            (PORT_ENV, "http"),
            (TLS_CERT_PATH_ENV, "/tls/cert.pem"),
            (LOG_FORMAT_ENV, "JSON"),
        ]);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert!(cfg.tls.is_none());
        assert_eq!(cfg.warnings.len(), 2);
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn tls_paths_are_read_together() {
        let cfg = config(&[
            (TLS_CERT_PATH_ENV, "/tls/cert.pem"),
            (TLS_KEY_PATH_ENV, "/tls/key.pem"),
        ]);
        assert_eq!(
            cfg.tls,
            Some(TlsPaths {
                cert: "/tls/cert.pem".into(),
                key: "/tls/key.pem".into(),
            })
        );
    }
}
