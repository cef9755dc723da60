// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger network identifiers and constants.

use std::str::FromStr;

/// Decimals of the native coin (AVAX has 18, like ETH).
pub const NATIVE_DECIMALS: u8 = 18;

/// Avalanche network configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Network name for display
    pub name: &'static str,
    /// Chain ID
    pub chain_id: u64,
    /// Default RPC endpoint URL
    pub rpc_url: &'static str,
    /// Block explorer URL
    pub explorer_url: &'static str,
}

/// Avalanche C-Chain Mainnet configuration.
pub const AVAX_MAINNET: NetworkConfig = NetworkConfig {
    name: "Avalanche C-Chain",
    chain_id: 43114,
    rpc_url: "https://api.avax.network/ext/bc/C/rpc",
    explorer_url: "https://snowtrace.io",
};

/// Avalanche Fuji Testnet configuration.
pub const AVAX_FUJI: NetworkConfig = NetworkConfig {
    name: "Avalanche Fuji Testnet",
    chain_id: 43113,
    rpc_url: "https://api.avax-test.network/ext/bc/C/rpc",
    explorer_url: "https://testnet.snowtrace.io",
};

/// Ledger selected by `LEDGER_NETWORK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerNetwork {
    Fuji,
    Mainnet,
    /// Simulated in-process ledger. Only selectable in `dev` builds.
    Memory,
}

impl LedgerNetwork {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fuji => "fuji",
            Self::Mainnet => "mainnet",
            Self::Memory => "memory",
        }
    }

    /// Chain parameters for the EVM networks.
    pub fn evm_config(&self) -> Option<NetworkConfig> {
        match self {
            Self::Fuji => Some(AVAX_FUJI),
            Self::Mainnet => Some(AVAX_MAINNET),
            Self::Memory => None,
        }
    }
}

impl FromStr for LedgerNetwork {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "fuji" | "testnet" => Ok(Self::Fuji),
            "mainnet" => Ok(Self::Mainnet),
            "memory" if cfg!(feature = "dev") => Ok(Self::Memory),
            "memory" => Err("`memory` ledger requires a build with the `dev` feature".to_string()),
            other => Err(format!(
                "unknown ledger network `{other}` (expected `fuji` or `mainnet`)"
            )),
        }
    }
}
