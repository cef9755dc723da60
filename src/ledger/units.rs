// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Conversion between whole-unit decimals and ledger base units (wei).

use std::str::FromStr;

use alloy::primitives::U256;
use rust_decimal::Decimal;

use super::LedgerError;

/// Convert a whole-unit amount (e.g. `1.5` AVAX) to base units.
///
/// Fails on negative values and on precision finer than `decimals`.
pub fn to_base_units(amount: Decimal, decimals: u8) -> Result<U256, LedgerError> {
    if amount < Decimal::ZERO {
        return Err(LedgerError::InvalidParameters(format!(
            "negative amount {amount}"
        )));
    }

    let normalized = amount.normalize();
    let scale = normalized.scale();
    if scale > u32::from(decimals) {
        return Err(LedgerError::InvalidParameters(format!(
            "too many decimal places in {amount} (max {decimals})"
        )));
    }

    let mantissa = u128::try_from(normalized.mantissa())
        .map_err(|_| LedgerError::InvalidParameters(format!("invalid amount {amount}")))?;
    let factor = U256::from(10u64).pow(U256::from(u32::from(decimals) - scale));

    U256::from(mantissa)
        .checked_mul(factor)
        .ok_or_else(|| LedgerError::InvalidParameters(format!("amount overflow: {amount}")))
}

/// Convert base units back to a whole-unit decimal.
pub fn from_base_units(amount: U256, decimals: u8) -> Result<Decimal, LedgerError> {
    let formatted = format_amount(amount, decimals);
    Decimal::from_str(&formatted)
        .map(|d| d.normalize())
        .map_err(|e| LedgerError::InvalidResponse(format!("amount {formatted} out of range: {e}")))
}

/// Render base units as a plain decimal string without trailing zeros.
fn format_amount(amount: U256, decimals: u8) -> String {
    if amount.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10u64).pow(U256::from(decimals));
    let whole = amount / divisor;
    let remainder = amount % divisor;

    if remainder.is_zero() {
        return whole.to_string();
    }

    let decimal_str = format!("{:0>width$}", remainder, width = decimals as usize);
    let trimmed = decimal_str.trim_end_matches('0');
    format!("{whole}.{trimmed}")
}
