//! Human-readable asset amounts.

use alloy_primitives::U256;
use anyhow::{Context, Result};

/// Parse a human-readable amount string to U256 given decimals.
pub fn parse_amount(amount: &str, decimals: u8) -> Result<U256> {
    let parts: Vec<&str> = amount.trim().split('.').collect();

    let (integer_part, fractional_part) = match parts.as_slice() {
        [integer] => (*integer, ""),
        [integer, fraction] => (*integer, *fraction),
        _ => anyhow::bail!("Invalid amount format: {}", amount),
    };

    // Truncate extra precision, then pad to match decimals
    let fractional_part = fractional_part
        .get(..decimals as usize)
        .unwrap_or(fractional_part);
    let fractional_padded = format!("{:0<width$}", fractional_part, width = decimals as usize);

    let combined = format!("{}{}", integer_part, fractional_padded);
    let combined = combined.trim_start_matches('0');

    if combined.is_empty() {
        return Ok(U256::ZERO);
    }

    U256::from_str_radix(combined, 10).with_context(|| format!("Failed to parse amount: {}", amount))
}

/// Formats base units as a decimal string, dropping trailing zeros.
pub fn format_amount(amount: U256, decimals: u8) -> String {
    let digits = amount.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }

    let padded = format!("{:0>width$}", digits, width = decimals + 1);
    let (integer, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        integer.to_string()
    } else {
        format!("{}.{}", integer, fraction)
    }
}
