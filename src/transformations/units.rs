//! Exact integer-scaled decimal arithmetic for on-chain amounts.
//!
//! Every value is parsed into a `U256`, scaled with integer division by a power of
//! ten and rendered from the quotient and remainder. Nothing passes through a
//! floating point type.

use alloy_primitives::U256;

use crate::models::errors::NormalizationError;

/// Decimal places of the native currency (1 ETH = 10^18 wei).
pub const NATIVE_DECIMALS: u8 = 18;

/// Largest scale representable in 256 bits (10^78 overflows).
pub const MAX_DECIMALS: u8 = 77;

/// Parse a base-10 digit string. Signs, whitespace, separators and the empty string are rejected.
pub fn parse_integer(field: &'static str, raw: &str) -> Result<U256, NormalizationError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NormalizationError::MalformedInteger {
            field,
            value: raw.to_string(),
        });
    }

    // Only digits reach this point, so any parse failure is out of range
    U256::from_str_radix(raw, 10).map_err(|_| NormalizationError::IntegerOverflow { field })
}

/// Parse a token's declared decimal count.
pub fn parse_decimals(raw: &str) -> Result<u8, NormalizationError> {
    match raw.parse::<u8>() {
        Ok(decimals) if decimals <= MAX_DECIMALS && !raw.starts_with('+') => Ok(decimals),
        _ => Err(NormalizationError::InvalidDecimals {
            value: raw.to_string(),
        }),
    }
}

fn pow10(decimals: u8) -> Result<U256, NormalizationError> {
    U256::from(10u64)
        .checked_pow(U256::from(decimals))
        .ok_or_else(|| NormalizationError::InvalidDecimals {
            value: decimals.to_string(),
        })
}

/// Render `value / 10^decimals` exactly, without trailing fractional zeros.
pub fn format_units(value: U256, decimals: u8) -> Result<String, NormalizationError> {
    if decimals > MAX_DECIMALS {
        return Err(NormalizationError::InvalidDecimals {
            value: decimals.to_string(),
        });
    }
    if decimals == 0 {
        return Ok(value.to_string());
    }

    let (whole, remainder) = value.div_rem(pow10(decimals)?);
    if remainder.is_zero() {
        return Ok(whole.to_string());
    }

    let digits = remainder.to_string();
    let mut fraction = "0".repeat(decimals as usize - digits.len());
    fraction.push_str(digits.trim_end_matches('0'));

    Ok(format!("{whole}.{fraction}"))
}

/// Scale a raw integer string by `10^decimals`.
pub fn scale_units(field: &'static str, raw: &str, decimals: u8) -> Result<String, NormalizationError> {
    format_units(parse_integer(field, raw)?, decimals)
}

/// Convert a wei amount to ETH.
pub fn wei_to_eth(raw: &str) -> Result<String, NormalizationError> {
    scale_units("value", raw, NATIVE_DECIMALS)
}

/// Gas fee in ETH: `gas_used * gas_price / 10^18`, multiplied at full width before scaling.
pub fn gas_fee_eth(gas_used: &str, gas_price: &str) -> Result<String, NormalizationError> {
    let gas_used = parse_integer("gasUsed", gas_used)?;
    let gas_price = parse_integer("gasPrice", gas_price)?;

    let fee_wei = gas_used
        .checked_mul(gas_price)
        .ok_or(NormalizationError::IntegerOverflow { field: "gasFee" })?;

    format_units(fee_wei, NATIVE_DECIMALS)
}
