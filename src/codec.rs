//! Fixed-point hex quantity decoding.
//!
//! JSON-RPC quantities arrive as `0x`-prefixed hex strings. Values are scaled
//! with integer division on `U256` and only turned into an `f64` at the very
//! end, so large integer parts never lose digits to the float mantissa before
//! the decimal point is placed.

use alloy_primitives::U256;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid hex quantity: {0:?}")]
    InvalidHex(String),

    #[error("scale of {0} decimals does not fit in 256 bits")]
    DecimalsTooLarge(u8),

    #[error("value {0} does not fit the target type")]
    Overflow(String),
}

/// Parse a hex quantity (`0x1a`, `0x00ff`, `0x`) into a `U256`.
///
/// The empty quantity `0x` decodes to zero.
pub fn parse_hex_quantity(hex: &str) -> Result<U256, CodecError> {
    let digits = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .unwrap_or(hex);

    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CodecError::InvalidHex(hex.to_string()));
    }

    U256::from_str_radix(digits, 16).map_err(|_| CodecError::Overflow(hex.to_string()))
}

/// Render `value / 10^decimals` as an exact `int.fraction` string.
///
/// The fraction is left-padded with zeros to exactly `decimals` digits.
/// With `decimals == 0` there is no fractional component at all.
pub fn format_scaled(value: U256, decimals: u8) -> Result<String, CodecError> {
    if decimals == 0 {
        return Ok(value.to_string());
    }

    let scale = U256::from(10u64)
        .checked_pow(U256::from(decimals))
        .ok_or(CodecError::DecimalsTooLarge(decimals))?;

    let int_part = value / scale;
    let fraction = value % scale;

    Ok(format!(
        "{int_part}.{:0>width$}",
        fraction.to_string(),
        width = decimals as usize
    ))
}

/// Decode a hex quantity at the given decimal scale.
///
/// Precision is only lost in the final string-to-float step, which matches
/// the precision tokens are displayed with.
pub fn hex_to_decimal(hex: &str, decimals: u8) -> Result<f64, CodecError> {
    let value = parse_hex_quantity(hex)?;
    let exact = format_scaled(value, decimals)?;

    exact
        .parse::<f64>()
        .map_err(|_| CodecError::Overflow(exact.clone()))
}

/// Zero-decimal conversion for counters such as gas, timestamps and indexes.
pub fn hex_to_u64(hex: &str) -> Result<u64, CodecError> {
    let value = parse_hex_quantity(hex)?;
    if value > U256::from(u64::MAX) {
        return Err(CodecError::Overflow(hex.to_string()));
    }
    Ok(value.as_limbs()[0])
}

/// Minimal hex quantity for a block number, as JSON-RPC expects it.
pub fn to_hex_quantity(value: u64) -> String {
    format!("{value:#x}")
}
