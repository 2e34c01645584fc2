//! Decimal scaling of raw token amounts.

use alloy::primitives::U256;

use crate::error::SnapshotError;

fn format_failed(amount: &str, decimals: u8, reason: &str) -> SnapshotError {
    SnapshotError::FormatFailed {
        amount: amount.to_string(),
        decimals,
        reason: reason.to_string(),
    }
}

/// Scale a decimal amount string by `10^decimals` into an `f64`.
///
/// An empty string and any zero value format to `0.0`. Negative amounts are
/// a data bug and fail with `NegativeAmount`; non-numeric input, a scale
/// factor beyond 256 bits, or a non-finite parse result fail with
/// `FormatFailed`.
pub fn format_amount(amount: &str, decimals: u8) -> Result<f64, SnapshotError> {
    if amount.is_empty() {
        return Ok(0.0);
    }
    if let Some(digits) = amount.strip_prefix('-') {
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(format_failed(amount, decimals, "not a decimal integer"));
        }
        if digits.chars().all(|c| c == '0') {
            return Ok(0.0);
        }
        return Err(SnapshotError::NegativeAmount(amount.to_string()));
    }

    let value = U256::from_str_radix(amount, 10)
        .map_err(|_| format_failed(amount, decimals, "not a decimal integer"))?;
    if value.is_zero() {
        return Ok(0.0);
    }

    let denominator = U256::from(10u64)
        .checked_pow(U256::from(decimals))
        .ok_or_else(|| format_failed(amount, decimals, "scale factor overflow"))?;
    let (quotient, remainder) = value.div_rem(denominator);

    let text = if quotient.is_zero() {
        // 0.{zeros}{digits}: left-pad the full value out to `decimals` digits.
        let digits = value.to_string();
        let zeros = (decimals as usize).saturating_sub(digits.len());
        format!("0.{}{}", "0".repeat(zeros), digits)
    } else if remainder.is_zero() {
        quotient.to_string()
    } else {
        let digits = remainder.to_string();
        let zeros = (decimals as usize).saturating_sub(digits.len());
        format!("{}.{}{}", quotient, "0".repeat(zeros), digits)
    };

    let parsed: f64 = text
        .parse()
        .map_err(|_| format_failed(amount, decimals, "float parse failed"))?;
    if !parsed.is_finite() {
        return Err(format_failed(amount, decimals, "float overflow"));
    }
    Ok(parsed)
}
