//! Conversion between invoice amounts and the provider's minor units.

use bigdecimal::{BigDecimal, ToPrimitive};

/// Currencies whose smallest unit is the whole unit. The provider rejects
/// scaled amounts for these, so the list must match the provider's exactly.
pub const ZERO_DECIMAL_CURRENCIES: [&str; 15] = [
    "jpy", "krw", "clp", "vnd", "xof", "xaf", "bif", "djf", "gnf", "kmf", "mga", "rwf", "xpf",
    "vuv", "ugx",
];

pub fn is_zero_decimal(currency_code: &str) -> bool {
    let code = currency_code.trim().to_ascii_lowercase();
    ZERO_DECIMAL_CURRENCIES.contains(&code.as_str())
}

/// Converts a major-unit amount into the integer the provider expects.
///
/// Zero-decimal currencies are truncated and passed through; every other
/// currency is scaled by 100 and rounded to the nearest minor unit.
/// Returns `None` when the result does not fit in an `i64`.
pub fn to_minor_units(amount: &BigDecimal, currency_code: &str) -> Option<i64> {
    if is_zero_decimal(currency_code) {
        amount.with_scale(0).to_i64()
    } else {
        (amount * BigDecimal::from(100)).round(0).to_i64()
    }
}

/// Inverse of [`to_minor_units`], used for amounts reported back by the provider.
pub fn from_minor_units(minor: i64, currency_code: &str) -> BigDecimal {
    if is_zero_decimal(currency_code) {
        BigDecimal::from(minor)
    } else {
        BigDecimal::from(minor) / BigDecimal::from(100)
    }
}
