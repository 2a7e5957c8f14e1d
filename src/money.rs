//! Currency helpers shared by order pricing and the gateway request.

use rust_decimal::Decimal;

/// Number of decimal places every stored and signed amount carries.
pub const CURRENCY_SCALE: u32 = 2;

/// Rounds to two decimal places (banker's rounding).
pub fn round_currency(value: Decimal) -> Decimal {
    value.round_dp(CURRENCY_SCALE)
}

/// Formats an amount with exactly two decimals, e.g. `5` -> `"5.00"`.
pub fn format_currency(value: Decimal) -> String {
    let mut rounded = round_currency(value);
    rounded.rescale(CURRENCY_SCALE);
    rounded.to_string()
}
