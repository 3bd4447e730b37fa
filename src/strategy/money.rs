//! Money arithmetic helpers.
//!
//! Amounts are kept as exact `Decimal`s end to end and only quantised for
//! display and reporting, rounding half away from zero.

use rust_decimal::prelude::*;
use rust_decimal::RoundingStrategy;
use rust_decimal_macros::dec;

/// Default currency quantum (one sen / one cent).
pub const MONEY_QUANTUM_DEFAULT: Decimal = dec!(0.01);

/// Decimal places kept for ROI and margin.
pub const RATIO_DP: u32 = 4;

/// Round `value` to a multiple of `quantum`. A zero or negative quantum
/// leaves the value untouched. When `value / quantum` leaves the `Decimal`
/// range the value is rounded to the quantum's decimal places instead.
pub fn quantize_money(value: Decimal, quantum: Decimal) -> Decimal {
    if quantum <= Decimal::ZERO {
        return value;
    }
    value
        .checked_div(quantum)
        .map(|steps| steps.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|steps| steps.checked_mul(quantum))
        .unwrap_or_else(|| value.round_dp_with_strategy(quantum.scale(), RoundingStrategy::MidpointAwayFromZero))
}

/// Round a ratio (ROI, margin) to four decimal places.
pub fn quantize_ratio(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(RATIO_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// `amount × bps / 10000`, or `None` on overflow.
pub fn basis_points(amount: Decimal, bps: u32) -> Option<Decimal> {
    amount
        .checked_mul(Decimal::from(bps))
        .and_then(|v| v.checked_div(dec!(10000)))
}

/// Expected cost of returns for a given revenue and return rate, or `None`
/// on overflow.
pub fn expected_return_cost(revenue: Decimal, return_rate: Decimal) -> Option<Decimal> {
    revenue.checked_mul(return_rate)
}

fn currency_symbol(currency: &str) -> String {
    match currency.to_ascii_uppercase().as_str() {
        "JPY" => "¥".to_string(),
        "USD" => "$".to_string(),
        "EUR" => "€".to_string(),
        "GBP" => "£".to_string(),
        other => format!("{other} "),
    }
}

/// Format an amount with its currency symbol, quantised to `quantum`.
pub fn format_currency(amount: Decimal, currency: &str, quantum: Decimal) -> String {
    format!("{}{}", currency_symbol(currency), quantize_money(amount, quantum))
}

/// Format a ratio as a percentage with one decimal (`0.25` → `25.0%`).
pub fn format_ratio_pct(ratio: Decimal) -> String {
    let pct = match ratio.checked_mul(dec!(100)) {
        Some(pct) => pct.to_f64().unwrap_or(0.0),
        None => ratio.to_f64().unwrap_or(0.0) * 100.0,
    };
    format!("{pct:.1}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_money_half_up() {
        assert_eq!(quantize_money(dec!(1234.565), dec!(0.01)), dec!(1234.57));
        assert_eq!(quantize_money(dec!(1234.564), dec!(0.01)), dec!(1234.56));
        assert_eq!(quantize_money(dec!(-675.005), dec!(0.01)), dec!(-675.01));
    }

    #[test]
    fn test_quantize_money_integer_quantum() {
        assert_eq!(quantize_money(dec!(10.4), dec!(1)), dec!(10));
        assert_eq!(quantize_money(dec!(10.5), dec!(1)), dec!(11));
        assert_eq!(quantize_money(dec!(1.25), dec!(1)), dec!(1));
    }

    #[test]
    fn test_quantize_money_keeps_scale() {
        assert_eq!(quantize_money(dec!(377.604), dec!(0.01)).to_string(), "377.60");
    }

    #[test]
    fn test_zero_quantum_is_identity() {
        assert_eq!(quantize_money(dec!(1.23456), Decimal::ZERO), dec!(1.23456));
    }

    #[test]
    fn test_quantize_money_near_max_does_not_panic() {
        let big = Decimal::from_i128_with_scale(10i128.pow(27), 0);
        assert_eq!(quantize_money(big, dec!(0.01)), big);
        assert_eq!(quantize_money(Decimal::MAX, dec!(0.01)), Decimal::MAX);
        assert_eq!(quantize_money(Decimal::MIN, dec!(1)), Decimal::MIN);
    }

    #[test]
    fn test_quantize_ratio() {
        assert_eq!(quantize_ratio(dec!(0.837654)), dec!(0.8377));
        assert_eq!(quantize_ratio(dec!(0.25)), dec!(0.25));
    }

    #[test]
    fn test_basis_points() {
        assert_eq!(basis_points(dec!(4800), 120), Some(dec!(57.6)));
        assert_eq!(basis_points(dec!(4800), 0), Some(Decimal::ZERO));
        assert_eq!(basis_points(Decimal::MAX, 120), None);
    }

    #[test]
    fn test_expected_return_cost() {
        assert_eq!(expected_return_cost(dec!(4800), dec!(0.04)), Some(dec!(192)));
        assert_eq!(expected_return_cost(Decimal::MAX, dec!(2)), None);
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(dec!(4800), "JPY", dec!(0.01)), "¥4800.00");
        assert_eq!(format_currency(dec!(12.345), "usd", dec!(0.01)), "$12.35");
        assert_eq!(format_currency(dec!(7), "CHF", dec!(1)), "CHF 7");
    }

    #[test]
    fn test_format_ratio_pct() {
        assert_eq!(format_ratio_pct(dec!(0.25)), "25.0%");
        assert_eq!(format_ratio_pct(dec!(0.4167)), "41.7%");
        assert!(format_ratio_pct(Decimal::MAX).ends_with('%'));
    }
}
