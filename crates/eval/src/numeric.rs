//! Precision/decimals model using `rust_decimal`.
//!
//! Implements the XBRL 2.1 inference rules between `decimals` and
//! `precision` and rounding-to-precision. The order of magnitude of a
//! value is read from its decimal mantissa, so no `f64` logarithm is
//! involved anywhere.

use rust_decimal::{Decimal, RoundingStrategy};
use xbrl_core::{Decimals, Fact, Precision};

/// `floor(log10(|value|))`, or `None` for zero.
pub fn magnitude(value: Decimal) -> Option<i64> {
    if value.is_zero() {
        return None;
    }
    let mut mantissa = value.mantissa().unsigned_abs();
    let mut digits: i64 = 0;
    while mantissa > 0 {
        mantissa /= 10;
        digits += 1;
    }
    Some(digits - 1 - i64::from(value.scale()))
}

/// Precision implied by a value reported with `decimals`.
///
/// A zero value has precision 0 unless its decimals are infinite.
pub fn infer_precision(value: Decimal, decimals: Decimals) -> Precision {
    let d = match decimals {
        Decimals::Infinite => return Precision::Infinite,
        Decimals::Finite(d) => i64::from(d),
    };
    match magnitude(value) {
        None => Precision::Finite(0),
        Some(m) => {
            let p = d + m + 1;
            Precision::Finite(p.clamp(0, i64::from(u32::MAX)) as u32)
        }
    }
}

/// Decimals implied by a value reported with `precision`.
///
/// For a zero value the magnitude is taken as zero, so `decimals = precision - 1`
/// would be meaningless; zero rounds to zero at any position, and the
/// precision itself is returned.
pub fn infer_decimals(value: Decimal, precision: Precision) -> Decimals {
    let p = match precision {
        Precision::Infinite => return Decimals::Infinite,
        Precision::Finite(p) => i64::from(p),
    };
    match magnitude(value) {
        None => Decimals::Finite(p.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32),
        Some(m) => {
            let d = p - (m + 1);
            Decimals::Finite(d.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32)
        }
    }
}

/// Round half away from zero at `decimals` places; negative decimals
/// round to tens, hundreds, and so on.
pub fn round_to_decimals(value: Decimal, decimals: i32) -> Decimal {
    if decimals >= 0 {
        // rust_decimal holds at most 28 fractional digits.
        if decimals > 28 {
            return value;
        }
        return value.round_dp_with_strategy(decimals as u32, RoundingStrategy::MidpointAwayFromZero);
    }
    let factor = match power_of_ten(decimals.unsigned_abs()) {
        Some(f) => f,
        None => return Decimal::ZERO,
    };
    match value.checked_div(factor) {
        Some(scaled) => {
            let rounded = scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
            rounded.checked_mul(factor).unwrap_or(value)
        }
        None => value,
    }
}

fn power_of_ten(exp: u32) -> Option<Decimal> {
    let mut result = Decimal::ONE;
    for _ in 0..exp {
        result = result.checked_mul(Decimal::TEN)?;
    }
    Some(result)
}

/// Identity for infinite precision; otherwise round to the decimals the
/// precision implies for this value.
pub fn round_to_precision(value: Decimal, precision: Precision) -> Decimal {
    match infer_decimals(value, precision) {
        Decimals::Infinite => value,
        Decimals::Finite(d) => round_to_decimals(value, d),
    }
}

/// Authoritative precision of a fact.
///
/// Derived from `decimals` when present, else the literal `precision`,
/// else infinite. Non-numeric facts are infinitely precise.
pub fn fact_precision(fact: &Fact) -> Precision {
    let value = match fact.value.as_ref().and_then(|v| v.as_decimal()) {
        Some(v) => v,
        None => return Precision::Infinite,
    };
    match (fact.decimals, fact.precision) {
        (Some(d), _) => infer_precision(value, d),
        (None, Some(p)) => p,
        (None, None) => Precision::Infinite,
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
