//! Decimal math kernel shared by the federal and state calculators.
//!
//! All monetary values are [`Decimal`]s: money is displayed at two decimal
//! places and rates carry at least four. Nothing in here touches binary
//! floating point, and every function is pure.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::ArithmeticError;

/// Rounds a decimal value to exactly two decimal places using half-up rounding.
///
/// This follows standard financial rounding conventions where values at exactly
/// 0.005 are rounded up to 0.01 (away from zero).
///
/// # Arguments
///
/// * `value` - The decimal value to round
///
/// # Returns
///
/// The value rounded to two decimal places.
///
/// # Examples
///
/// ```
/// use rust_decimal_macros::dec;
/// use tax_core::calculations::common::round_half_up;
///
/// assert_eq!(round_half_up(dec!(123.454)), dec!(123.45));
/// assert_eq!(round_half_up(dec!(123.455)), dec!(123.46));
/// assert_eq!(round_half_up(dec!(123.456)), dec!(123.46));
/// assert_eq!(round_half_up(dec!(-123.455)), dec!(-123.46)); // Away from zero
/// ```
pub fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Rounds a money amount down (towards negative infinity) to whole cents.
///
/// ```
/// use rust_decimal_macros::dec;
/// use tax_core::calculations::common::round_down;
///
/// assert_eq!(round_down(dec!(10.129)), dec!(10.12));
/// assert_eq!(round_down(dec!(-10.121)), dec!(-10.13));
/// ```
pub fn round_down(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::ToNegativeInfinity)
}

/// Rounds a money amount up (towards positive infinity) to whole cents.
///
/// ```
/// use rust_decimal_macros::dec;
/// use tax_core::calculations::common::round_up;
///
/// assert_eq!(round_up(dec!(10.121)), dec!(10.13));
/// ```
pub fn round_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::ToPositiveInfinity)
}

/// Rounds a rate to four decimal places, half-up.
pub fn round_rate(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

/// Returns the maximum of two decimal values.
///
/// # Arguments
///
/// * `a` - First decimal value
/// * `b` - Second decimal value
///
/// # Returns
///
/// The larger of the two values.
///
/// # Examples
///
/// ```
/// use rust_decimal_macros::dec;
/// use tax_core::calculations::common::max;
///
/// assert_eq!(max(dec!(100.00), dec!(200.00)), dec!(200.00));
/// assert_eq!(max(dec!(200.00), dec!(100.00)), dec!(200.00));
/// assert_eq!(max(dec!(-100.00), dec!(-200.00)), dec!(-100.00));
/// ```
pub fn max(
    a: Decimal,
    b: Decimal,
) -> Decimal {
    if a > b { a } else { b }
}

/// Returns the minimum of two decimal values.
pub fn min(
    a: Decimal,
    b: Decimal,
) -> Decimal {
    if a < b { a } else { b }
}

/// Clamps `value` into `[lo, hi]`.
///
/// ```
/// use rust_decimal_macros::dec;
/// use tax_core::calculations::common::clamp;
///
/// assert_eq!(clamp(dec!(-5), dec!(0), dec!(10)), dec!(0));
/// assert_eq!(clamp(dec!(15), dec!(0), dec!(10)), dec!(10));
/// assert_eq!(clamp(dec!(7.5), dec!(0), dec!(10)), dec!(7.5));
/// ```
pub fn clamp(
    value: Decimal,
    lo: Decimal,
    hi: Decimal,
) -> Decimal {
    max(lo, min(value, hi))
}

/// Floors a value at zero.
pub fn non_negative(value: Decimal) -> Decimal {
    max(value, Decimal::ZERO)
}

/// Checked addition.
pub fn add(
    a: Decimal,
    b: Decimal,
) -> Result<Decimal, ArithmeticError> {
    a.checked_add(b).ok_or(ArithmeticError::Overflow("add"))
}

/// Checked sum of any number of terms.
///
/// ```
/// use rust_decimal_macros::dec;
/// use tax_core::calculations::common::sum;
///
/// assert_eq!(sum([dec!(1.50), dec!(2.25), dec!(3)]), Ok(dec!(6.75)));
/// ```
pub fn sum(values: impl IntoIterator<Item = Decimal>) -> Result<Decimal, ArithmeticError> {
    values.into_iter().try_fold(Decimal::ZERO, add)
}

/// Checked subtraction.
pub fn subtract(
    a: Decimal,
    b: Decimal,
) -> Result<Decimal, ArithmeticError> {
    a.checked_sub(b).ok_or(ArithmeticError::Overflow("subtract"))
}

/// Checked multiplication.
pub fn multiply(
    a: Decimal,
    b: Decimal,
) -> Result<Decimal, ArithmeticError> {
    a.checked_mul(b).ok_or(ArithmeticError::Overflow("multiply"))
}

/// Checked division.
///
/// # Errors
///
/// [`ArithmeticError::DivisionByZero`] when `divisor` is zero, and
/// [`ArithmeticError::Overflow`] when the quotient does not fit.
///
/// ```
/// use rust_decimal_macros::dec;
/// use tax_core::calculations::common::divide;
/// use tax_core::ArithmeticError;
///
/// assert_eq!(divide(dec!(10), dec!(4)), Ok(dec!(2.5)));
/// assert_eq!(divide(dec!(10), dec!(0)), Err(ArithmeticError::DivisionByZero));
/// ```
pub fn divide(
    dividend: Decimal,
    divisor: Decimal,
) -> Result<Decimal, ArithmeticError> {
    if divisor.is_zero() {
        return Err(ArithmeticError::DivisionByZero);
    }
    dividend
        .checked_div(divisor)
        .ok_or(ArithmeticError::Overflow("divide"))
}

/// Division that yields `default` instead of failing on a zero divisor.
///
/// Only for callers that have decided a zero divisor is meaningful (an
/// effective rate on zero income, for example). Overflow still fails.
pub fn divide_or(
    dividend: Decimal,
    divisor: Decimal,
    default: Decimal,
) -> Result<Decimal, ArithmeticError> {
    match divide(dividend, divisor) {
        Err(ArithmeticError::DivisionByZero) => Ok(default),
        other => other,
    }
}

/// Fraction of a linear phase-out that has been consumed at `income`.
///
/// Returns 0 at or below `start`, 1 at or above `end`, and the linear
/// interpolation in between. A degenerate range (`end <= start`) behaves as
/// a cliff at `start`.
///
/// ```
/// use rust_decimal_macros::dec;
/// use tax_core::calculations::common::linear_phase_out_fraction;
///
/// assert_eq!(linear_phase_out_fraction(dec!(85000), dec!(80000), dec!(90000)), dec!(0.5));
/// assert_eq!(linear_phase_out_fraction(dec!(95000), dec!(80000), dec!(90000)), dec!(1));
/// ```
pub fn linear_phase_out_fraction(
    income: Decimal,
    start: Decimal,
    end: Decimal,
) -> Decimal {
    if income <= start {
        return Decimal::ZERO;
    }
    if income >= end || end <= start {
        return Decimal::ONE;
    }
    // end > start here, so the divisor is never zero.
    (income - start) / (end - start)
}
