//! Progressive bracket evaluation.
//!
//! A schedule is an ordered list of `(threshold, rate)` pairs starting at
//! zero; the last bracket is unbounded. Results are exact and unrounded so
//! callers decide where rounding happens.

use rust_decimal::Decimal;

use crate::calculations::common::{add, max, min, multiply, non_negative, subtract};
use crate::error::ArithmeticError;
use crate::models::Bracket;

/// Tax on `income` under a progressive schedule.
///
/// Each bracket taxes the slice of income between its own threshold and the
/// next one. Income exactly at a threshold is taxed entirely in the lower
/// bracket. Non-positive income yields zero.
///
/// ```
/// use rust_decimal_macros::dec;
/// use tax_core::Bracket;
/// use tax_core::calculations::brackets::progressive_tax;
///
/// let schedule = [
///     Bracket::new(dec!(0), dec!(0.10)),
///     Bracket::new(dec!(11600), dec!(0.12)),
///     Bracket::new(dec!(47150), dec!(0.22)),
/// ];
///
/// assert_eq!(progressive_tax(&schedule, dec!(75000)).unwrap(), dec!(11553.00));
/// ```
pub fn progressive_tax(
    brackets: &[Bracket],
    income: Decimal,
) -> Result<Decimal, ArithmeticError> {
    let mut tax = Decimal::ZERO;
    if income <= Decimal::ZERO {
        return Ok(tax);
    }

    for (i, bracket) in brackets.iter().enumerate() {
        if income <= bracket.threshold {
            break;
        }
        let upper = match brackets.get(i + 1) {
            Some(next) => min(income, next.threshold),
            None => income,
        };
        let slice = non_negative(subtract(upper, bracket.threshold)?);
        tax = add(tax, multiply(slice, bracket.rate)?)?;
    }

    Ok(tax)
}

/// Tax on `amount` stacked on top of `base` income.
///
/// This is how preferential income is taxed: it fills the schedule starting
/// where ordinary income leaves off.
pub fn layered_tax(
    brackets: &[Bracket],
    base: Decimal,
    amount: Decimal,
) -> Result<Decimal, ArithmeticError> {
    let base = non_negative(base);
    let amount = non_negative(amount);
    let top = add(base, amount)?;
    let tax = subtract(progressive_tax(brackets, top)?, progressive_tax(brackets, base)?)?;
    Ok(max(tax, Decimal::ZERO))
}

/// Rate that applies to the next dollar above `income`.
pub fn marginal_rate(
    brackets: &[Bracket],
    income: Decimal,
) -> Decimal {
    brackets
        .iter()
        .take_while(|bracket| bracket.threshold <= income)
        .last()
        .or(brackets.first())
        .map_or(Decimal::ZERO, |bracket| bracket.rate)
}
