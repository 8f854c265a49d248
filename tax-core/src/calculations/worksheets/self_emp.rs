//! Self-employment tax worksheet.
//!
//! Follows the Schedule SE line structure:
//!
//! | Line | Description |
//! |------|-------------|
//! | 2    | Net profit from self-employment |
//! | 3    | Line 2 × net earnings factor (92.35%) |
//! | 4    | Medicare tax: Line 3 × 2.9% |
//! | 5    | Maximum earnings subject to social security tax |
//! | 6    | Wages already subject to social security tax |
//! | 7    | Line 5 minus Line 6 (not below zero) |
//! | 8    | Smaller of Line 3 or Line 7 |
//! | 9    | Social security tax: Line 8 × 12.4% |
//! | 10   | Self-employment tax: Line 4 + Line 9 |
//! | 11   | Deductible part of SE tax: Line 10 × 50% |
//!
//! When net earnings (Line 3) do not exceed the minimum threshold ($400),
//! no SE tax is due.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use tax_core::SelfEmploymentParameters;
//! use tax_core::calculations::SeWorksheet;
//!
//! let params = SelfEmploymentParameters {
//!     ss_wage_max: dec!(176100.00),
//!     ss_tax_rate: dec!(0.124),
//!     medicare_tax_rate: dec!(0.029),
//!     net_earnings_factor: dec!(0.9235),
//!     deduction_factor: dec!(0.50),
//!     min_se_threshold: dec!(400.00),
//! };
//!
//! let result = SeWorksheet::new(&params)
//!     .calculate(dec!(100000.00), dec!(50000.00))
//!     .unwrap();
//!
//! assert_eq!(result.self_employment_tax, dec!(14129.55));
//! assert_eq!(result.se_tax_deduction, dec!(7064.78));
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calculations::common::{add, min, multiply, non_negative, round_half_up, subtract};
use crate::error::CalcError;
use crate::models::SelfEmploymentParameters;

/// Result of the SE worksheet, with the intermediate lines kept for the
/// breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeWorksheetResult {
    /// Line 3.
    pub net_earnings: Decimal,
    /// Line 4.
    pub medicare_tax: Decimal,
    /// Line 8.
    pub ss_taxable_earnings: Decimal,
    /// Line 9.
    pub social_security_tax: Decimal,
    /// Line 10.
    pub self_employment_tax: Decimal,
    /// Line 11, an above-the-line adjustment.
    pub se_tax_deduction: Decimal,
    pub below_threshold: bool,
}

impl SeWorksheetResult {
    fn below_threshold(net_earnings: Decimal) -> Self {
        Self {
            net_earnings,
            medicare_tax: Decimal::ZERO,
            ss_taxable_earnings: Decimal::ZERO,
            social_security_tax: Decimal::ZERO,
            self_employment_tax: Decimal::ZERO,
            se_tax_deduction: Decimal::ZERO,
            below_threshold: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SeWorksheet<'a> {
    params: &'a SelfEmploymentParameters,
}

impl<'a> SeWorksheet<'a> {
    pub fn new(params: &'a SelfEmploymentParameters) -> Self {
        Self { params }
    }

    /// Runs every line of the worksheet.
    ///
    /// `se_income` is net profit from self-employment (Line 2) and `wages`
    /// the wages already subject to social security tax (Line 6).
    pub fn calculate(
        &self,
        se_income: Decimal,
        wages: Decimal,
    ) -> Result<SeWorksheetResult, CalcError> {
        // Line 3
        let net_earnings = self.net_earnings_from_self_employment(se_income)?;
        if net_earnings <= self.params.min_se_threshold {
            debug!(
                net_earnings = %net_earnings,
                threshold = %self.params.min_se_threshold,
                "net SE earnings at or below threshold; no SE tax due"
            );
            return Ok(SeWorksheetResult::below_threshold(net_earnings));
        }

        // Line 4
        let medicare_tax = round_half_up(multiply(net_earnings, self.params.medicare_tax_rate)?);

        // Lines 5 to 8
        let remaining_ss_base = self.remaining_ss_wage_base(wages)?;
        let ss_taxable_earnings = min(net_earnings, remaining_ss_base);

        // Line 9
        let social_security_tax =
            round_half_up(multiply(ss_taxable_earnings, self.params.ss_tax_rate)?);

        // Line 10
        let self_employment_tax = add(medicare_tax, social_security_tax)?;

        // Line 11
        let se_tax_deduction =
            round_half_up(multiply(self_employment_tax, self.params.deduction_factor)?);

        Ok(SeWorksheetResult {
            net_earnings,
            medicare_tax,
            ss_taxable_earnings,
            social_security_tax,
            self_employment_tax,
            se_tax_deduction,
            below_threshold: false,
        })
    }

    fn net_earnings_from_self_employment(
        &self,
        se_income: Decimal,
    ) -> Result<Decimal, CalcError> {
        let net = multiply(non_negative(se_income), self.params.net_earnings_factor)?;
        Ok(round_half_up(net))
    }

    /// Line 7: what is left of the social security wage base after wages.
    fn remaining_ss_wage_base(
        &self,
        wages: Decimal,
    ) -> Result<Decimal, CalcError> {
        Ok(non_negative(subtract(self.params.ss_wage_max, wages)?))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    fn params() -> SelfEmploymentParameters {
        SelfEmploymentParameters {
            ss_wage_max: dec!(176100.00),
            ss_tax_rate: dec!(0.124),
            medicare_tax_rate: dec!(0.029),
            net_earnings_factor: dec!(0.9235),
            deduction_factor: dec!(0.50),
            min_se_threshold: dec!(400.00),
        }
    }

    // =========================================================================
    // threshold tests
    // =========================================================================

    #[test]
    fn net_earnings_at_threshold_owe_nothing() {
        let params = params();
        // 433.13 * 0.9235 rounds to 400.00
        let result = SeWorksheet::new(&params)
            .calculate(dec!(433.13), Decimal::ZERO)
            .unwrap();

        assert!(result.below_threshold);
        assert_eq!(result.self_employment_tax, Decimal::ZERO);
    }

    #[test]
    fn zero_income_is_below_threshold() {
        let params = params();
        let result = SeWorksheet::new(&params)
            .calculate(Decimal::ZERO, dec!(50000))
            .unwrap();

        assert!(result.below_threshold);
        assert_eq!(result.net_earnings, Decimal::ZERO);
    }

    // =========================================================================
    // full worksheet tests
    // =========================================================================

    #[test]
    fn income_without_wages() {
        let params = params();
        let result = SeWorksheet::new(&params)
            .calculate(dec!(100000.00), Decimal::ZERO)
            .unwrap();

        assert_eq!(result.net_earnings, dec!(92350.00));
        assert_eq!(result.medicare_tax, dec!(2678.15));
        assert_eq!(result.ss_taxable_earnings, dec!(92350.00));
        assert_eq!(result.social_security_tax, dec!(11451.40));
        assert_eq!(result.self_employment_tax, dec!(14129.55));
        assert_eq!(result.se_tax_deduction, dec!(7064.78));
    }

    #[test]
    fn wages_use_up_part_of_social_security_base() {
        let params = params();
        let result = SeWorksheet::new(&params)
            .calculate(dec!(80000.00), dec!(150000.00))
            .unwrap();

        // 176,100 - 150,000 leaves 26,100 of the base
        assert_eq!(result.net_earnings, dec!(73880.00));
        assert_eq!(result.ss_taxable_earnings, dec!(26100.00));
        assert_eq!(result.social_security_tax, dec!(3236.40));
        assert_eq!(result.medicare_tax, dec!(2142.52));
    }

    #[test]
    fn wages_above_base_leave_only_medicare() {
        let params = params();
        let result = SeWorksheet::new(&params)
            .calculate(dec!(50000.00), dec!(200000.00))
            .unwrap();

        assert_eq!(result.ss_taxable_earnings, Decimal::ZERO);
        assert_eq!(result.social_security_tax, Decimal::ZERO);
        assert_eq!(result.self_employment_tax, result.medicare_tax);
    }
}
