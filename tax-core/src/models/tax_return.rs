//! The caller-owned tax return the engine reads.
//!
//! Every decimal field defaults to zero so callers only spell out what
//! applies, and every one of them must lie in `0..=MAX_AMOUNT`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calculations::common::sum;
use crate::error::{ArithmeticError, CalcError};
use crate::models::{FilingStatusCode, StateCode};

/// Largest amount any single return field may carry.
///
/// Sums and products of fields this size stay far inside `Decimal`'s range,
/// so a validated return cannot overflow the engine.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xA4C6_8000, 0x38D7E, 0, false, 0);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Residency {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateCode>,
    /// Sub-jurisdiction (county, city or school district) for local tax.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxpayer {
    pub filing_status: FilingStatusCode,
    #[serde(default)]
    pub dependents: u32,
    /// Dependents that qualify for the child tax credit and EITC.
    #[serde(default)]
    pub qualifying_children: u32,
    #[serde(default)]
    pub age_65_or_older: bool,
    #[serde(default)]
    pub spouse_age_65_or_older: bool,
    #[serde(default)]
    pub is_blind: bool,
    #[serde(default)]
    pub spouse_is_blind: bool,
    #[serde(default)]
    pub residency: Residency,
}

impl Taxpayer {
    pub fn new(filing_status: FilingStatusCode) -> Self {
        Self {
            filing_status,
            dependents: 0,
            qualifying_children: 0,
            age_65_or_older: false,
            spouse_age_65_or_older: false,
            is_blind: false,
            spouse_is_blind: false,
            residency: Residency::default(),
        }
    }

    /// Number of checked 65-or-older / blind boxes that count for this
    /// filing status.
    pub fn elderly_or_blind_boxes(&self) -> u32 {
        let own = u32::from(self.age_65_or_older) + u32::from(self.is_blind);
        let spouse = u32::from(self.spouse_age_65_or_older) + u32::from(self.spouse_is_blind);
        if self.filing_status.is_joint() {
            own + spouse
        } else {
            own
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Income {
    pub wages: Decimal,
    pub self_employment_income: Decimal,
    pub taxable_interest: Decimal,
    pub tax_exempt_interest: Decimal,
    /// Treasury interest, included in `taxable_interest`.
    pub us_government_interest: Decimal,
    /// Other states' municipal bond interest, included in `tax_exempt_interest`.
    pub out_of_state_municipal_interest: Decimal,
    pub ordinary_dividends: Decimal,
    /// Included in `ordinary_dividends`.
    pub qualified_dividends: Decimal,
    pub short_term_capital_gains: Decimal,
    pub long_term_capital_gains: Decimal,
    pub capital_losses: Decimal,
    pub retirement_distributions: Decimal,
    pub social_security_benefits: Decimal,
    pub rental_income: Decimal,
    pub unemployment_compensation: Decimal,
    /// Included in `wages`.
    pub military_pay: Decimal,
    pub qualified_business_income: Decimal,
    pub other_income: Decimal,
}

impl Income {
    fn amounts_mut(&mut self) -> [&mut Decimal; 18] {
        [
            &mut self.wages,
            &mut self.self_employment_income,
            &mut self.taxable_interest,
            &mut self.tax_exempt_interest,
            &mut self.us_government_interest,
            &mut self.out_of_state_municipal_interest,
            &mut self.ordinary_dividends,
            &mut self.qualified_dividends,
            &mut self.short_term_capital_gains,
            &mut self.long_term_capital_gains,
            &mut self.capital_losses,
            &mut self.retirement_distributions,
            &mut self.social_security_benefits,
            &mut self.rental_income,
            &mut self.unemployment_compensation,
            &mut self.military_pay,
            &mut self.qualified_business_income,
            &mut self.other_income,
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Adjustments {
    pub educator_expenses: Decimal,
    pub hsa_contributions: Decimal,
    pub ira_contributions: Decimal,
    pub student_loan_interest: Decimal,
    pub self_employed_health_insurance: Decimal,
    pub self_employed_retirement: Decimal,
    pub early_withdrawal_penalty: Decimal,
}

impl Adjustments {
    fn amounts_mut(&mut self) -> [&mut Decimal; 7] {
        [
            &mut self.educator_expenses,
            &mut self.hsa_contributions,
            &mut self.ira_contributions,
            &mut self.student_loan_interest,
            &mut self.self_employed_health_insurance,
            &mut self.self_employed_retirement,
            &mut self.early_withdrawal_penalty,
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeductionMethod {
    /// Take whichever of standard and itemized is larger.
    #[default]
    Auto,
    Standard,
    Itemized,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemizedDeductions {
    pub medical_expenses: Decimal,
    pub state_income_taxes: Decimal,
    pub real_estate_taxes: Decimal,
    pub personal_property_taxes: Decimal,
    pub mortgage_interest: Decimal,
    pub charitable_cash: Decimal,
    pub charitable_noncash: Decimal,
    pub casualty_losses: Decimal,
    pub other: Decimal,
}

impl ItemizedDeductions {
    /// State and local taxes before the SALT cap.
    pub fn state_and_local_taxes(&self) -> Result<Decimal, ArithmeticError> {
        sum([
            self.state_income_taxes,
            self.real_estate_taxes,
            self.personal_property_taxes,
        ])
    }

    fn amounts_mut(&mut self) -> [&mut Decimal; 9] {
        [
            &mut self.medical_expenses,
            &mut self.state_income_taxes,
            &mut self.real_estate_taxes,
            &mut self.personal_property_taxes,
            &mut self.mortgage_interest,
            &mut self.charitable_cash,
            &mut self.charitable_noncash,
            &mut self.casualty_losses,
            &mut self.other,
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deductions {
    #[serde(default)]
    pub method: DeductionMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itemized: Option<ItemizedDeductions>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditInputs {
    pub dependent_care_expenses: Decimal,
    pub care_qualifying_persons: u32,
    pub education_expenses: Decimal,
    pub education_students: u32,
    pub foreign_tax_paid: Decimal,
    pub other_nonrefundable: Decimal,
    pub other_refundable: Decimal,
}

impl CreditInputs {
    fn amounts_mut(&mut self) -> [&mut Decimal; 5] {
        [
            &mut self.dependent_care_expenses,
            &mut self.education_expenses,
            &mut self.foreign_tax_paid,
            &mut self.other_nonrefundable,
            &mut self.other_refundable,
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmtPreferences {
    pub incentive_stock_options: Decimal,
    pub private_activity_bond_interest: Decimal,
    pub other: Decimal,
}

impl AmtPreferences {
    pub fn total(&self) -> Result<Decimal, ArithmeticError> {
        sum([
            self.incentive_stock_options,
            self.private_activity_bond_interest,
            self.other,
        ])
    }

    fn amounts_mut(&mut self) -> [&mut Decimal; 3] {
        [
            &mut self.incentive_stock_options,
            &mut self.private_activity_bond_interest,
            &mut self.other,
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Payments {
    pub federal_withholding: Decimal,
    pub federal_estimated_payments: Decimal,
    pub state_withholding: Decimal,
    pub state_estimated_payments: Decimal,
}

impl Payments {
    fn amounts_mut(&mut self) -> [&mut Decimal; 4] {
        [
            &mut self.federal_withholding,
            &mut self.federal_estimated_payments,
            &mut self.state_withholding,
            &mut self.state_estimated_payments,
        ]
    }
}

/// Carryover state from the prior year's return.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorYearCarryover {
    pub capital_loss: Decimal,
    pub amt_credit: Decimal,
}

impl PriorYearCarryover {
    fn amounts_mut(&mut self) -> [&mut Decimal; 2] {
        [&mut self.capital_loss, &mut self.amt_credit]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxReturn {
    pub return_id: i64,
    pub tax_year: i32,
    pub taxpayer: Taxpayer,
    #[serde(default)]
    pub income: Income,
    #[serde(default)]
    pub adjustments: Adjustments,
    #[serde(default)]
    pub deductions: Deductions,
    #[serde(default)]
    pub credits: CreditInputs,
    #[serde(default)]
    pub amt_preferences: AmtPreferences,
    #[serde(default)]
    pub payments: Payments,
    #[serde(default)]
    pub carryover: PriorYearCarryover,
}

fn normalize_all<const N: usize>(amounts: [&mut Decimal; N]) {
    for amount in amounts {
        *amount = amount.normalize();
    }
}

fn require_amount(
    field: &str,
    value: Decimal,
) -> Result<(), CalcError> {
    if value < Decimal::ZERO {
        return Err(CalcError::validation(
            field,
            format!("must be non-negative, got {value}"),
        ));
    }
    if value > MAX_AMOUNT {
        return Err(CalcError::validation(
            field,
            format!("{value} exceeds the largest supported amount ({MAX_AMOUNT})"),
        ));
    }
    Ok(())
}

fn require_at_most(
    field: &str,
    value: Decimal,
    limit_field: &str,
    limit: Decimal,
) -> Result<(), CalcError> {
    if value > limit {
        return Err(CalcError::validation(
            field,
            format!("{value} exceeds {limit_field} ({limit})"),
        ));
    }
    Ok(())
}

impl TaxReturn {
    /// A return with nothing but a filing status, for callers that fill
    /// in the rest field by field.
    pub fn new(
        return_id: i64,
        tax_year: i32,
        filing_status: FilingStatusCode,
    ) -> Self {
        Self {
            return_id,
            tax_year,
            taxpayer: Taxpayer::new(filing_status),
            income: Income::default(),
            adjustments: Adjustments::default(),
            deductions: Deductions::default(),
            credits: CreditInputs::default(),
            amt_preferences: AmtPreferences::default(),
            payments: Payments::default(),
            carryover: PriorYearCarryover::default(),
        }
    }

    /// Rejects malformed or internally inconsistent returns.
    ///
    /// Nothing is clamped: the first offending field is reported by its
    /// dotted path.
    ///
    /// # Errors
    ///
    /// [`CalcError::Validation`] naming the offending field.
    pub fn validate(&self) -> Result<(), CalcError> {
        if self.tax_year < 1913 {
            return Err(CalcError::validation(
                "tax_year",
                format!("{} is not a valid tax year", self.tax_year),
            ));
        }
        if self.taxpayer.qualifying_children > self.taxpayer.dependents {
            return Err(CalcError::validation(
                "taxpayer.qualifying_children",
                "cannot exceed taxpayer.dependents",
            ));
        }

        let income = &self.income;
        let income_fields = [
            ("income.wages", income.wages),
            ("income.self_employment_income", income.self_employment_income),
            ("income.taxable_interest", income.taxable_interest),
            ("income.tax_exempt_interest", income.tax_exempt_interest),
            ("income.us_government_interest", income.us_government_interest),
            (
                "income.out_of_state_municipal_interest",
                income.out_of_state_municipal_interest,
            ),
            ("income.ordinary_dividends", income.ordinary_dividends),
            ("income.qualified_dividends", income.qualified_dividends),
            ("income.short_term_capital_gains", income.short_term_capital_gains),
            ("income.long_term_capital_gains", income.long_term_capital_gains),
            ("income.capital_losses", income.capital_losses),
            ("income.retirement_distributions", income.retirement_distributions),
            ("income.social_security_benefits", income.social_security_benefits),
            ("income.rental_income", income.rental_income),
            ("income.unemployment_compensation", income.unemployment_compensation),
            ("income.military_pay", income.military_pay),
            ("income.qualified_business_income", income.qualified_business_income),
            ("income.other_income", income.other_income),
        ];
        for (field, value) in income_fields {
            require_amount(field, value)?;
        }
        require_at_most(
            "income.qualified_dividends",
            income.qualified_dividends,
            "income.ordinary_dividends",
            income.ordinary_dividends,
        )?;
        require_at_most(
            "income.us_government_interest",
            income.us_government_interest,
            "income.taxable_interest",
            income.taxable_interest,
        )?;
        require_at_most(
            "income.out_of_state_municipal_interest",
            income.out_of_state_municipal_interest,
            "income.tax_exempt_interest",
            income.tax_exempt_interest,
        )?;
        require_at_most(
            "income.military_pay",
            income.military_pay,
            "income.wages",
            income.wages,
        )?;

        let adj = &self.adjustments;
        let adjustment_fields = [
            ("adjustments.educator_expenses", adj.educator_expenses),
            ("adjustments.hsa_contributions", adj.hsa_contributions),
            ("adjustments.ira_contributions", adj.ira_contributions),
            ("adjustments.student_loan_interest", adj.student_loan_interest),
            (
                "adjustments.self_employed_health_insurance",
                adj.self_employed_health_insurance,
            ),
            ("adjustments.self_employed_retirement", adj.self_employed_retirement),
            ("adjustments.early_withdrawal_penalty", adj.early_withdrawal_penalty),
        ];
        for (field, value) in adjustment_fields {
            require_amount(field, value)?;
        }

        match (&self.deductions.method, &self.deductions.itemized) {
            (DeductionMethod::Itemized, None) => {
                return Err(CalcError::validation(
                    "deductions.itemized",
                    "required when deductions.method is itemized",
                ));
            }
            (_, Some(itemized)) => {
                let itemized_fields = [
                    ("deductions.itemized.medical_expenses", itemized.medical_expenses),
                    ("deductions.itemized.state_income_taxes", itemized.state_income_taxes),
                    ("deductions.itemized.real_estate_taxes", itemized.real_estate_taxes),
                    (
                        "deductions.itemized.personal_property_taxes",
                        itemized.personal_property_taxes,
                    ),
                    ("deductions.itemized.mortgage_interest", itemized.mortgage_interest),
                    ("deductions.itemized.charitable_cash", itemized.charitable_cash),
                    ("deductions.itemized.charitable_noncash", itemized.charitable_noncash),
                    ("deductions.itemized.casualty_losses", itemized.casualty_losses),
                    ("deductions.itemized.other", itemized.other),
                ];
                for (field, value) in itemized_fields {
                    require_amount(field, value)?;
                }
            }
            _ => {}
        }

        let credits = &self.credits;
        let credit_fields = [
            ("credits.dependent_care_expenses", credits.dependent_care_expenses),
            ("credits.education_expenses", credits.education_expenses),
            ("credits.foreign_tax_paid", credits.foreign_tax_paid),
            ("credits.other_nonrefundable", credits.other_nonrefundable),
            ("credits.other_refundable", credits.other_refundable),
        ];
        for (field, value) in credit_fields {
            require_amount(field, value)?;
        }
        if credits.education_expenses > Decimal::ZERO && credits.education_students == 0 {
            return Err(CalcError::validation(
                "credits.education_students",
                "must be positive when education expenses are claimed",
            ));
        }

        let remaining = [
            (
                "amt_preferences.incentive_stock_options",
                self.amt_preferences.incentive_stock_options,
            ),
            (
                "amt_preferences.private_activity_bond_interest",
                self.amt_preferences.private_activity_bond_interest,
            ),
            ("amt_preferences.other", self.amt_preferences.other),
            ("payments.federal_withholding", self.payments.federal_withholding),
            (
                "payments.federal_estimated_payments",
                self.payments.federal_estimated_payments,
            ),
            ("payments.state_withholding", self.payments.state_withholding),
            (
                "payments.state_estimated_payments",
                self.payments.state_estimated_payments,
            ),
            ("carryover.capital_loss", self.carryover.capital_loss),
            ("carryover.amt_credit", self.carryover.amt_credit),
        ];
        for (field, value) in remaining {
            require_amount(field, value)?;
        }

        Ok(())
    }

    /// Earned income for credit purposes: wages plus net SE earnings.
    pub fn earned_income(&self) -> Result<Decimal, ArithmeticError> {
        sum([self.income.wages, self.income.self_employment_income])
    }

    /// The same return with every amount at its smallest scale, so that
    /// `85000` and `85000.00` serialize identically. Text fields are untouched.
    pub fn with_normalized_amounts(&self) -> Self {
        let mut normalized = self.clone();
        normalize_all(normalized.income.amounts_mut());
        normalize_all(normalized.adjustments.amounts_mut());
        if let Some(itemized) = &mut normalized.deductions.itemized {
            normalize_all(itemized.amounts_mut());
        }
        normalize_all(normalized.credits.amounts_mut());
        normalize_all(normalized.amt_preferences.amounts_mut());
        normalize_all(normalized.payments.amounts_mut());
        normalize_all(normalized.carryover.amounts_mut());
        normalized
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    fn valid_return() -> TaxReturn {
        let mut tax_return = TaxReturn::new(1, 2025, FilingStatusCode::Single);
        tax_return.income.wages = dec!(85000);
        tax_return.payments.federal_withholding = dec!(16000);
        tax_return
    }

    #[test]
    fn valid_return_passes() {
        assert_eq!(valid_return().validate(), Ok(()));
    }

    #[test]
    fn negative_income_names_field() {
        let mut tax_return = valid_return();
        tax_return.income.rental_income = dec!(-1);

        let err = tax_return.validate().unwrap_err();

        assert!(matches!(err, CalcError::Validation { ref field, .. } if field == "income.rental_income"));
    }

    #[test]
    fn qualified_dividends_cannot_exceed_ordinary() {
        let mut tax_return = valid_return();
        tax_return.income.ordinary_dividends = dec!(100);
        tax_return.income.qualified_dividends = dec!(150);

        let err = tax_return.validate().unwrap_err();

        assert!(matches!(err, CalcError::Validation { ref field, .. } if field == "income.qualified_dividends"));
    }

    #[test]
    fn itemized_method_requires_itemized_data() {
        let mut tax_return = valid_return();
        tax_return.deductions.method = DeductionMethod::Itemized;

        let err = tax_return.validate().unwrap_err();

        assert!(matches!(err, CalcError::Validation { ref field, .. } if field == "deductions.itemized"));
    }

    #[test]
    fn negative_itemized_component_names_field() {
        let mut tax_return = valid_return();
        tax_return.deductions.itemized = Some(ItemizedDeductions {
            mortgage_interest: dec!(-5),
            ..ItemizedDeductions::default()
        });

        let err = tax_return.validate().unwrap_err();

        assert!(matches!(err, CalcError::Validation { ref field, .. } if field == "deductions.itemized.mortgage_interest"));
    }

    #[test]
    fn amounts_above_the_ceiling_name_field() {
        let mut tax_return = valid_return();
        tax_return.income.other_income = MAX_AMOUNT + dec!(0.01);

        let err = tax_return.validate().unwrap_err();

        assert!(matches!(err, CalcError::Validation { ref field, .. } if field == "income.other_income"));

        tax_return.income.other_income = MAX_AMOUNT;
        assert_eq!(tax_return.validate(), Ok(()));
    }

    #[test]
    fn helper_sums_report_overflow() {
        let huge = dec!(50000000000000000000000000000);
        let items = ItemizedDeductions {
            state_income_taxes: huge,
            real_estate_taxes: huge,
            ..ItemizedDeductions::default()
        };
        let preferences = AmtPreferences {
            incentive_stock_options: huge,
            other: huge,
            ..AmtPreferences::default()
        };

        assert_eq!(items.state_and_local_taxes(), Err(ArithmeticError::Overflow("add")));
        assert_eq!(preferences.total(), Err(ArithmeticError::Overflow("add")));
    }

    #[test]
    fn qualifying_children_cannot_exceed_dependents() {
        let mut tax_return = valid_return();
        tax_return.taxpayer.qualifying_children = 2;
        tax_return.taxpayer.dependents = 1;

        let err = tax_return.validate().unwrap_err();

        assert!(matches!(err, CalcError::Validation { ref field, .. } if field == "taxpayer.qualifying_children"));
    }

    #[test]
    fn education_expenses_need_students() {
        let mut tax_return = valid_return();
        tax_return.credits.education_expenses = dec!(4000);

        let err = tax_return.validate().unwrap_err();

        assert!(matches!(err, CalcError::Validation { ref field, .. } if field == "credits.education_students"));
    }

    #[test]
    fn spouse_boxes_only_count_on_joint_returns() {
        let mut taxpayer = Taxpayer::new(FilingStatusCode::Single);
        taxpayer.age_65_or_older = true;
        taxpayer.spouse_is_blind = true;

        assert_eq!(taxpayer.elderly_or_blind_boxes(), 1);

        taxpayer.filing_status = FilingStatusCode::MarriedFilingJointly;
        assert_eq!(taxpayer.elderly_or_blind_boxes(), 2);
    }

    #[test]
    fn minimal_json_deserializes_with_defaults() {
        let json = r#"{
            "return_id": 7,
            "tax_year": 2025,
            "taxpayer": { "filing_status": "MFJ" },
            "income": { "wages": "120000" }
        }"#;

        let tax_return: TaxReturn = serde_json::from_str(json).unwrap();

        assert_eq!(tax_return.taxpayer.filing_status, FilingStatusCode::MarriedFilingJointly);
        assert_eq!(tax_return.income.wages, dec!(120000));
        assert_eq!(tax_return.deductions.method, DeductionMethod::Auto);
        assert_eq!(tax_return.validate(), Ok(()));
    }

    #[test]
    fn normalized_amounts_drop_trailing_zeros_only() {
        let mut tax_return = valid_return();
        tax_return.income.wages = dec!(85000.00);
        tax_return.carryover.amt_credit = dec!(12.50);
        tax_return.taxpayer.residency.locality = Some("007".to_string());

        let normalized = tax_return.with_normalized_amounts();

        assert_eq!(normalized.income.wages.to_string(), "85000");
        assert_eq!(normalized.carryover.amt_credit.to_string(), "12.5");
        assert_eq!(normalized.taxpayer.residency.locality.as_deref(), Some("007"));
        assert_eq!(normalized, tax_return);
    }
}
