//! Immutable results produced by the federal and state calculators.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{FilingStatusCode, StateCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeductionType {
    Standard,
    Itemized,
    /// The state allows neither.
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederalCredits {
    pub child_tax_credit: Decimal,
    pub other_dependent_credit: Decimal,
    pub additional_child_tax_credit: Decimal,
    pub earned_income_credit: Decimal,
    pub dependent_care_credit: Decimal,
    pub education_credit_nonrefundable: Decimal,
    pub education_credit_refundable: Decimal,
    pub foreign_tax_credit: Decimal,
    pub other_nonrefundable: Decimal,
    pub other_refundable: Decimal,
}

impl FederalCredits {
    pub fn nonrefundable_total(&self) -> Decimal {
        self.child_tax_credit
            + self.other_dependent_credit
            + self.dependent_care_credit
            + self.education_credit_nonrefundable
            + self.foreign_tax_credit
            + self.other_nonrefundable
    }

    pub fn refundable_total(&self) -> Decimal {
        self.additional_child_tax_credit
            + self.earned_income_credit
            + self.education_credit_refundable
            + self.other_refundable
    }
}

/// Federal calculation output. Money is rounded to cents, rates to four
/// places.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationBreakdown {
    pub tax_year: i32,
    pub filing_status: FilingStatusCode,

    pub gross_income: Decimal,
    pub taxable_social_security: Decimal,
    /// Net capital gain or, for a net loss, the deductible (negative) part.
    pub net_capital_gain: Decimal,
    pub adjustments_total: Decimal,
    pub se_tax_deduction: Decimal,
    pub agi: Decimal,

    pub deduction_type: DeductionType,
    pub standard_deduction: Decimal,
    pub itemized_deduction: Decimal,
    pub salt_deduction: Decimal,
    pub deduction_amount: Decimal,
    pub qbi_deduction: Decimal,
    pub taxable_income: Decimal,
    pub ordinary_taxable_income: Decimal,
    pub preferential_income: Decimal,

    pub ordinary_tax: Decimal,
    pub preferential_tax: Decimal,
    pub income_tax: Decimal,
    pub amt: Decimal,
    pub self_employment_tax: Decimal,
    pub additional_medicare_tax: Decimal,
    pub net_investment_income_tax: Decimal,
    pub total_tax_before_credits: Decimal,

    pub credits: FederalCredits,
    pub nonrefundable_credits: Decimal,
    pub refundable_credits: Decimal,
    pub total_tax: Decimal,
    /// `total_tax - refundable_credits`; negative when credits exceed tax.
    pub net_tax_liability: Decimal,
    pub total_payments: Decimal,
    /// Positive is a refund, negative an amount owed.
    pub refund_or_owed: Decimal,

    pub effective_rate: Decimal,
    pub marginal_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCalculationBreakdown {
    pub state_code: StateCode,
    pub tax_year: i32,

    pub starting_income: Decimal,
    pub state_additions: Decimal,
    pub state_subtractions: Decimal,
    pub state_adjusted_income: Decimal,

    pub deduction_type: DeductionType,
    pub deduction_amount: Decimal,
    pub personal_exemption: Decimal,
    pub dependent_exemption: Decimal,
    /// Personal, dependent and age/blindness exemptions after phase-out.
    pub exemption_total: Decimal,
    pub taxable_income: Decimal,

    pub bracket_tax: Decimal,
    pub surtax: Decimal,
    pub recapture: Decimal,
    pub tax_before_credits: Decimal,

    pub state_credits: BTreeMap<String, Decimal>,
    pub nonrefundable_credits: Decimal,
    pub refundable_credits: Decimal,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_jurisdiction: Option<String>,
    pub local_tax: Decimal,

    /// Never negative; refundable credits beyond it flow into
    /// `refund_or_owed`.
    pub net_tax_liability: Decimal,
    pub withholding: Decimal,
    pub refund_or_owed: Decimal,
    pub effective_rate: Decimal,
}

impl StateCalculationBreakdown {
    /// An all-zero result for a state that levies no income tax.
    pub fn zero(
        state_code: StateCode,
        tax_year: i32,
        withholding: Decimal,
    ) -> Self {
        Self {
            state_code,
            tax_year,
            starting_income: Decimal::ZERO,
            state_additions: Decimal::ZERO,
            state_subtractions: Decimal::ZERO,
            state_adjusted_income: Decimal::ZERO,
            deduction_type: DeductionType::None,
            deduction_amount: Decimal::ZERO,
            personal_exemption: Decimal::ZERO,
            dependent_exemption: Decimal::ZERO,
            exemption_total: Decimal::ZERO,
            taxable_income: Decimal::ZERO,
            bracket_tax: Decimal::ZERO,
            surtax: Decimal::ZERO,
            recapture: Decimal::ZERO,
            tax_before_credits: Decimal::ZERO,
            state_credits: BTreeMap::new(),
            nonrefundable_credits: Decimal::ZERO,
            refundable_credits: Decimal::ZERO,
            local_jurisdiction: None,
            local_tax: Decimal::ZERO,
            net_tax_liability: Decimal::ZERO,
            withholding,
            refund_or_owed: withholding,
            effective_rate: Decimal::ZERO,
        }
    }
}
