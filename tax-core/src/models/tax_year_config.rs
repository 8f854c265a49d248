//! Federal parameter tables for one tax year.
//!
//! Every number the federal engine uses lives here and is injected by the
//! configuration loader; the engine itself carries no year-specific values.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CalcError;
use crate::models::{BracketTable, StatusAmounts};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfEmploymentParameters {
    /// Maximum earnings subject to social security tax.
    pub ss_wage_max: Decimal,
    /// Combined employer + employee social security rate (12.4%).
    pub ss_tax_rate: Decimal,
    /// Combined employer + employee Medicare rate (2.9%).
    pub medicare_tax_rate: Decimal,
    /// Share of net profit treated as net earnings (92.35%).
    pub net_earnings_factor: Decimal,
    /// Deductible share of SE tax (50%).
    pub deduction_factor: Decimal,
    /// At or below this many dollars of net earnings no SE tax is due.
    pub min_se_threshold: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurtaxParameters {
    pub rate: Decimal,
    pub threshold: StatusAmounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardDeductionParameters {
    pub base: StatusAmounts,
    /// Extra amount per 65-or-older / blind box for married statuses.
    pub additional_married: Decimal,
    /// Extra amount per box for single and head of household.
    pub additional_unmarried: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemizedParameters {
    /// Medical expenses are deductible above this share of AGI.
    pub medical_agi_floor: Decimal,
    pub salt_cap: StatusAmounts,
    /// MAGI above which the SALT cap starts to shrink.
    pub salt_phase_down_threshold: StatusAmounts,
    pub salt_phase_down_rate: Decimal,
    /// The SALT cap never shrinks below this.
    pub salt_floor: StatusAmounts,
    /// Cash gifts are limited to this share of AGI.
    pub charitable_cash_agi_limit: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentLimits {
    pub educator_expenses: Decimal,
    pub hsa_contributions: Decimal,
    pub ira_contributions: Decimal,
    pub student_loan_interest: Decimal,
    pub student_loan_phase_out_start: StatusAmounts,
    pub student_loan_phase_out_end: StatusAmounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialSecurityParameters {
    pub base_amount: StatusAmounts,
    pub adjusted_base_amount: StatusAmounts,
    pub lower_inclusion_rate: Decimal,
    pub upper_inclusion_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapitalGainParameters {
    /// 0% / 15% / 20% schedule stacked on top of ordinary income.
    pub brackets: BracketTable,
    pub loss_limit: StatusAmounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmtParameters {
    pub exemption: StatusAmounts,
    pub phase_out_threshold: StatusAmounts,
    pub phase_out_rate: Decimal,
    pub lower_rate: Decimal,
    pub upper_rate: Decimal,
    /// AMT base above which `upper_rate` applies.
    pub rate_breakpoint: StatusAmounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildTaxCreditParameters {
    pub per_child: Decimal,
    pub per_other_dependent: Decimal,
    pub refundable_per_child: Decimal,
    pub earned_income_floor: Decimal,
    pub refundable_rate: Decimal,
    pub phase_out_threshold: StatusAmounts,
    /// Dollars of credit lost per `phase_out_step` (or fraction) of MAGI.
    pub phase_out_reduction: Decimal,
    pub phase_out_step: Decimal,
}

/// One row of the earned income credit table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarnedIncomeCreditRow {
    pub qualifying_children: u32,
    pub credit_rate: Decimal,
    pub earned_income_amount: Decimal,
    pub max_credit: Decimal,
    pub phase_out_rate: Decimal,
    pub phase_out_start: StatusAmounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarnedIncomeCreditParameters {
    pub investment_income_limit: Decimal,
    /// Rows for 0, 1, 2 and 3+ qualifying children.
    pub table: Vec<EarnedIncomeCreditRow>,
}

impl EarnedIncomeCreditParameters {
    /// Row for `children` qualifying children, capped at the largest row.
    pub fn row(
        &self,
        children: u32,
    ) -> Option<&EarnedIncomeCreditRow> {
        self.table
            .iter()
            .filter(|row| row.qualifying_children <= children)
            .max_by_key(|row| row.qualifying_children)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentCareParameters {
    pub expense_limit_one: Decimal,
    pub expense_limit_two_or_more: Decimal,
    pub max_rate: Decimal,
    pub min_rate: Decimal,
    pub rate_reduction_threshold: Decimal,
    /// AGI dollars per one-point rate reduction.
    pub rate_reduction_step: Decimal,
    pub rate_reduction_per_step: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EducationCreditParameters {
    pub first_tier_expenses: Decimal,
    pub second_tier_expenses: Decimal,
    pub second_tier_rate: Decimal,
    pub refundable_share: Decimal,
    pub phase_out_start: StatusAmounts,
    pub phase_out_end: StatusAmounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditParameters {
    pub child_tax_credit: ChildTaxCreditParameters,
    pub earned_income: EarnedIncomeCreditParameters,
    pub dependent_care: DependentCareParameters,
    pub education: EducationCreditParameters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QbiParameters {
    pub rate: Decimal,
}

/// Every federal number for one tax year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederalTaxParameters {
    pub tax_year: i32,
    #[serde(default)]
    pub brackets: BracketTable,
    pub standard_deduction: StandardDeductionParameters,
    pub itemized: ItemizedParameters,
    pub adjustments: AdjustmentLimits,
    pub social_security: SocialSecurityParameters,
    pub capital_gains: CapitalGainParameters,
    pub self_employment: SelfEmploymentParameters,
    pub additional_medicare: SurtaxParameters,
    pub net_investment_income: SurtaxParameters,
    pub amt: AmtParameters,
    pub qbi: QbiParameters,
    pub credits: CreditParameters,
}

impl FederalTaxParameters {
    /// Validates the tables once at load time.
    ///
    /// # Errors
    ///
    /// [`CalcError::Configuration`] naming the first malformed table.
    pub fn validate(&self) -> Result<(), CalcError> {
        let year = self.tax_year;
        self.brackets.validate(&format!("federal {year} brackets"))?;
        self.capital_gains
            .brackets
            .validate(&format!("federal {year} capital gain brackets"))?;

        let rates = [
            ("self_employment.ss_tax_rate", self.self_employment.ss_tax_rate),
            ("self_employment.medicare_tax_rate", self.self_employment.medicare_tax_rate),
            ("self_employment.deduction_factor", self.self_employment.deduction_factor),
            ("additional_medicare.rate", self.additional_medicare.rate),
            ("net_investment_income.rate", self.net_investment_income.rate),
            ("amt.lower_rate", self.amt.lower_rate),
            ("amt.upper_rate", self.amt.upper_rate),
            ("amt.phase_out_rate", self.amt.phase_out_rate),
            ("qbi.rate", self.qbi.rate),
            ("itemized.medical_agi_floor", self.itemized.medical_agi_floor),
            ("itemized.charitable_cash_agi_limit", self.itemized.charitable_cash_agi_limit),
        ];
        for (name, rate) in rates {
            if rate < Decimal::ZERO || rate > Decimal::ONE {
                return Err(CalcError::Configuration(format!(
                    "federal {year} {name} must be between 0 and 1, got {rate}"
                )));
            }
        }

        let factor = self.self_employment.net_earnings_factor;
        if factor <= Decimal::ZERO || factor > Decimal::ONE {
            return Err(CalcError::Configuration(format!(
                "federal {year} net earnings factor must be in (0, 1], got {factor}"
            )));
        }
        if self.self_employment.ss_wage_max <= Decimal::ZERO {
            return Err(CalcError::Configuration(format!(
                "federal {year} social security wage maximum must be positive"
            )));
        }
        if self.credits.earned_income.row(0).is_none() {
            return Err(CalcError::Configuration(format!(
                "federal {year} earned income credit table needs a zero-children row"
            )));
        }
        if self.credits.child_tax_credit.phase_out_step <= Decimal::ZERO {
            return Err(CalcError::Configuration(format!(
                "federal {year} child tax credit phase-out step must be positive"
            )));
        }
        if self.credits.dependent_care.rate_reduction_step <= Decimal::ZERO {
            return Err(CalcError::Configuration(format!(
                "federal {year} dependent care reduction step must be positive"
            )));
        }
        Ok(())
    }
}

/// Federal parameters for every loaded year, shared read-only.
#[derive(Debug, Clone, Default)]
pub struct FederalParameterSet {
    years: BTreeMap<i32, Arc<FederalTaxParameters>>,
}

impl FederalParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and adds one year, replacing any previous entry.
    pub fn insert(
        &mut self,
        params: FederalTaxParameters,
    ) -> Result<(), CalcError> {
        params.validate()?;
        self.years.insert(params.tax_year, Arc::new(params));
        Ok(())
    }

    pub fn get(
        &self,
        tax_year: i32,
    ) -> Result<Arc<FederalTaxParameters>, CalcError> {
        self.years.get(&tax_year).cloned().ok_or_else(|| {
            CalcError::Configuration(format!("no federal parameters loaded for {tax_year}"))
        })
    }

    pub fn years(&self) -> Vec<i32> {
        self.years.keys().copied().collect()
    }
}
