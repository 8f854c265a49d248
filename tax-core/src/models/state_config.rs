//! Data-driven configuration for one state and tax year.
//!
//! Each state is a [`StateTaxConfig`] built from a handful of tagged
//! policies. A single generic calculator interprets them, so adding a state
//! means adding a data file rather than code.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calculations::common::{divide, multiply, non_negative, subtract};
use crate::error::CalcError;
use crate::models::{
    Bracket, BracketTable, FilingStatusCode, StateCode, StatusAmounts, validate_schedule,
};

/// How fractional steps past a phase-out threshold are counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialStep {
    /// "or fraction thereof": a partial step counts as a whole one.
    #[default]
    Count,
    /// Only complete steps reduce the amount.
    Ignore,
}

/// Stepped reduction of an amount as income rises past a threshold.
///
/// The amount shrinks by `reduction` for every `step` dollars of income over
/// `threshold` and never goes below zero. A `step` of one gives a per-dollar
/// rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseOut {
    pub threshold: StatusAmounts,
    pub reduction: Decimal,
    pub step: Decimal,
    #[serde(default)]
    pub partial_steps: PartialStep,
}

impl PhaseOut {
    pub fn apply(
        &self,
        amount: Decimal,
        income: Decimal,
        status: FilingStatusCode,
    ) -> Result<Decimal, CalcError> {
        let threshold = self.threshold.get(status);
        if income <= threshold {
            return Ok(amount);
        }
        let raw_steps = divide(subtract(income, threshold)?, self.step)?;
        let steps = match self.partial_steps {
            PartialStep::Count => raw_steps.ceil(),
            PartialStep::Ignore => raw_steps.floor(),
        };
        let reduced = subtract(amount, multiply(steps, self.reduction)?)?;
        Ok(non_negative(reduced))
    }

    fn validate(
        &self,
        context: &str,
    ) -> Result<(), CalcError> {
        if self.step <= Decimal::ZERO {
            return Err(CalcError::Configuration(format!(
                "{context}: phase-out step must be positive"
            )));
        }
        if self.reduction < Decimal::ZERO {
            return Err(CalcError::Configuration(format!(
                "{context}: phase-out reduction must be non-negative"
            )));
        }
        Ok(())
    }
}

/// Income items a state may tax directly instead of starting from a
/// federal figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeKind {
    Wages,
    SelfEmployment,
    Interest,
    Dividends,
    CapitalGains,
    /// Long-term gains net of losses, for capital gains excise taxes.
    LongTermCapitalGains,
    Retirement,
    Rental,
    Unemployment,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomeBase {
    FederalAgi,
    FederalTaxableIncome,
    StateGross { include: Vec<IncomeKind> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeductionPolicy {
    None,
    Standard {
        amounts: StatusAmounts,
    },
    StandardOrItemized {
        standard: StatusAmounts,
        /// Drop state income taxes from the federal itemized figure.
        #[serde(default)]
        exclude_state_income_tax: bool,
    },
    /// Whatever standard deduction the federal return used.
    FederalStandard,
    /// A standard deduction that shrinks with income down to a minimum.
    SlidingScale {
        maximum: StatusAmounts,
        minimum: StatusAmounts,
        threshold: StatusAmounts,
        reduction_rate: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExemptionPolicy {
    None,
    Flat {
        personal: Decimal,
        #[serde(default)]
        dependent: Decimal,
        #[serde(default)]
        elderly_or_blind: Decimal,
    },
    PhasedByIncome {
        personal: Decimal,
        #[serde(default)]
        dependent: Decimal,
        #[serde(default)]
        elderly_or_blind: Decimal,
        phase_out: PhaseOut,
    },
    /// Exemptions granted as nonrefundable credits against tax.
    Credit {
        personal: Decimal,
        #[serde(default)]
        dependent: Decimal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        phase_out: Option<PhaseOut>,
    },
}

/// Income taxable by the state but exempt federally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdditionRule {
    OutOfStateMunicipalInterest,
    HsaContributions,
    /// Add back state income tax deducted on a federal itemized return.
    StateIncomeTaxDeduction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubtractionRule {
    UsGovernmentInterest,
    RetirementIncome {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cap: Option<Decimal>,
    },
    MilitaryPay {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cap: Option<Decimal>,
    },
    UnemploymentCompensation,
    /// Share of net long-term gain excluded from state income.
    CapitalGainExclusion { percent: Decimal },
    /// Federal income tax paid, up to a cap.
    FederalTaxPaid { cap: StatusAmounts },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateCreditRule {
    /// A percentage of the federal earned income credit.
    EarnedIncomeMatch {
        name: String,
        percent_of_federal: Decimal,
        #[serde(default)]
        refundable: bool,
    },
    PerDependent {
        name: String,
        amount: Decimal,
        /// Count qualifying children only instead of all dependents.
        #[serde(default)]
        children_only: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        phase_out: Option<PhaseOut>,
        #[serde(default)]
        refundable: bool,
    },
    /// A fixed amount for filers at or below an AGI ceiling.
    LowIncome {
        name: String,
        max_agi: StatusAmounts,
        amount: Decimal,
        #[serde(default)]
        refundable: bool,
    },
    Flat {
        name: String,
        amount: StatusAmounts,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        phase_out: Option<PhaseOut>,
        #[serde(default)]
        refundable: bool,
    },
}

impl StateCreditRule {
    pub fn name(&self) -> &str {
        match self {
            Self::EarnedIncomeMatch { name, .. }
            | Self::PerDependent { name, .. }
            | Self::LowIncome { name, .. }
            | Self::Flat { name, .. } => name,
        }
    }

    pub fn is_refundable(&self) -> bool {
        match self {
            Self::EarnedIncomeMatch { refundable, .. }
            | Self::PerDependent { refundable, .. }
            | Self::LowIncome { refundable, .. }
            | Self::Flat { refundable, .. } => *refundable,
        }
    }
}

/// Steps applied after the bracket tax, for rules that do not fit brackets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PostProcessStep {
    /// Flat added rate on taxable income above a threshold.
    Surtax {
        name: String,
        threshold: StatusAmounts,
        rate: Decimal,
    },
    /// Claws back the benefit of the lower brackets as adjusted income
    /// rises, until all taxable income is effectively taxed at `top_rate`.
    BenefitRecapture {
        start: StatusAmounts,
        phase_in_range: Decimal,
        top_rate: Decimal,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalTaxBase {
    StateTaxableIncome,
    StateAdjustedIncome,
    Wages,
    /// A share of the state tax itself.
    StateTax,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LocalRate {
    Flat { rate: Decimal },
    Progressive { brackets: Vec<Bracket> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTaxConfig {
    pub base: LocalTaxBase,
    /// Rate for residents whose locality is not listed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_rate: Option<Decimal>,
    #[serde(default)]
    pub jurisdictions: BTreeMap<String, LocalRate>,
}

impl LocalTaxConfig {
    /// Finds a listed jurisdiction, ignoring ASCII case.
    pub fn jurisdiction(
        &self,
        locality: &str,
    ) -> Option<(&str, &LocalRate)> {
        let wanted = locality.trim();
        self.jurisdictions
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
            .map(|(name, rate)| (name.as_str(), rate))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTaxConfig {
    pub state_code: StateCode,
    pub state_name: String,
    pub tax_year: i32,
    pub has_income_tax: bool,
    #[serde(default)]
    pub is_flat_tax: bool,
    #[serde(default)]
    pub allows_federal_tax_deduction: bool,
    #[serde(default)]
    pub social_security_taxable: bool,
    #[serde(default)]
    pub has_local_tax: bool,
    pub starts_from: IncomeBase,
    #[serde(default)]
    pub brackets: BracketTable,
    pub deduction: DeductionPolicy,
    pub exemptions: ExemptionPolicy,
    #[serde(default)]
    pub additions: Vec<AdditionRule>,
    #[serde(default)]
    pub subtractions: Vec<SubtractionRule>,
    #[serde(default)]
    pub credits: Vec<StateCreditRule>,
    #[serde(default)]
    pub post_processing: Vec<PostProcessStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_tax: Option<LocalTaxConfig>,
}

impl StateTaxConfig {
    /// Configuration for a state without a broad income tax.
    pub fn no_income_tax(
        state_code: StateCode,
        state_name: impl Into<String>,
        tax_year: i32,
    ) -> Self {
        Self {
            state_code,
            state_name: state_name.into(),
            tax_year,
            has_income_tax: false,
            is_flat_tax: false,
            allows_federal_tax_deduction: false,
            social_security_taxable: false,
            has_local_tax: false,
            starts_from: IncomeBase::FederalAgi,
            brackets: BracketTable::default(),
            deduction: DeductionPolicy::None,
            exemptions: ExemptionPolicy::None,
            additions: Vec::new(),
            subtractions: Vec::new(),
            credits: Vec::new(),
            post_processing: Vec::new(),
            local_tax: None,
        }
    }

    /// Checks the configuration once, at load time.
    ///
    /// # Errors
    ///
    /// [`CalcError::Configuration`] describing the first inconsistency.
    pub fn validate(&self) -> Result<(), CalcError> {
        let context = format!("{} {}", self.state_code, self.tax_year);
        let config_error = |message: &str| CalcError::Configuration(format!("{context}: {message}"));

        if !self.has_income_tax {
            if !self.brackets.is_empty() {
                return Err(config_error("a state without income tax cannot carry brackets"));
            }
            return Ok(());
        }

        self.brackets.validate(&context)?;
        if self.is_flat_tax != self.brackets.is_single_rate() {
            return Err(config_error(
                "is_flat_tax must be set exactly when every schedule has one bracket",
            ));
        }
        if self.has_local_tax != self.local_tax.is_some() {
            return Err(config_error("has_local_tax must match the presence of local_tax"));
        }
        if self.allows_federal_tax_deduction
            != self
                .subtractions
                .iter()
                .any(|rule| matches!(rule, SubtractionRule::FederalTaxPaid { .. }))
        {
            return Err(config_error(
                "allows_federal_tax_deduction must match a federal_tax_paid subtraction",
            ));
        }

        match &self.exemptions {
            ExemptionPolicy::PhasedByIncome { phase_out, .. } => phase_out.validate(&context)?,
            ExemptionPolicy::Credit {
                phase_out: Some(phase_out),
                ..
            } => phase_out.validate(&context)?,
            _ => {}
        }
        if let DeductionPolicy::SlidingScale { reduction_rate, .. } = &self.deduction
            && (*reduction_rate < Decimal::ZERO || *reduction_rate > Decimal::ONE)
        {
            return Err(config_error("sliding scale reduction rate must be in [0, 1]"));
        }

        for rule in &self.subtractions {
            if let SubtractionRule::CapitalGainExclusion { percent } = rule
                && (*percent < Decimal::ZERO || *percent > Decimal::ONE)
            {
                return Err(config_error("capital gain exclusion must be in [0, 1]"));
            }
        }

        let mut names = Vec::with_capacity(self.credits.len());
        for rule in &self.credits {
            if names.contains(&rule.name()) {
                return Err(config_error(&format!("duplicate credit '{}'", rule.name())));
            }
            names.push(rule.name());
            match rule {
                StateCreditRule::PerDependent {
                    phase_out: Some(phase_out),
                    ..
                }
                | StateCreditRule::Flat {
                    phase_out: Some(phase_out),
                    ..
                } => phase_out.validate(&context)?,
                _ => {}
            }
        }

        for step in &self.post_processing {
            match step {
                PostProcessStep::Surtax { rate, .. } if *rate < Decimal::ZERO || *rate > Decimal::ONE => {
                    return Err(config_error("surtax rate must be in [0, 1]"));
                }
                PostProcessStep::BenefitRecapture { phase_in_range, .. }
                    if *phase_in_range <= Decimal::ZERO =>
                {
                    return Err(config_error("recapture phase-in range must be positive"));
                }
                _ => {}
            }
        }

        if let Some(local) = &self.local_tax {
            if local.default_rate.is_none() && local.jurisdictions.is_empty() {
                return Err(config_error("local tax needs a default rate or jurisdictions"));
            }
            for (name, rate) in &local.jurisdictions {
                match rate {
                    LocalRate::Flat { rate } if *rate < Decimal::ZERO || *rate > Decimal::ONE => {
                        return Err(config_error(&format!("local rate for {name} outside [0, 1]")));
                    }
                    LocalRate::Progressive { brackets } => {
                        validate_schedule(&format!("{context} local {name}"), brackets)?;
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    fn exemption_phase_out() -> PhaseOut {
        PhaseOut {
            threshold: StatusAmounts::uniform(dec!(30000)),
            reduction: dec!(1000),
            step: dec!(1000),
            partial_steps: PartialStep::Count,
        }
    }

    fn flat_state() -> StateTaxConfig {
        StateTaxConfig {
            state_code: StateCode::parse("IL").unwrap(),
            state_name: "Illinois".to_string(),
            tax_year: 2025,
            has_income_tax: true,
            is_flat_tax: true,
            allows_federal_tax_deduction: false,
            social_security_taxable: false,
            has_local_tax: false,
            starts_from: IncomeBase::FederalAgi,
            brackets: BracketTable::flat(dec!(0.0495)),
            deduction: DeductionPolicy::None,
            exemptions: ExemptionPolicy::Flat {
                personal: dec!(2850),
                dependent: dec!(2850),
                elderly_or_blind: dec!(1000),
            },
            additions: Vec::new(),
            subtractions: vec![SubtractionRule::RetirementIncome { cap: None }],
            credits: Vec::new(),
            post_processing: Vec::new(),
            local_tax: None,
        }
    }

    // =========================================================================
    // PhaseOut tests
    // =========================================================================

    #[test]
    fn phase_out_keeps_full_amount_at_threshold() {
        let result = exemption_phase_out()
            .apply(dec!(15000), dec!(30000), FilingStatusCode::Single)
            .unwrap();

        assert_eq!(result, dec!(15000));
    }

    #[test]
    fn phase_out_reduces_one_step_per_thousand() {
        let result = exemption_phase_out()
            .apply(dec!(15000), dec!(31000), FilingStatusCode::Single)
            .unwrap();

        assert_eq!(result, dec!(14000));
    }

    #[test]
    fn phase_out_floors_at_zero() {
        let phase_out = exemption_phase_out();

        assert_eq!(
            phase_out.apply(dec!(15000), dec!(45000), FilingStatusCode::Single).unwrap(),
            Decimal::ZERO
        );
        assert_eq!(
            phase_out.apply(dec!(15000), dec!(90000), FilingStatusCode::Single).unwrap(),
            Decimal::ZERO
        );
    }

    #[test]
    fn phase_out_partial_step_counting() {
        let mut phase_out = exemption_phase_out();

        assert_eq!(
            phase_out.apply(dec!(15000), dec!(30001), FilingStatusCode::Single).unwrap(),
            dec!(14000)
        );

        phase_out.partial_steps = PartialStep::Ignore;
        assert_eq!(
            phase_out.apply(dec!(15000), dec!(30999), FilingStatusCode::Single).unwrap(),
            dec!(15000)
        );
    }

    #[test]
    fn phase_out_per_dollar_rate() {
        let phase_out = PhaseOut {
            threshold: StatusAmounts::uniform(dec!(100000)),
            reduction: dec!(0.05),
            step: Decimal::ONE,
            partial_steps: PartialStep::Ignore,
        };

        let result = phase_out
            .apply(dec!(5000), dec!(110000), FilingStatusCode::Single)
            .unwrap();

        assert_eq!(result, dec!(4500.00));
    }

    // =========================================================================
    // StateTaxConfig validation tests
    // =========================================================================

    #[test]
    fn flat_state_validates() {
        assert_eq!(flat_state().validate(), Ok(()));
    }

    #[test]
    fn flat_flag_must_match_schedule() {
        let mut config = flat_state();
        config.is_flat_tax = false;

        assert!(matches!(config.validate(), Err(CalcError::Configuration(msg)) if msg.contains("is_flat_tax")));
    }

    #[test]
    fn local_flag_must_match_local_config() {
        let mut config = flat_state();
        config.has_local_tax = true;

        assert!(config.validate().is_err());
    }

    #[test]
    fn no_income_tax_state_cannot_have_brackets() {
        let mut config = StateTaxConfig::no_income_tax(StateCode::parse("TX").unwrap(), "Texas", 2025);
        assert_eq!(config.validate(), Ok(()));

        config.brackets = BracketTable::flat(dec!(0.01));
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_credit_names_are_rejected() {
        let mut config = flat_state();
        let credit = StateCreditRule::EarnedIncomeMatch {
            name: "eitc".to_string(),
            percent_of_federal: dec!(0.20),
            refundable: true,
        };
        config.credits = vec![credit.clone(), credit];

        assert!(config.validate().is_err());
    }

    #[test]
    fn local_jurisdiction_lookup_ignores_case() {
        let local = LocalTaxConfig {
            base: LocalTaxBase::StateTax,
            default_rate: None,
            jurisdictions: BTreeMap::from([(
                "Yonkers".to_string(),
                LocalRate::Flat { rate: dec!(0.1675) },
            )]),
        };

        let (name, _) = local.jurisdiction("YONKERS").unwrap();

        assert_eq!(name, "Yonkers");
        assert!(local.jurisdiction("Albany").is_none());
    }

    #[test]
    fn policies_deserialize_from_tagged_json() {
        let json = r#"{
            "type": "phased_by_income",
            "personal": "15000",
            "phase_out": {
                "threshold": { "S": "30000" },
                "reduction": "1000",
                "step": "1000"
            }
        }"#;

        let policy: ExemptionPolicy = serde_json::from_str(json).unwrap();

        match policy {
            ExemptionPolicy::PhasedByIncome {
                personal,
                dependent,
                phase_out,
                ..
            } => {
                assert_eq!(personal, dec!(15000));
                assert_eq!(dependent, Decimal::ZERO);
                assert_eq!(phase_out.partial_steps, PartialStep::Count);
            }
            other => panic!("unexpected policy {other:?}"),
        }
    }
}
