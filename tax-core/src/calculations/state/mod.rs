//! Generic state income tax calculator.
//!
//! Every state runs the same template; only its [`StateTaxConfig`] differs:
//!
//! 1. Starting base (federal AGI, federal taxable income or state gross)
//! 2. Additions and subtractions
//! 3. Deduction
//! 4. Exemptions, with phase-out
//! 5. Taxable income and bracket tax, plus surtax and recapture steps
//! 6. Credits, nonrefundable capped at the tax
//! 7. Local tax
//! 8. Net liability and refund or amount owed

mod registry;

pub use registry::{StateRegistry, StateRegistryBuilder};

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::debug;

use crate::calculations::brackets::progressive_tax;
use crate::calculations::common::{
    add, divide_or, linear_phase_out_fraction, max, min, multiply, non_negative, round_half_up,
    round_rate,
};
use crate::error::CalcError;
use crate::models::{
    AdditionRule, CalculationBreakdown, DeductionMethod, DeductionPolicy, DeductionType,
    ExemptionPolicy, IncomeBase, IncomeKind, LocalRate, LocalTaxBase, LocalTaxConfig,
    PostProcessStep, StateCalculationBreakdown, StateCreditRule, StateTaxConfig, SubtractionRule,
    TaxReturn,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Exemptions {
    personal: Decimal,
    dependent: Decimal,
    total: Decimal,
    /// Exemptions granted as credits instead of income reductions.
    personal_credit: Decimal,
    dependent_credit: Decimal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PostProcessed {
    surtax: Decimal,
    recapture: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct StateCredits {
    by_name: BTreeMap<String, Decimal>,
    nonrefundable: Decimal,
    refundable: Decimal,
}

/// Calculator for one `(state, tax year)` pair.
///
/// Holds its configuration behind an `Arc`; calculating never mutates it.
#[derive(Debug, Clone)]
pub struct StateCalculator {
    config: Arc<StateTaxConfig>,
}

impl StateCalculator {
    pub fn new(config: Arc<StateTaxConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StateTaxConfig {
        &self.config
    }

    pub fn calculate(
        &self,
        tax_return: &TaxReturn,
        federal: &CalculationBreakdown,
    ) -> Result<StateCalculationBreakdown, CalcError> {
        tax_return.validate()?;
        let config = &*self.config;
        let payments = &tax_return.payments;
        let withholding = add(payments.state_withholding, payments.state_estimated_payments)?;
        if !config.has_income_tax {
            debug!(state = %config.state_code, "state levies no income tax");
            return Ok(StateCalculationBreakdown::zero(
                config.state_code,
                config.tax_year,
                withholding,
            ));
        }
        let status = tax_return.taxpayer.filing_status;

        // 1 and 2
        let starting_income = self.starting_income(tax_return, federal);
        let state_additions = round_half_up(self.additions(tax_return, federal));
        let state_subtractions = round_half_up(self.subtractions(tax_return, federal)?);
        let state_adjusted_income =
            non_negative(starting_income + state_additions - state_subtractions);

        // 3
        let (deduction_type, deduction_amount) =
            self.deduction(tax_return, federal, state_adjusted_income)?;

        // 4
        let exemptions = self.exemptions(tax_return, federal)?;

        // 5
        let taxable_income = round_half_up(non_negative(
            state_adjusted_income - deduction_amount - exemptions.total,
        ));
        let bracket_tax =
            round_half_up(progressive_tax(config.brackets.get(status), taxable_income)?);
        let post = self.post_process(tax_return, taxable_income, state_adjusted_income, bracket_tax)?;
        let tax_before_credits = bracket_tax + post.surtax + post.recapture;

        // 6
        let credits = self.credits(tax_return, federal, &exemptions, tax_before_credits)?;

        // 7
        let tax_after_credits = tax_before_credits - credits.nonrefundable;
        let (local_jurisdiction, local_tax) = match &config.local_tax {
            Some(local) if config.has_local_tax => compute_local_tax(
                local,
                tax_return,
                taxable_income,
                state_adjusted_income,
                tax_after_credits,
            )?,
            _ => (None, Decimal::ZERO),
        };

        // 8
        let liability = tax_after_credits + local_tax;
        let net_tax_liability = non_negative(liability - credits.refundable);
        let refundable_excess = non_negative(credits.refundable - liability);
        let refund_or_owed = withholding + refundable_excess - net_tax_liability;
        let effective_rate = round_rate(divide_or(
            net_tax_liability,
            state_adjusted_income,
            Decimal::ZERO,
        )?);

        debug!(
            state = %config.state_code,
            %taxable_income,
            %tax_before_credits,
            %local_tax,
            %net_tax_liability,
            "state tax computed"
        );

        Ok(StateCalculationBreakdown {
            state_code: config.state_code,
            tax_year: config.tax_year,
            starting_income,
            state_additions,
            state_subtractions,
            state_adjusted_income,
            deduction_type,
            deduction_amount,
            personal_exemption: exemptions.personal,
            dependent_exemption: exemptions.dependent,
            exemption_total: exemptions.total,
            taxable_income,
            bracket_tax,
            surtax: post.surtax,
            recapture: post.recapture,
            tax_before_credits,
            state_credits: credits.by_name,
            nonrefundable_credits: credits.nonrefundable,
            refundable_credits: credits.refundable,
            local_jurisdiction,
            local_tax,
            net_tax_liability,
            withholding,
            refund_or_owed,
            effective_rate,
        })
    }

    fn starting_income(
        &self,
        tax_return: &TaxReturn,
        federal: &CalculationBreakdown,
    ) -> Decimal {
        match &self.config.starts_from {
            IncomeBase::FederalAgi => federal.agi,
            IncomeBase::FederalTaxableIncome => federal.taxable_income,
            IncomeBase::StateGross { include } => {
                let income = &tax_return.income;
                include
                    .iter()
                    .map(|kind| match kind {
                        IncomeKind::Wages => income.wages,
                        IncomeKind::SelfEmployment => income.self_employment_income,
                        IncomeKind::Interest => income.taxable_interest,
                        IncomeKind::Dividends => income.ordinary_dividends,
                        IncomeKind::CapitalGains => non_negative(federal.net_capital_gain),
                        IncomeKind::LongTermCapitalGains => non_negative(min(
                            income.long_term_capital_gains,
                            federal.net_capital_gain,
                        )),
                        IncomeKind::Retirement => income.retirement_distributions,
                        IncomeKind::Rental => income.rental_income,
                        IncomeKind::Unemployment => income.unemployment_compensation,
                        IncomeKind::Other => income.other_income,
                    })
                    .sum()
            }
        }
    }

    fn starts_from_federal(&self) -> bool {
        !matches!(self.config.starts_from, IncomeBase::StateGross { .. })
    }

    fn additions(
        &self,
        tax_return: &TaxReturn,
        federal: &CalculationBreakdown,
    ) -> Decimal {
        self.config
            .additions
            .iter()
            .map(|rule| match rule {
                AdditionRule::OutOfStateMunicipalInterest => {
                    tax_return.income.out_of_state_municipal_interest
                }
                AdditionRule::HsaContributions => tax_return.adjustments.hsa_contributions,
                AdditionRule::StateIncomeTaxDeduction => {
                    let claimed = federal.deduction_type == DeductionType::Itemized
                        && matches!(self.config.starts_from, IncomeBase::FederalTaxableIncome);
                    match (&tax_return.deductions.itemized, claimed) {
                        (Some(items), true) => min(items.state_income_taxes, federal.salt_deduction),
                        _ => Decimal::ZERO,
                    }
                }
            })
            .sum()
    }

    fn subtractions(
        &self,
        tax_return: &TaxReturn,
        federal: &CalculationBreakdown,
    ) -> Result<Decimal, CalcError> {
        let income = &tax_return.income;
        let status = tax_return.taxpayer.filing_status;
        let mut total = Decimal::ZERO;

        if !self.config.social_security_taxable && self.starts_from_federal() {
            total += federal.taxable_social_security;
        }

        for rule in &self.config.subtractions {
            total += match rule {
                SubtractionRule::UsGovernmentInterest => income.us_government_interest,
                SubtractionRule::RetirementIncome { cap } => {
                    capped(income.retirement_distributions, *cap)
                }
                SubtractionRule::MilitaryPay { cap } => capped(income.military_pay, *cap),
                SubtractionRule::UnemploymentCompensation => income.unemployment_compensation,
                SubtractionRule::CapitalGainExclusion { percent } => multiply(
                    non_negative(min(income.long_term_capital_gains, federal.net_capital_gain)),
                    *percent,
                )?,
                SubtractionRule::FederalTaxPaid { cap } => min(
                    non_negative(federal.income_tax + federal.amt - federal.nonrefundable_credits),
                    cap.get(status),
                ),
            };
        }
        Ok(total)
    }

    fn deduction(
        &self,
        tax_return: &TaxReturn,
        federal: &CalculationBreakdown,
        adjusted_income: Decimal,
    ) -> Result<(DeductionType, Decimal), CalcError> {
        let status = tax_return.taxpayer.filing_status;
        let chosen = match &self.config.deduction {
            DeductionPolicy::None => (DeductionType::None, Decimal::ZERO),
            DeductionPolicy::Standard { amounts } => (DeductionType::Standard, amounts.get(status)),
            DeductionPolicy::FederalStandard => {
                (DeductionType::Standard, federal.standard_deduction)
            }
            DeductionPolicy::StandardOrItemized {
                standard,
                exclude_state_income_tax,
            } => {
                let standard = standard.get(status);
                let itemized = match &tax_return.deductions.itemized {
                    Some(items) if *exclude_state_income_tax => non_negative(
                        federal.itemized_deduction
                            - min(items.state_income_taxes, federal.itemized_deduction),
                    ),
                    Some(_) => federal.itemized_deduction,
                    None => Decimal::ZERO,
                };
                let use_itemized = match tax_return.deductions.method {
                    DeductionMethod::Standard => false,
                    DeductionMethod::Itemized => true,
                    DeductionMethod::Auto => itemized > standard,
                };
                if use_itemized {
                    (DeductionType::Itemized, itemized)
                } else {
                    (DeductionType::Standard, standard)
                }
            }
            DeductionPolicy::SlidingScale {
                maximum,
                minimum,
                threshold,
                reduction_rate,
            } => {
                let reduction = multiply(
                    non_negative(adjusted_income - threshold.get(status)),
                    *reduction_rate,
                )?;
                (
                    DeductionType::Standard,
                    max(minimum.get(status), maximum.get(status) - reduction),
                )
            }
        };
        Ok((chosen.0, round_half_up(chosen.1)))
    }

    fn exemptions(
        &self,
        tax_return: &TaxReturn,
        federal: &CalculationBreakdown,
    ) -> Result<Exemptions, CalcError> {
        let taxpayer = &tax_return.taxpayer;
        let status = taxpayer.filing_status;
        let filers = Decimal::from(status.personal_exemption_count());
        let dependents = Decimal::from(taxpayer.dependents);
        let boxes = Decimal::from(taxpayer.elderly_or_blind_boxes());

        let exemptions = match &self.config.exemptions {
            ExemptionPolicy::None => Exemptions::default(),
            ExemptionPolicy::Flat {
                personal,
                dependent,
                elderly_or_blind,
            } => {
                let personal = multiply(*personal, filers)? + multiply(*elderly_or_blind, boxes)?;
                let dependent = multiply(*dependent, dependents)?;
                Exemptions {
                    personal,
                    dependent,
                    total: personal + dependent,
                    ..Exemptions::default()
                }
            }
            ExemptionPolicy::PhasedByIncome {
                personal,
                dependent,
                elderly_or_blind,
                phase_out,
            } => {
                let personal = multiply(*personal, filers)? + multiply(*elderly_or_blind, boxes)?;
                let dependent = multiply(*dependent, dependents)?;
                let total = phase_out.apply(personal + dependent, federal.agi, status)?;
                // What survives the phase-out is attributed to personal first.
                let personal_left = min(personal, total);
                Exemptions {
                    personal: personal_left,
                    dependent: total - personal_left,
                    total,
                    ..Exemptions::default()
                }
            }
            ExemptionPolicy::Credit {
                personal,
                dependent,
                phase_out,
            } => {
                let mut personal_credit = multiply(*personal, filers)?;
                let mut dependent_credit = multiply(*dependent, dependents)?;
                if let Some(phase_out) = phase_out {
                    personal_credit = phase_out.apply(personal_credit, federal.agi, status)?;
                    dependent_credit = phase_out.apply(dependent_credit, federal.agi, status)?;
                }
                Exemptions {
                    personal_credit,
                    dependent_credit,
                    ..Exemptions::default()
                }
            }
        };

        Ok(Exemptions {
            personal: round_half_up(exemptions.personal),
            dependent: round_half_up(exemptions.dependent),
            total: round_half_up(exemptions.total),
            personal_credit: round_half_up(exemptions.personal_credit),
            dependent_credit: round_half_up(exemptions.dependent_credit),
        })
    }

    fn post_process(
        &self,
        tax_return: &TaxReturn,
        taxable_income: Decimal,
        adjusted_income: Decimal,
        bracket_tax: Decimal,
    ) -> Result<PostProcessed, CalcError> {
        let status = tax_return.taxpayer.filing_status;
        let mut post = PostProcessed::default();

        for step in &self.config.post_processing {
            match step {
                PostProcessStep::Surtax {
                    name,
                    threshold,
                    rate,
                } => {
                    let amount = round_half_up(multiply(
                        non_negative(taxable_income - threshold.get(status)),
                        *rate,
                    )?);
                    debug!(surtax = %name, %amount, "surtax applied");
                    post.surtax += amount;
                }
                PostProcessStep::BenefitRecapture {
                    start,
                    phase_in_range,
                    top_rate,
                } => {
                    let start = start.get(status);
                    let benefit = non_negative(multiply(taxable_income, *top_rate)? - bracket_tax);
                    let fraction =
                        linear_phase_out_fraction(adjusted_income, start, start + *phase_in_range);
                    post.recapture += round_half_up(multiply(benefit, fraction)?);
                }
            }
        }
        Ok(post)
    }

    fn credits(
        &self,
        tax_return: &TaxReturn,
        federal: &CalculationBreakdown,
        exemptions: &Exemptions,
        tax_before_credits: Decimal,
    ) -> Result<StateCredits, CalcError> {
        let taxpayer = &tax_return.taxpayer;
        let status = taxpayer.filing_status;
        let mut remaining = tax_before_credits;
        let mut credits = StateCredits::default();

        let mut record_nonrefundable = |credits: &mut StateCredits, name: &str, amount: Decimal| {
            let allowed = min(non_negative(amount), remaining);
            remaining -= allowed;
            credits.nonrefundable += allowed;
            credits.by_name.insert(name.to_string(), allowed);
        };

        if let ExemptionPolicy::Credit { .. } = self.config.exemptions {
            record_nonrefundable(&mut credits, "personal_exemption_credit", exemptions.personal_credit);
            record_nonrefundable(&mut credits, "dependent_exemption_credit", exemptions.dependent_credit);
        }

        for rule in &self.config.credits {
            let amount = match rule {
                StateCreditRule::EarnedIncomeMatch {
                    percent_of_federal, ..
                } => multiply(federal.credits.earned_income_credit, *percent_of_federal)?,
                StateCreditRule::PerDependent {
                    amount,
                    children_only,
                    phase_out,
                    ..
                } => {
                    let count = if *children_only {
                        taxpayer.qualifying_children
                    } else {
                        taxpayer.dependents
                    };
                    let gross = multiply(*amount, Decimal::from(count))?;
                    match phase_out {
                        Some(phase_out) => phase_out.apply(gross, federal.agi, status)?,
                        None => gross,
                    }
                }
                StateCreditRule::LowIncome {
                    max_agi, amount, ..
                } => {
                    if federal.agi <= max_agi.get(status) {
                        *amount
                    } else {
                        Decimal::ZERO
                    }
                }
                StateCreditRule::Flat {
                    amount, phase_out, ..
                } => match phase_out {
                    Some(phase_out) => phase_out.apply(amount.get(status), federal.agi, status)?,
                    None => amount.get(status),
                },
            };
            let amount = round_half_up(amount);

            if rule.is_refundable() {
                credits.refundable += amount;
                credits.by_name.insert(rule.name().to_string(), amount);
            } else {
                record_nonrefundable(&mut credits, rule.name(), amount);
            }
        }

        Ok(credits)
    }
}

fn capped(
    amount: Decimal,
    cap: Option<Decimal>,
) -> Decimal {
    cap.map_or(amount, |cap| min(amount, cap))
}

/// Local tax and the jurisdiction it was looked up under.
fn compute_local_tax(
    local: &LocalTaxConfig,
    tax_return: &TaxReturn,
    taxable_income: Decimal,
    adjusted_income: Decimal,
    state_tax: Decimal,
) -> Result<(Option<String>, Decimal), CalcError> {
    let base = match local.base {
        LocalTaxBase::StateTaxableIncome => taxable_income,
        LocalTaxBase::StateAdjustedIncome => adjusted_income,
        LocalTaxBase::Wages => tax_return.income.wages,
        LocalTaxBase::StateTax => state_tax,
    };

    let listed = tax_return
        .taxpayer
        .residency
        .locality
        .as_deref()
        .and_then(|locality| local.jurisdiction(locality));

    let (jurisdiction, tax) = match (listed, local.default_rate) {
        (Some((name, LocalRate::Flat { rate })), _) => (Some(name.to_string()), multiply(base, *rate)?),
        (Some((name, LocalRate::Progressive { brackets })), _) => {
            (Some(name.to_string()), progressive_tax(brackets, base)?)
        }
        (None, Some(rate)) => (None, multiply(base, rate)?),
        (None, None) => (None, Decimal::ZERO),
    };
    Ok((jurisdiction, round_half_up(tax)))
}
