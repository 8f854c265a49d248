//! Federal income tax engine.
//!
//! Runs a return through the Form 1040 flow:
//!
//! | Step | Description |
//! |------|-------------|
//! | 1    | Validate the return |
//! | 2    | Net capital gain or deductible loss |
//! | 3    | Self-employment tax worksheet |
//! | 4    | Above-the-line adjustments and taxable social security |
//! | 5    | Gross income and AGI |
//! | 6    | Standard or itemized deduction |
//! | 7    | QBI deduction and taxable income |
//! | 8    | Ordinary and preferential (capital gain) tax |
//! | 9    | Additional Medicare tax and net investment income tax |
//! | 10   | Alternative minimum tax |
//! | 11   | Nonrefundable then refundable credits |
//! | 12   | Total tax, refund or amount owed, rates |
//!
//! Every number comes from [`FederalTaxParameters`]; the engine holds no
//! year-specific values. Money is rounded half-up to cents at each line.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::debug;

use crate::calculations::brackets::{layered_tax, marginal_rate, progressive_tax};
use crate::calculations::common::{
    add, divide_or, linear_phase_out_fraction, max, min, multiply, non_negative, round_half_up,
    round_rate, subtract, sum,
};
use crate::calculations::worksheets::{SeWorksheet, SeWorksheetResult};
use crate::error::CalcError;
use crate::models::{
    CalculationBreakdown, DeductionMethod, DeductionType, FederalCredits, FederalParameterSet,
    FederalTaxParameters, FilingStatusCode, TaxReturn,
};

/// Capital gains after losses have been netted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CapitalGainNetting {
    /// Gain included in income, or the (negative) deductible loss.
    net: Decimal,
    /// Long-term gain left after losses, eligible for preferential rates.
    net_long_term: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DeductionChoice {
    deduction_type: DeductionType,
    standard: Decimal,
    itemized: Decimal,
    salt: Decimal,
    amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CreditOutcome {
    credits: FederalCredits,
    nonrefundable: Decimal,
    refundable: Decimal,
}

/// Calculates federal tax for any year present in its parameter set.
#[derive(Debug, Clone)]
pub struct FederalTaxEngine {
    parameters: Arc<FederalParameterSet>,
}

impl FederalTaxEngine {
    pub fn new(parameters: Arc<FederalParameterSet>) -> Self {
        Self { parameters }
    }

    pub fn parameters(
        &self,
        tax_year: i32,
    ) -> Result<Arc<FederalTaxParameters>, CalcError> {
        self.parameters.get(tax_year)
    }

    /// Computes the full federal breakdown. The return is only read.
    ///
    /// # Errors
    ///
    /// - [`CalcError::Validation`] for malformed input
    /// - [`CalcError::Configuration`] when no parameters exist for the year
    /// - [`CalcError::Arithmetic`] on overflow
    pub fn calculate(
        &self,
        tax_return: &TaxReturn,
    ) -> Result<CalculationBreakdown, CalcError> {
        // Step 1
        tax_return.validate()?;
        let params = self.parameters.get(tax_return.tax_year)?;
        let status = tax_return.taxpayer.filing_status;
        let income = &tax_return.income;

        // Step 2
        let gains = net_capital_gains(tax_return, &params, status);

        // Step 3
        let se = SeWorksheet::new(&params.self_employment)
            .calculate(income.self_employment_income, income.wages)?;

        // Step 4
        let fixed_adjustments = fixed_adjustments(tax_return, &params, &se);
        let income_before_ss = sum([
            income.wages,
            income.self_employment_income,
            income.taxable_interest,
            income.ordinary_dividends,
            gains.net,
            income.retirement_distributions,
            income.rental_income,
            income.unemployment_compensation,
            income.other_income,
        ])?;
        let taxable_social_security = taxable_social_security(
            tax_return,
            &params,
            subtract(income_before_ss, fixed_adjustments)?,
        )?;

        // Step 5
        let gross_income = add(income_before_ss, taxable_social_security)?;
        let student_loan = student_loan_deduction(
            tax_return,
            &params,
            non_negative(gross_income - fixed_adjustments),
        );
        let adjustments_total = fixed_adjustments + student_loan;
        let agi = non_negative(gross_income - adjustments_total);
        debug!(%gross_income, %adjustments_total, %agi, "federal AGI computed");

        // Step 6
        let deduction = choose_deduction(tax_return, &params, agi)?;

        // Step 7
        let income_before_qbi = non_negative(agi - deduction.amount);
        let qbi_deduction = qbi_deduction(tax_return, &params, income_before_qbi, &gains)?;
        let taxable_income = non_negative(income_before_qbi - qbi_deduction);

        // Step 8
        let preferential_income = min(
            taxable_income,
            income.qualified_dividends + gains.net_long_term,
        );
        let ordinary_taxable_income = taxable_income - preferential_income;
        let ordinary_schedule = params.brackets.get(status);
        let ordinary_tax = round_half_up(progressive_tax(ordinary_schedule, ordinary_taxable_income)?);
        let preferential_tax = round_half_up(layered_tax(
            params.capital_gains.brackets.get(status),
            ordinary_taxable_income,
            preferential_income,
        )?);
        let income_tax = ordinary_tax + preferential_tax;

        // Step 9
        let additional_medicare_tax = round_half_up(multiply(
            params.additional_medicare.rate,
            non_negative(
                income.wages + se.net_earnings - params.additional_medicare.threshold.get(status),
            ),
        )?);
        let net_investment_income = non_negative(
            income.taxable_interest + income.ordinary_dividends + gains.net + income.rental_income,
        );
        let net_investment_income_tax = round_half_up(multiply(
            params.net_investment_income.rate,
            min(
                net_investment_income,
                non_negative(agi - params.net_investment_income.threshold.get(status)),
            ),
        )?);

        // Step 10
        let tentative_minimum_tax = tentative_minimum_tax(
            tax_return,
            &params,
            taxable_income,
            preferential_income,
            &deduction,
        )?;
        let amt = non_negative(tentative_minimum_tax - income_tax);
        debug!(%income_tax, %tentative_minimum_tax, %amt, "regular tax and AMT reconciled");

        // Step 11
        let prior_amt_credit = min(
            tax_return.carryover.amt_credit,
            non_negative(income_tax - tentative_minimum_tax),
        );
        let credits = apply_credits(tax_return, &params, agi, income_tax + amt, prior_amt_credit)?;

        // Step 12
        let self_employment_tax = se.self_employment_tax;
        let other_taxes = self_employment_tax + additional_medicare_tax + net_investment_income_tax;
        let total_tax_before_credits = income_tax + amt + other_taxes;
        let total_tax = non_negative(income_tax + amt - credits.nonrefundable) + other_taxes;
        let net_tax_liability = total_tax - credits.refundable;
        let total_payments =
            tax_return.payments.federal_withholding + tax_return.payments.federal_estimated_payments;
        let refund_or_owed = total_payments - net_tax_liability;
        let effective_rate = round_rate(divide_or(total_tax, agi, Decimal::ZERO)?);

        Ok(CalculationBreakdown {
            tax_year: tax_return.tax_year,
            filing_status: status,
            gross_income,
            taxable_social_security,
            net_capital_gain: gains.net,
            adjustments_total,
            se_tax_deduction: se.se_tax_deduction,
            agi,
            deduction_type: deduction.deduction_type,
            standard_deduction: deduction.standard,
            itemized_deduction: deduction.itemized,
            salt_deduction: deduction.salt,
            deduction_amount: deduction.amount,
            qbi_deduction,
            taxable_income,
            ordinary_taxable_income,
            preferential_income,
            ordinary_tax,
            preferential_tax,
            income_tax,
            amt,
            self_employment_tax,
            additional_medicare_tax,
            net_investment_income_tax,
            total_tax_before_credits,
            credits: credits.credits,
            nonrefundable_credits: credits.nonrefundable,
            refundable_credits: credits.refundable,
            total_tax,
            net_tax_liability,
            total_payments,
            refund_or_owed,
            effective_rate,
            marginal_rate: marginal_rate(ordinary_schedule, ordinary_taxable_income),
        })
    }
}

/// Nets losses against short-term gain first, then long-term gain, and
/// limits a remaining net loss to the annual deduction limit.
fn net_capital_gains(
    tax_return: &TaxReturn,
    params: &FederalTaxParameters,
    status: FilingStatusCode,
) -> CapitalGainNetting {
    let income = &tax_return.income;
    let losses = income.capital_losses + tax_return.carryover.capital_loss;

    let used_short = min(income.short_term_capital_gains, losses);
    let remaining = losses - used_short;
    let used_long = min(income.long_term_capital_gains, remaining);
    let unused = remaining - used_long;

    let net_short = income.short_term_capital_gains - used_short;
    let net_long_term = income.long_term_capital_gains - used_long;
    let deductible_loss = min(unused, params.capital_gains.loss_limit.get(status));

    CapitalGainNetting {
        net: net_short + net_long_term - deductible_loss,
        net_long_term,
    }
}

/// Adjustments that do not depend on AGI, including the deductible half of
/// SE tax.
fn fixed_adjustments(
    tax_return: &TaxReturn,
    params: &FederalTaxParameters,
    se: &SeWorksheetResult,
) -> Decimal {
    let adj = &tax_return.adjustments;
    let limits = &params.adjustments;
    let se_income = tax_return.income.self_employment_income;

    min(adj.educator_expenses, limits.educator_expenses)
        + min(adj.hsa_contributions, limits.hsa_contributions)
        + min(adj.ira_contributions, limits.ira_contributions)
        + min(adj.self_employed_health_insurance, se_income)
        + min(adj.self_employed_retirement, se_income)
        + adj.early_withdrawal_penalty
        + se.se_tax_deduction
}

/// Student loan interest, capped and phased out linearly over a MAGI range.
fn student_loan_deduction(
    tax_return: &TaxReturn,
    params: &FederalTaxParameters,
    magi: Decimal,
) -> Decimal {
    let status = tax_return.taxpayer.filing_status;
    if status == FilingStatusCode::MarriedFilingSeparately {
        return Decimal::ZERO;
    }
    let limits = &params.adjustments;
    let capped = min(
        tax_return.adjustments.student_loan_interest,
        limits.student_loan_interest,
    );
    let phased = linear_phase_out_fraction(
        magi,
        limits.student_loan_phase_out_start.get(status),
        limits.student_loan_phase_out_end.get(status),
    );
    round_half_up(capped * (Decimal::ONE - phased))
}

/// Taxable part of social security benefits from provisional income.
fn taxable_social_security(
    tax_return: &TaxReturn,
    params: &FederalTaxParameters,
    modified_income: Decimal,
) -> Result<Decimal, CalcError> {
    let benefits = tax_return.income.social_security_benefits;
    if benefits.is_zero() {
        return Ok(Decimal::ZERO);
    }
    let status = tax_return.taxpayer.filing_status;
    let ss = &params.social_security;
    let base = ss.base_amount.get(status);
    let adjusted_base = ss.adjusted_base_amount.get(status);

    let provisional = modified_income
        + tax_return.income.tax_exempt_interest
        + multiply(benefits, ss.lower_inclusion_rate)?;
    if provisional <= base {
        return Ok(Decimal::ZERO);
    }

    let lower_cap = multiply(benefits, ss.lower_inclusion_rate)?;
    if provisional <= adjusted_base {
        let taxable = min(lower_cap, multiply(provisional - base, ss.lower_inclusion_rate)?);
        return Ok(round_half_up(taxable));
    }

    let lower_tier = min(
        lower_cap,
        multiply(adjusted_base - base, ss.lower_inclusion_rate)?,
    );
    let upper_tier = multiply(provisional - adjusted_base, ss.upper_inclusion_rate)?;
    let taxable = min(
        multiply(benefits, ss.upper_inclusion_rate)?,
        upper_tier + lower_tier,
    );
    Ok(round_half_up(taxable))
}

fn standard_deduction(
    tax_return: &TaxReturn,
    params: &FederalTaxParameters,
) -> Decimal {
    let taxpayer = &tax_return.taxpayer;
    let status = taxpayer.filing_status;
    let std = &params.standard_deduction;
    let additional = if status.is_married() {
        std.additional_married
    } else {
        std.additional_unmarried
    };
    std.base.get(status) + additional * Decimal::from(taxpayer.elderly_or_blind_boxes())
}

/// Itemized total and the capped SALT part of it.
fn itemized_deduction(
    tax_return: &TaxReturn,
    params: &FederalTaxParameters,
    agi: Decimal,
) -> Result<(Decimal, Decimal), CalcError> {
    let Some(items) = &tax_return.deductions.itemized else {
        return Ok((Decimal::ZERO, Decimal::ZERO));
    };
    let status = tax_return.taxpayer.filing_status;
    let rules = &params.itemized;

    let medical = non_negative(items.medical_expenses - multiply(agi, rules.medical_agi_floor)?);

    let phase_down = multiply(
        non_negative(agi - rules.salt_phase_down_threshold.get(status)),
        rules.salt_phase_down_rate,
    )?;
    let salt_cap = max(
        rules.salt_floor.get(status),
        rules.salt_cap.get(status) - phase_down,
    );
    let salt = min(items.state_and_local_taxes()?, salt_cap);

    let charitable_cash = min(
        items.charitable_cash,
        multiply(agi, rules.charitable_cash_agi_limit)?,
    );

    let total = medical
        + salt
        + items.mortgage_interest
        + charitable_cash
        + items.charitable_noncash
        + items.casualty_losses
        + items.other;
    Ok((round_half_up(total), round_half_up(salt)))
}

fn choose_deduction(
    tax_return: &TaxReturn,
    params: &FederalTaxParameters,
    agi: Decimal,
) -> Result<DeductionChoice, CalcError> {
    let standard = standard_deduction(tax_return, params);
    let (itemized, salt) = itemized_deduction(tax_return, params, agi)?;

    let use_itemized = match tax_return.deductions.method {
        DeductionMethod::Standard => false,
        DeductionMethod::Itemized => true,
        DeductionMethod::Auto => itemized > standard,
    };

    Ok(if use_itemized {
        DeductionChoice {
            deduction_type: DeductionType::Itemized,
            standard,
            itemized,
            salt,
            amount: itemized,
        }
    } else {
        DeductionChoice {
            deduction_type: DeductionType::Standard,
            standard,
            itemized,
            salt: Decimal::ZERO,
            amount: standard,
        }
    })
}

/// Lesser of the QBI component and the taxable-income limit.
fn qbi_deduction(
    tax_return: &TaxReturn,
    params: &FederalTaxParameters,
    income_before_qbi: Decimal,
    gains: &CapitalGainNetting,
) -> Result<Decimal, CalcError> {
    let qbi = tax_return.income.qualified_business_income;
    if qbi.is_zero() {
        return Ok(Decimal::ZERO);
    }
    let rate = params.qbi.rate;
    let limit_base = non_negative(
        income_before_qbi - tax_return.income.qualified_dividends - non_negative(gains.net_long_term),
    );
    let deduction = min(multiply(qbi, rate)?, multiply(limit_base, rate)?);
    Ok(round_half_up(deduction))
}

/// Tentative minimum tax on the AMT base.
fn tentative_minimum_tax(
    tax_return: &TaxReturn,
    params: &FederalTaxParameters,
    taxable_income: Decimal,
    preferential_income: Decimal,
    deduction: &DeductionChoice,
) -> Result<Decimal, CalcError> {
    let status = tax_return.taxpayer.filing_status;
    let amt = &params.amt;

    let add_back = match deduction.deduction_type {
        DeductionType::Itemized => deduction.salt,
        _ => deduction.standard,
    };
    let amti = sum([taxable_income, add_back, tax_return.amt_preferences.total()?])?;

    let exemption_reduction = multiply(
        non_negative(amti - amt.phase_out_threshold.get(status)),
        amt.phase_out_rate,
    )?;
    let exemption = non_negative(amt.exemption.get(status) - exemption_reduction);
    let amt_base = non_negative(amti - exemption);

    let preferential = min(amt_base, preferential_income);
    let ordinary = amt_base - preferential;
    let breakpoint = amt.rate_breakpoint.get(status);
    let ordinary_tax = if ordinary <= breakpoint {
        multiply(ordinary, amt.lower_rate)?
    } else {
        multiply(breakpoint, amt.lower_rate)? + multiply(ordinary - breakpoint, amt.upper_rate)?
    };
    let preferential_tax = layered_tax(
        params.capital_gains.brackets.get(status),
        ordinary,
        preferential,
    )?;

    Ok(round_half_up(ordinary_tax + preferential_tax))
}

/// Takes up to `amount` from the remaining liability.
fn take(
    remaining: &mut Decimal,
    amount: Decimal,
) -> Decimal {
    let allowed = min(non_negative(amount), *remaining);
    *remaining -= allowed;
    allowed
}

fn dependent_care_credit(
    tax_return: &TaxReturn,
    params: &FederalTaxParameters,
    agi: Decimal,
) -> Result<Decimal, CalcError> {
    let care = &params.credits.dependent_care;
    let limit = match tax_return.credits.care_qualifying_persons {
        0 => return Ok(Decimal::ZERO),
        1 => care.expense_limit_one,
        _ => care.expense_limit_two_or_more,
    };
    let expenses = min(
        min(tax_return.credits.dependent_care_expenses, limit),
        tax_return.earned_income()?,
    );

    let steps = divide_or(
        non_negative(agi - care.rate_reduction_threshold),
        care.rate_reduction_step,
        Decimal::ZERO,
    )?
    .ceil();
    let rate = max(
        care.min_rate,
        care.max_rate - multiply(steps, care.rate_reduction_per_step)?,
    );
    Ok(round_half_up(multiply(expenses, rate)?))
}

/// Education credit split into `(nonrefundable, refundable)` parts.
fn education_credit(
    tax_return: &TaxReturn,
    params: &FederalTaxParameters,
    agi: Decimal,
) -> Result<(Decimal, Decimal), CalcError> {
    let inputs = &tax_return.credits;
    let status = tax_return.taxpayer.filing_status;
    if inputs.education_students == 0 || status == FilingStatusCode::MarriedFilingSeparately {
        return Ok((Decimal::ZERO, Decimal::ZERO));
    }
    let edu = &params.credits.education;
    let students = Decimal::from(inputs.education_students);
    let per_student = divide_or(inputs.education_expenses, students, Decimal::ZERO)?;

    let first_tier = min(per_student, edu.first_tier_expenses);
    let second_tier = min(non_negative(per_student - first_tier), edu.second_tier_expenses);
    let per_student_credit = first_tier + multiply(second_tier, edu.second_tier_rate)?;

    let phased = linear_phase_out_fraction(
        agi,
        edu.phase_out_start.get(status),
        edu.phase_out_end.get(status),
    );
    let total = round_half_up(multiply(per_student_credit, students)? * (Decimal::ONE - phased));
    let refundable = round_half_up(multiply(total, edu.refundable_share)?);
    Ok((total - refundable, refundable))
}

/// Child tax credit and other-dependent credit after the stepped phase-out,
/// as `(child_part, other_dependent_part)`.
fn child_credits(
    tax_return: &TaxReturn,
    params: &FederalTaxParameters,
    agi: Decimal,
) -> Result<(Decimal, Decimal), CalcError> {
    let ctc = &params.credits.child_tax_credit;
    let taxpayer = &tax_return.taxpayer;
    let children = Decimal::from(taxpayer.qualifying_children);
    let others = Decimal::from(taxpayer.dependents - taxpayer.qualifying_children);

    let child_amount = multiply(ctc.per_child, children)?;
    let gross = child_amount + multiply(ctc.per_other_dependent, others)?;
    let steps = divide_or(
        non_negative(agi - ctc.phase_out_threshold.get(taxpayer.filing_status)),
        ctc.phase_out_step,
        Decimal::ZERO,
    )?
    .ceil();
    let allowed = non_negative(gross - multiply(steps, ctc.phase_out_reduction)?);

    let child_part = min(allowed, child_amount);
    Ok((child_part, allowed - child_part))
}

fn earned_income_credit(
    tax_return: &TaxReturn,
    params: &FederalTaxParameters,
    agi: Decimal,
) -> Result<Decimal, CalcError> {
    let status = tax_return.taxpayer.filing_status;
    if status == FilingStatusCode::MarriedFilingSeparately {
        return Ok(Decimal::ZERO);
    }
    let eic = &params.credits.earned_income;
    let income = &tax_return.income;
    let investment_income = income.taxable_interest
        + income.tax_exempt_interest
        + income.ordinary_dividends
        + non_negative(income.short_term_capital_gains + income.long_term_capital_gains - income.capital_losses)
        + income.rental_income;
    if investment_income > eic.investment_income_limit {
        return Ok(Decimal::ZERO);
    }
    let Some(row) = eic.row(tax_return.taxpayer.qualifying_children) else {
        return Ok(Decimal::ZERO);
    };

    let earned = tax_return.earned_income()?;
    let phase_in = min(
        multiply(min(earned, row.earned_income_amount), row.credit_rate)?,
        row.max_credit,
    );
    let phase_out = multiply(
        non_negative(max(agi, earned) - row.phase_out_start.get(status)),
        row.phase_out_rate,
    )?;
    Ok(round_half_up(non_negative(phase_in - phase_out)))
}

/// Applies nonrefundable credits in order against `liability`, then
/// computes the refundable ones.
fn apply_credits(
    tax_return: &TaxReturn,
    params: &FederalTaxParameters,
    agi: Decimal,
    liability: Decimal,
    prior_amt_credit: Decimal,
) -> Result<CreditOutcome, CalcError> {
    let inputs = &tax_return.credits;
    let mut remaining = liability;

    let dependent_care_credit = take(&mut remaining, dependent_care_credit(tax_return, params, agi)?);
    let (education_nonrefundable, education_refundable) = education_credit(tax_return, params, agi)?;
    let education_credit_nonrefundable = take(&mut remaining, education_nonrefundable);
    let foreign_tax_credit = take(&mut remaining, inputs.foreign_tax_paid);
    let (child_part, other_dependent_part) = child_credits(tax_return, params, agi)?;
    let child_tax_credit = take(&mut remaining, child_part);
    let other_dependent_credit = take(&mut remaining, other_dependent_part);
    // Prior-year AMT credit rides with the other nonrefundable credits.
    let other_nonrefundable = take(&mut remaining, inputs.other_nonrefundable + prior_amt_credit);

    let ctc = &params.credits.child_tax_credit;
    let additional_child_tax_credit = round_half_up(min(
        min(
            child_part - child_tax_credit,
            multiply(
                ctc.refundable_per_child,
                Decimal::from(tax_return.taxpayer.qualifying_children),
            )?,
        ),
        multiply(
            non_negative(tax_return.earned_income()? - ctc.earned_income_floor),
            ctc.refundable_rate,
        )?,
    ));
    let earned_income_credit = earned_income_credit(tax_return, params, agi)?;

    let credits = FederalCredits {
        child_tax_credit,
        other_dependent_credit,
        additional_child_tax_credit,
        earned_income_credit,
        dependent_care_credit,
        education_credit_nonrefundable,
        education_credit_refundable: education_refundable,
        foreign_tax_credit,
        other_nonrefundable,
        other_refundable: inputs.other_refundable,
    };
    let nonrefundable = credits.nonrefundable_total();
    let refundable = credits.refundable_total();
    debug!(%nonrefundable, %refundable, "federal credits applied");

    Ok(CreditOutcome {
        credits,
        nonrefundable,
        refundable,
    })
}
