//! 2025 parameter fixtures shared by the unit tests.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::calculations::{FederalTaxEngine, StateRegistry};
use crate::models::*;

fn amounts(
    single: Decimal,
    joint: Decimal,
    separate: Decimal,
    head: Decimal,
) -> StatusAmounts {
    StatusAmounts {
        single,
        married_joint: Some(joint),
        married_separate: Some(separate),
        head_of_household: Some(head),
        qualifying_surviving_spouse: None,
    }
}

fn schedule(rows: &[(Decimal, Decimal)]) -> Vec<Bracket> {
    rows.iter().map(|&(threshold, rate)| Bracket::new(threshold, rate)).collect()
}

pub(crate) fn federal_2025() -> FederalTaxParameters {
    let rates = [
        dec!(0.10),
        dec!(0.12),
        dec!(0.22),
        dec!(0.24),
        dec!(0.32),
        dec!(0.35),
        dec!(0.37),
    ];
    let thresholds = |t: [Decimal; 7]| -> Vec<Bracket> {
        t.iter().zip(rates).map(|(&threshold, rate)| Bracket::new(threshold, rate)).collect()
    };
    let brackets = BracketTable {
        single: thresholds([
            dec!(0),
            dec!(11925),
            dec!(48475),
            dec!(103350),
            dec!(197300),
            dec!(250525),
            dec!(626350),
        ]),
        married_joint: Some(thresholds([
            dec!(0),
            dec!(23850),
            dec!(96950),
            dec!(206700),
            dec!(394600),
            dec!(501050),
            dec!(751600),
        ])),
        married_separate: Some(thresholds([
            dec!(0),
            dec!(11925),
            dec!(48475),
            dec!(103350),
            dec!(197300),
            dec!(250525),
            dec!(375800),
        ])),
        head_of_household: Some(thresholds([
            dec!(0),
            dec!(17000),
            dec!(64850),
            dec!(103350),
            dec!(197300),
            dec!(250500),
            dec!(626350),
        ])),
        qualifying_surviving_spouse: None,
    };

    let gains = |zero_top: Decimal, fifteen_top: Decimal| {
        schedule(&[
            (dec!(0), dec!(0)),
            (zero_top, dec!(0.15)),
            (fifteen_top, dec!(0.20)),
        ])
    };

    let eitc_start = amounts(dec!(10620), dec!(17730), dec!(10620), dec!(10620));
    let eitc_start_children = amounts(dec!(23350), dec!(30470), dec!(23350), dec!(23350));

    FederalTaxParameters {
        tax_year: 2025,
        brackets,
        standard_deduction: StandardDeductionParameters {
            base: amounts(dec!(15750), dec!(31500), dec!(15750), dec!(23625)),
            additional_married: dec!(1600),
            additional_unmarried: dec!(2000),
        },
        itemized: ItemizedParameters {
            medical_agi_floor: dec!(0.075),
            salt_cap: amounts(dec!(40000), dec!(40000), dec!(20000), dec!(40000)),
            salt_phase_down_threshold: amounts(
                dec!(500000),
                dec!(500000),
                dec!(250000),
                dec!(500000),
            ),
            salt_phase_down_rate: dec!(0.30),
            salt_floor: amounts(dec!(10000), dec!(10000), dec!(5000), dec!(10000)),
            charitable_cash_agi_limit: dec!(0.60),
        },
        adjustments: AdjustmentLimits {
            educator_expenses: dec!(300),
            hsa_contributions: dec!(8550),
            ira_contributions: dec!(7000),
            student_loan_interest: dec!(2500),
            student_loan_phase_out_start: amounts(dec!(85000), dec!(170000), dec!(0), dec!(85000)),
            student_loan_phase_out_end: amounts(dec!(100000), dec!(200000), dec!(0), dec!(100000)),
        },
        social_security: SocialSecurityParameters {
            base_amount: amounts(dec!(25000), dec!(32000), dec!(0), dec!(25000)),
            adjusted_base_amount: amounts(dec!(34000), dec!(44000), dec!(0), dec!(34000)),
            lower_inclusion_rate: dec!(0.50),
            upper_inclusion_rate: dec!(0.85),
        },
        capital_gains: CapitalGainParameters {
            brackets: BracketTable {
                single: gains(dec!(48350), dec!(533400)),
                married_joint: Some(gains(dec!(96700), dec!(600050))),
                married_separate: Some(gains(dec!(48350), dec!(300000))),
                head_of_household: Some(gains(dec!(64750), dec!(566700))),
                qualifying_surviving_spouse: None,
            },
            loss_limit: amounts(dec!(3000), dec!(3000), dec!(1500), dec!(3000)),
        },
        self_employment: SelfEmploymentParameters {
            ss_wage_max: dec!(176100),
            ss_tax_rate: dec!(0.124),
            medicare_tax_rate: dec!(0.029),
            net_earnings_factor: dec!(0.9235),
            deduction_factor: dec!(0.50),
            min_se_threshold: dec!(400),
        },
        additional_medicare: SurtaxParameters {
            rate: dec!(0.009),
            threshold: amounts(dec!(200000), dec!(250000), dec!(125000), dec!(200000)),
        },
        net_investment_income: SurtaxParameters {
            rate: dec!(0.038),
            threshold: amounts(dec!(200000), dec!(250000), dec!(125000), dec!(200000)),
        },
        amt: AmtParameters {
            exemption: amounts(dec!(88100), dec!(137000), dec!(68500), dec!(88100)),
            phase_out_threshold: amounts(dec!(626350), dec!(1252700), dec!(626350), dec!(626350)),
            phase_out_rate: dec!(0.25),
            lower_rate: dec!(0.26),
            upper_rate: dec!(0.28),
            rate_breakpoint: amounts(dec!(239100), dec!(239100), dec!(119550), dec!(239100)),
        },
        qbi: QbiParameters { rate: dec!(0.20) },
        credits: CreditParameters {
            child_tax_credit: ChildTaxCreditParameters {
                per_child: dec!(2200),
                per_other_dependent: dec!(500),
                refundable_per_child: dec!(1700),
                earned_income_floor: dec!(2500),
                refundable_rate: dec!(0.15),
                phase_out_threshold: amounts(
                    dec!(200000),
                    dec!(400000),
                    dec!(200000),
                    dec!(200000),
                ),
                phase_out_reduction: dec!(50),
                phase_out_step: dec!(1000),
            },
            earned_income: EarnedIncomeCreditParameters {
                investment_income_limit: dec!(11950),
                table: vec![
                    EarnedIncomeCreditRow {
                        qualifying_children: 0,
                        credit_rate: dec!(0.0765),
                        earned_income_amount: dec!(8490),
                        max_credit: dec!(649),
                        phase_out_rate: dec!(0.0765),
                        phase_out_start: eitc_start,
                    },
                    EarnedIncomeCreditRow {
                        qualifying_children: 1,
                        credit_rate: dec!(0.34),
                        earned_income_amount: dec!(12730),
                        max_credit: dec!(4328),
                        phase_out_rate: dec!(0.1598),
                        phase_out_start: eitc_start_children.clone(),
                    },
                    EarnedIncomeCreditRow {
                        qualifying_children: 2,
                        credit_rate: dec!(0.40),
                        earned_income_amount: dec!(17880),
                        max_credit: dec!(7152),
                        phase_out_rate: dec!(0.2106),
                        phase_out_start: eitc_start_children.clone(),
                    },
                    EarnedIncomeCreditRow {
                        qualifying_children: 3,
                        credit_rate: dec!(0.45),
                        earned_income_amount: dec!(17880),
                        max_credit: dec!(8046),
                        phase_out_rate: dec!(0.2106),
                        phase_out_start: eitc_start_children,
                    },
                ],
            },
            dependent_care: DependentCareParameters {
                expense_limit_one: dec!(3000),
                expense_limit_two_or_more: dec!(6000),
                max_rate: dec!(0.35),
                min_rate: dec!(0.20),
                rate_reduction_threshold: dec!(15000),
                rate_reduction_step: dec!(2000),
                rate_reduction_per_step: dec!(0.01),
            },
            education: EducationCreditParameters {
                first_tier_expenses: dec!(2000),
                second_tier_expenses: dec!(2000),
                second_tier_rate: dec!(0.25),
                refundable_share: dec!(0.40),
                phase_out_start: amounts(dec!(80000), dec!(160000), dec!(80000), dec!(80000)),
                phase_out_end: amounts(dec!(90000), dec!(180000), dec!(90000), dec!(90000)),
            },
        },
    }
}

pub(crate) fn federal_engine() -> FederalTaxEngine {
    let mut set = FederalParameterSet::new();
    set.insert(federal_2025()).expect("fixture parameters are valid");
    FederalTaxEngine::new(Arc::new(set))
}

pub(crate) fn state(code: &str) -> StateCode {
    StateCode::parse(code).expect("fixture state code")
}

/// Flat 4.95% state with a phased personal exemption, a refundable EITC
/// match and a local tax keyed by city.
pub(crate) fn flat_state_2025() -> StateTaxConfig {
    StateTaxConfig {
        state_code: state("ZF"),
        state_name: "Flatland".to_string(),
        tax_year: 2025,
        has_income_tax: true,
        is_flat_tax: true,
        allows_federal_tax_deduction: false,
        social_security_taxable: false,
        has_local_tax: true,
        starts_from: IncomeBase::FederalAgi,
        brackets: BracketTable::flat(dec!(0.0495)),
        deduction: DeductionPolicy::None,
        exemptions: ExemptionPolicy::PhasedByIncome {
            personal: dec!(2850),
            dependent: dec!(2850),
            elderly_or_blind: dec!(1000),
            phase_out: PhaseOut {
                threshold: amounts(dec!(250000), dec!(500000), dec!(250000), dec!(250000)),
                reduction: dec!(2850),
                step: dec!(1),
                partial_steps: PartialStep::Ignore,
            },
        },
        additions: vec![AdditionRule::OutOfStateMunicipalInterest],
        subtractions: vec![
            SubtractionRule::UsGovernmentInterest,
            SubtractionRule::RetirementIncome { cap: None },
        ],
        credits: vec![StateCreditRule::EarnedIncomeMatch {
            name: "earned_income_credit".to_string(),
            percent_of_federal: dec!(0.20),
            refundable: true,
        }],
        post_processing: Vec::new(),
        local_tax: Some(LocalTaxConfig {
            base: LocalTaxBase::StateTaxableIncome,
            default_rate: None,
            jurisdictions: [("Metro".to_string(), LocalRate::Flat { rate: dec!(0.01) })]
                .into_iter()
                .collect(),
        }),
    }
}

/// Progressive state with standard-or-itemized deductions, exemption
/// credits, a millionaire surtax and a dependent credit.
pub(crate) fn progressive_state_2025() -> StateTaxConfig {
    StateTaxConfig {
        state_code: state("ZP"),
        state_name: "Progressia".to_string(),
        tax_year: 2025,
        has_income_tax: true,
        is_flat_tax: false,
        allows_federal_tax_deduction: false,
        social_security_taxable: false,
        has_local_tax: false,
        starts_from: IncomeBase::FederalAgi,
        brackets: BracketTable::uniform(schedule(&[
            (dec!(0), dec!(0.02)),
            (dec!(10000), dec!(0.04)),
            (dec!(50000), dec!(0.06)),
        ])),
        deduction: DeductionPolicy::StandardOrItemized {
            standard: amounts(dec!(5000), dec!(10000), dec!(5000), dec!(7500)),
            exclude_state_income_tax: true,
        },
        exemptions: ExemptionPolicy::Credit {
            personal: dec!(150),
            dependent: dec!(400),
            phase_out: None,
        },
        additions: Vec::new(),
        subtractions: vec![SubtractionRule::UnemploymentCompensation],
        credits: vec![StateCreditRule::PerDependent {
            name: "child_credit".to_string(),
            amount: dec!(100),
            children_only: true,
            phase_out: None,
            refundable: false,
        }],
        post_processing: vec![PostProcessStep::Surtax {
            name: "millionaire_surtax".to_string(),
            threshold: StatusAmounts::uniform(dec!(1000000)),
            rate: dec!(0.04),
        }],
        local_tax: None,
    }
}

pub(crate) fn state_registry() -> Arc<StateRegistry> {
    let mut builder = StateRegistry::builder();
    builder
        .register(flat_state_2025())
        .expect("flat fixture is valid");
    builder
        .register(progressive_state_2025())
        .expect("progressive fixture is valid");
    builder
        .register(StateTaxConfig::no_income_tax(state("TX"), "Texas", 2025))
        .expect("no-tax fixture is valid");
    Arc::new(builder.build())
}

pub(crate) fn single_wage_earner() -> TaxReturn {
    let mut tax_return = TaxReturn::new(1, 2025, FilingStatusCode::Single);
    tax_return.income.wages = dec!(85000);
    tax_return.payments.federal_withholding = dec!(16000);
    tax_return
}
