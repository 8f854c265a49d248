mod breakdown;
mod filing_status;
mod jurisdiction;
mod snapshot;
mod state_config;
mod tax_bracket;
mod tax_return;
mod tax_year_config;

pub use breakdown::{CalculationBreakdown, DeductionType, FederalCredits, StateCalculationBreakdown};
pub use filing_status::{FilingStatusCode, StatusAmounts};
pub use jurisdiction::StateCode;
pub use snapshot::{CacheKey, CalculationResult, NewSnapshot, Snapshot};
pub use state_config::{
    AdditionRule, DeductionPolicy, ExemptionPolicy, IncomeBase, IncomeKind, LocalRate,
    LocalTaxBase, LocalTaxConfig, PartialStep, PhaseOut, PostProcessStep, StateCreditRule,
    StateTaxConfig, SubtractionRule,
};
pub use tax_bracket::{Bracket, BracketTable, validate_schedule};
pub use tax_return::{
    Adjustments, AmtPreferences, CreditInputs, DeductionMethod, Deductions, Income,
    ItemizedDeductions, MAX_AMOUNT, Payments, PriorYearCarryover, Residency, TaxReturn, Taxpayer,
};
pub use tax_year_config::{
    AdjustmentLimits, AmtParameters, CapitalGainParameters, ChildTaxCreditParameters,
    CreditParameters, DependentCareParameters, EarnedIncomeCreditParameters,
    EarnedIncomeCreditRow, EducationCreditParameters, FederalParameterSet, FederalTaxParameters,
    ItemizedParameters, QbiParameters, SelfEmploymentParameters, SocialSecurityParameters,
    StandardDeductionParameters, SurtaxParameters,
};
