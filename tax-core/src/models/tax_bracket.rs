use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CalcError;
use crate::models::FilingStatusCode;

/// A marginal rate that applies to income above `threshold`.
///
/// Serialized as a `[threshold, rate]` pair so parameter files stay compact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(Decimal, Decimal)", into = "(Decimal, Decimal)")]
pub struct Bracket {
    pub threshold: Decimal,
    pub rate: Decimal,
}

impl Bracket {
    pub fn new(
        threshold: Decimal,
        rate: Decimal,
    ) -> Self {
        Self { threshold, rate }
    }
}

impl From<(Decimal, Decimal)> for Bracket {
    fn from((threshold, rate): (Decimal, Decimal)) -> Self {
        Self { threshold, rate }
    }
}

impl From<Bracket> for (Decimal, Decimal) {
    fn from(bracket: Bracket) -> Self {
        (bracket.threshold, bracket.rate)
    }
}

/// Checks that a schedule starts at zero, has strictly increasing
/// thresholds and only carries rates in `[0, 1]`.
pub fn validate_schedule(
    context: &str,
    brackets: &[Bracket],
) -> Result<(), CalcError> {
    let first = brackets
        .first()
        .ok_or_else(|| CalcError::Configuration(format!("{context}: empty bracket schedule")))?;
    if !first.threshold.is_zero() {
        return Err(CalcError::Configuration(format!(
            "{context}: first threshold must be 0, got {}",
            first.threshold
        )));
    }
    for pair in brackets.windows(2) {
        if pair[1].threshold <= pair[0].threshold {
            return Err(CalcError::Configuration(format!(
                "{context}: thresholds must be strictly increasing ({} then {})",
                pair[0].threshold, pair[1].threshold
            )));
        }
    }
    if let Some(bad) = brackets
        .iter()
        .find(|b| b.rate < Decimal::ZERO || b.rate > Decimal::ONE)
    {
        return Err(CalcError::Configuration(format!(
            "{context}: rate {} outside [0, 1]",
            bad.rate
        )));
    }
    Ok(())
}

/// Bracket schedules keyed by filing status, with the same fallback rules
/// as [`crate::models::StatusAmounts`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketTable {
    #[serde(rename = "S", default)]
    pub single: Vec<Bracket>,
    #[serde(rename = "MFJ", default, skip_serializing_if = "Option::is_none")]
    pub married_joint: Option<Vec<Bracket>>,
    #[serde(rename = "MFS", default, skip_serializing_if = "Option::is_none")]
    pub married_separate: Option<Vec<Bracket>>,
    #[serde(rename = "HOH", default, skip_serializing_if = "Option::is_none")]
    pub head_of_household: Option<Vec<Bracket>>,
    #[serde(rename = "QSS", default, skip_serializing_if = "Option::is_none")]
    pub qualifying_surviving_spouse: Option<Vec<Bracket>>,
}

impl BracketTable {
    /// One schedule for every filing status.
    pub fn uniform(brackets: Vec<Bracket>) -> Self {
        Self {
            single: brackets,
            ..Self::default()
        }
    }

    /// A single-rate schedule for every filing status.
    pub fn flat(rate: Decimal) -> Self {
        Self::uniform(vec![Bracket::new(Decimal::ZERO, rate)])
    }

    pub fn get(
        &self,
        status: FilingStatusCode,
    ) -> &[Bracket] {
        let joint = self.married_joint.as_deref().unwrap_or(&self.single);
        match status {
            FilingStatusCode::Single => &self.single,
            FilingStatusCode::MarriedFilingJointly => joint,
            FilingStatusCode::MarriedFilingSeparately => {
                self.married_separate.as_deref().unwrap_or(&self.single)
            }
            FilingStatusCode::HeadOfHousehold => {
                self.head_of_household.as_deref().unwrap_or(&self.single)
            }
            FilingStatusCode::QualifyingSurvivingSpouse => self
                .qualifying_surviving_spouse
                .as_deref()
                .unwrap_or(joint),
        }
    }

    pub fn set(
        &mut self,
        status: FilingStatusCode,
        brackets: Vec<Bracket>,
    ) {
        match status {
            FilingStatusCode::Single => self.single = brackets,
            FilingStatusCode::MarriedFilingJointly => self.married_joint = Some(brackets),
            FilingStatusCode::MarriedFilingSeparately => self.married_separate = Some(brackets),
            FilingStatusCode::HeadOfHousehold => self.head_of_household = Some(brackets),
            FilingStatusCode::QualifyingSurvivingSpouse => {
                self.qualifying_surviving_spouse = Some(brackets)
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        FilingStatusCode::ALL
            .iter()
            .all(|status| self.get(*status).is_empty())
    }

    /// True when every filing status resolves to a one-bracket schedule.
    pub fn is_single_rate(&self) -> bool {
        FilingStatusCode::ALL
            .iter()
            .all(|status| self.get(*status).len() == 1)
    }

    pub fn validate(
        &self,
        context: &str,
    ) -> Result<(), CalcError> {
        for status in FilingStatusCode::ALL {
            validate_schedule(&format!("{context} [{status}]"), self.get(status))?;
        }
        Ok(())
    }
}
