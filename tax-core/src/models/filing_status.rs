use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FilingStatusCode {
    #[serde(rename = "S")]
    Single,
    #[serde(rename = "MFJ")]
    MarriedFilingJointly,
    #[serde(rename = "MFS")]
    MarriedFilingSeparately,
    #[serde(rename = "HOH")]
    HeadOfHousehold,
    #[serde(rename = "QSS")]
    QualifyingSurvivingSpouse,
}

impl FilingStatusCode {
    pub const ALL: [FilingStatusCode; 5] = [
        Self::Single,
        Self::MarriedFilingJointly,
        Self::MarriedFilingSeparately,
        Self::HeadOfHousehold,
        Self::QualifyingSurvivingSpouse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "S",
            Self::MarriedFilingJointly => "MFJ",
            Self::MarriedFilingSeparately => "MFS",
            Self::HeadOfHousehold => "HOH",
            Self::QualifyingSurvivingSpouse => "QSS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "S" => Some(Self::Single),
            "MFJ" => Some(Self::MarriedFilingJointly),
            "MFS" => Some(Self::MarriedFilingSeparately),
            "HOH" => Some(Self::HeadOfHousehold),
            "QSS" => Some(Self::QualifyingSurvivingSpouse),
            _ => None,
        }
    }

    /// Whether the return covers two spouses.
    pub fn is_joint(&self) -> bool {
        matches!(self, Self::MarriedFilingJointly)
    }

    /// Whether the filer is married for standard-deduction purposes.
    pub fn is_married(&self) -> bool {
        matches!(
            self,
            Self::MarriedFilingJointly
                | Self::MarriedFilingSeparately
                | Self::QualifyingSurvivingSpouse
        )
    }

    /// Number of personal exemptions the filing status carries.
    pub fn personal_exemption_count(&self) -> u32 {
        if self.is_joint() { 2 } else { 1 }
    }
}

impl fmt::Display for FilingStatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decimal amount per filing status.
///
/// Only `S` is required. Omitted statuses fall back: `MFJ`, `MFS` and `HOH`
/// to `S`, and `QSS` to `MFJ`. Parameter files therefore only spell out the
/// statuses that actually differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusAmounts {
    #[serde(rename = "S")]
    pub single: Decimal,
    #[serde(rename = "MFJ", default, skip_serializing_if = "Option::is_none")]
    pub married_joint: Option<Decimal>,
    #[serde(rename = "MFS", default, skip_serializing_if = "Option::is_none")]
    pub married_separate: Option<Decimal>,
    #[serde(rename = "HOH", default, skip_serializing_if = "Option::is_none")]
    pub head_of_household: Option<Decimal>,
    #[serde(rename = "QSS", default, skip_serializing_if = "Option::is_none")]
    pub qualifying_surviving_spouse: Option<Decimal>,
}

impl StatusAmounts {
    /// The same amount for every filing status.
    pub fn uniform(amount: Decimal) -> Self {
        Self {
            single: amount,
            married_joint: None,
            married_separate: None,
            head_of_household: None,
            qualifying_surviving_spouse: None,
        }
    }

    pub fn get(
        &self,
        status: FilingStatusCode,
    ) -> Decimal {
        let joint = self.married_joint.unwrap_or(self.single);
        match status {
            FilingStatusCode::Single => self.single,
            FilingStatusCode::MarriedFilingJointly => joint,
            FilingStatusCode::MarriedFilingSeparately => {
                self.married_separate.unwrap_or(self.single)
            }
            FilingStatusCode::HeadOfHousehold => self.head_of_household.unwrap_or(self.single),
            FilingStatusCode::QualifyingSurvivingSpouse => {
                self.qualifying_surviving_spouse.unwrap_or(joint)
            }
        }
    }

    /// Every resolved amount, in [`FilingStatusCode::ALL`] order.
    pub fn resolved(&self) -> impl Iterator<Item = (FilingStatusCode, Decimal)> + '_ {
        FilingStatusCode::ALL
            .into_iter()
            .map(move |status| (status, self.get(status)))
    }
}
