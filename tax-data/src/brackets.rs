use std::collections::BTreeMap;
use std::io::Read;

use rust_decimal::Decimal;
use serde::Deserialize;
use tax_core::calculations::brackets::progressive_tax;
use tax_core::{Bracket, BracketTable, FilingStatusCode};

use crate::error::TaxDataError;

/// Maps IRS schedule codes to filing statuses.
///
/// - Schedule X → Single (S)
/// - Schedule Y-1 → Married Filing Jointly (MFJ) and Qualifying Surviving Spouse (QSS)
/// - Schedule Y-2 → Married Filing Separately (MFS)
/// - Schedule Z → Head of Household (HOH)
fn schedule_to_filing_statuses(schedule: &str) -> Result<&'static [FilingStatusCode], TaxDataError> {
    match schedule {
        "X" => Ok(&[FilingStatusCode::Single]),
        "Y-1" => Ok(&[
            FilingStatusCode::MarriedFilingJointly,
            FilingStatusCode::QualifyingSurvivingSpouse,
        ]),
        "Y-2" => Ok(&[FilingStatusCode::MarriedFilingSeparately]),
        "Z" => Ok(&[FilingStatusCode::HeadOfHousehold]),
        _ => Err(TaxDataError::InvalidSchedule(schedule.to_string())),
    }
}

/// A single record from the federal bracket CSV file.
///
/// The CSV format uses IRS schedule designations:
/// - `tax_year`: The tax year (e.g., 2025)
/// - `schedule`: The IRS schedule code (X, Y-1, Y-2, Z)
/// - `min_income`: The minimum income for this bracket
/// - `max_income`: The maximum income for this bracket (empty for unlimited)
/// - `base_tax`: The published tax owed at `min_income`
/// - `rate`: The marginal tax rate as a decimal (e.g., 0.10 for 10%)
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TaxBracketRecord {
    pub tax_year: i32,
    pub schedule: String,
    pub min_income: Decimal,
    #[serde(deserialize_with = "deserialize_optional_decimal")]
    pub max_income: Option<Decimal>,
    pub base_tax: Decimal,
    pub rate: Decimal,
}

fn deserialize_optional_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s
            .trim()
            .parse::<Decimal>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// Loader for the federal bracket schedules.
///
/// The CSV uses IRS schedule codes (X, Y-1, Y-2, Z). [`Self::build`] turns
/// the rows into one [`BracketTable`] per tax year after checking that every
/// schedule is contiguous and that each published `base_tax` agrees with
/// the progressive computation over the rows below it.
pub struct BracketScheduleLoader;

impl BracketScheduleLoader {
    /// Parse bracket records from a CSV reader.
    pub fn parse<R: Read>(reader: R) -> Result<Vec<TaxBracketRecord>, TaxDataError> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut records = Vec::new();

        for result in csv_reader.deserialize() {
            let record: TaxBracketRecord = result?;
            records.push(record);
        }

        Ok(records)
    }

    /// Group records into per-year bracket tables.
    ///
    /// Rows may appear in any order. Schedule Y-1 fills both MFJ and QSS.
    pub fn build(records: &[TaxBracketRecord]) -> Result<BTreeMap<i32, BracketTable>, TaxDataError> {
        let mut groups: BTreeMap<(i32, &str), Vec<&TaxBracketRecord>> = BTreeMap::new();
        for record in records {
            groups
                .entry((record.tax_year, record.schedule.as_str()))
                .or_default()
                .push(record);
        }

        let mut tables: BTreeMap<i32, BracketTable> = BTreeMap::new();
        for ((tax_year, schedule), mut rows) in groups {
            let statuses = schedule_to_filing_statuses(schedule)?;
            rows.sort_by_key(|row| row.min_income);
            let brackets = Self::check_schedule(tax_year, schedule, &rows)?;

            let table = tables.entry(tax_year).or_default();
            for status in statuses {
                table.set(*status, brackets.clone());
            }
        }

        Ok(tables)
    }

    fn check_schedule(
        tax_year: i32,
        schedule: &str,
        rows: &[&TaxBracketRecord],
    ) -> Result<Vec<Bracket>, TaxDataError> {
        let layout_error = |message: String| TaxDataError::BracketLayout {
            tax_year,
            schedule: schedule.to_string(),
            message,
        };

        let mut brackets: Vec<Bracket> = Vec::with_capacity(rows.len());
        let mut expected_min = Decimal::ZERO;
        for (i, row) in rows.iter().enumerate() {
            if row.min_income != expected_min {
                return Err(layout_error(format!(
                    "row starting at {} should start at {expected_min}",
                    row.min_income
                )));
            }

            let expected_base = progressive_tax(&brackets, row.min_income)?;
            if row.base_tax != expected_base {
                return Err(TaxDataError::BaseTaxMismatch {
                    tax_year,
                    schedule: schedule.to_string(),
                    min_income: row.min_income,
                    expected: expected_base,
                    found: row.base_tax,
                });
            }

            let is_last = i + 1 == rows.len();
            match (row.max_income, is_last) {
                (Some(max), false) if max > row.min_income => expected_min = max,
                (Some(max), false) => {
                    return Err(layout_error(format!(
                        "row {} has max_income {max} at or below min_income",
                        row.min_income
                    )));
                }
                (None, true) => {}
                (None, false) => {
                    return Err(layout_error(format!(
                        "only the top row may be unbounded, but the row at {} is",
                        row.min_income
                    )));
                }
                (Some(_), true) => {
                    return Err(layout_error("the top row must leave max_income empty".to_string()));
                }
            }

            brackets.push(Bracket::new(row.min_income, row.rate));
        }

        Ok(brackets)
    }
}
