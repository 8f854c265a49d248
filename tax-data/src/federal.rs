use std::collections::BTreeMap;

use tax_core::{BracketTable, FederalTaxParameters};

use crate::error::TaxDataError;

/// Parses a federal parameter file.
///
/// Ordinary income brackets normally live in the bracket CSV; when the TOML
/// carries no `[brackets]` table they are taken from `schedules` for the
/// file's tax year. The result is validated before it is returned.
pub fn parse_federal(
    file: &str,
    text: &str,
    schedules: &BTreeMap<i32, BracketTable>,
) -> Result<FederalTaxParameters, TaxDataError> {
    let mut params: FederalTaxParameters =
        toml::from_str(text).map_err(|e| TaxDataError::toml(file, e))?;

    if params.brackets.is_empty() {
        params.brackets = schedules
            .get(&params.tax_year)
            .cloned()
            .ok_or(TaxDataError::MissingBrackets(params.tax_year))?;
    }

    params.validate()?;
    Ok(params)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use tax_core::{Bracket, CalcError, FilingStatusCode};

    use super::*;
    use crate::EMBEDDED_2025;

    fn schedules() -> BTreeMap<i32, BracketTable> {
        let mut table = BracketTable::uniform(vec![
            Bracket::new(dec!(0), dec!(0.10)),
            Bracket::new(dec!(10000), dec!(0.20)),
        ]);
        table.set(FilingStatusCode::MarriedFilingJointly, vec![Bracket::new(dec!(0), dec!(0.10))]);
        [(2025, table)].into_iter().collect()
    }

    #[test]
    fn brackets_come_from_the_schedules() {
        let params = parse_federal("federal.toml", EMBEDDED_2025.federal, &schedules()).unwrap();

        assert_eq!(params.tax_year, 2025);
        assert_eq!(params.brackets, schedules()[&2025]);
        assert_eq!(
            params.standard_deduction.base.get(FilingStatusCode::MarriedFilingJointly),
            dec!(31500)
        );
    }

    #[test]
    fn missing_schedule_year_is_an_error() {
        let result = parse_federal("federal.toml", EMBEDDED_2025.federal, &BTreeMap::new());

        assert!(matches!(result, Err(TaxDataError::MissingBrackets(2025))));
    }

    #[test]
    fn syntax_errors_name_the_file() {
        let err = parse_federal("broken.toml", "tax_year = ", &schedules()).unwrap_err();

        assert!(matches!(&err, TaxDataError::TomlParse { file, .. } if file == "broken.toml"));
    }

    #[test]
    fn invalid_parameters_fail_validation() {
        let text = EMBEDDED_2025
            .federal
            .replace("rate = \"0.20\"", "rate = \"1.20\"");

        let err = parse_federal("federal.toml", &text, &schedules()).unwrap_err();

        assert!(
            matches!(&err, TaxDataError::Config(CalcError::Configuration(msg)) if msg.contains("qbi.rate")),
            "got {err:?}"
        );
    }
}
