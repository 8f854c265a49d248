use tax_core::StateTaxConfig;
use toml::{Table, Value};

use crate::error::TaxDataError;

/// Parses a state configuration file.
///
/// The file is a `[[state]]` array of [`StateTaxConfig`] tables. A
/// top-level `tax_year` is inherited by every state that does not set its
/// own. Each configuration is validated; duplicate states are left to the
/// registry to reject.
pub fn parse_states(
    file: &str,
    text: &str,
) -> Result<Vec<StateTaxConfig>, TaxDataError> {
    let mut table: Table = text.parse().map_err(|e| TaxDataError::toml(file, e))?;

    let default_year = table.get("tax_year").cloned();
    let entries = match table.remove("state") {
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            return Err(TaxDataError::TomlParse {
                file: file.to_string(),
                message: "`state` must be an array of tables ([[state]])".to_string(),
            });
        }
        None => Vec::new(),
    };

    let mut configs = Vec::with_capacity(entries.len());
    for mut entry in entries {
        if let (Value::Table(state), Some(year)) = (&mut entry, &default_year)
            && !state.contains_key("tax_year")
        {
            state.insert("tax_year".to_string(), year.clone());
        }
        let config: StateTaxConfig = entry.try_into().map_err(|e| TaxDataError::toml(file, e))?;
        config.validate()?;
        configs.push(config);
    }

    Ok(configs)
}
