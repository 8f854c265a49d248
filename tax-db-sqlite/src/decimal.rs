use rust_decimal::Decimal;
use sqlx::{Row, TypeInfo, ValueRef};
use tax_core::StoreError;

/// Money and rates are stored as TEXT so no binary float ever touches them.
pub fn decimal_to_text(d: Decimal) -> String {
    d.to_string()
}

pub fn parse_decimal(
    column: &str,
    text: &str,
) -> Result<Decimal, StoreError> {
    text.parse::<Decimal>().map_err(|e| {
        StoreError::Database(format!(
            "Failed to parse decimal '{}' in '{}': {}",
            text, column, e
        ))
    })
}

/// Get a decimal value from a TEXT column. Any other storage class is an
/// error.
pub fn get_decimal(
    row: &sqlx::sqlite::SqliteRow,
    column: &str,
) -> Result<Decimal, StoreError> {
    let value_ref = row
        .try_get_raw(column)
        .map_err(|e| StoreError::Database(format!("Column '{}' not found: {}", column, e)))?;

    let type_info = value_ref.type_info();
    let type_name = type_info.name();
    if type_name != "TEXT" {
        return Err(StoreError::Database(format!(
            "Unexpected type '{}' for column '{}'",
            type_name, column
        )));
    }

    let text: String = row.try_get(column).map_err(|e| {
        StoreError::Database(format!("Failed to get TEXT from '{}': {}", column, e))
    })?;
    parse_decimal(column, &text)
}
