//! JSON values in, SQLite rows out.

use serde_json::{Number, Value};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use turret_data::{DataError, Record};

use crate::error::SqlxErrorExt;

pub(crate) type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Bind positional JSON values. Arrays and objects are bound as JSON text.
///
/// Integers outside the `i64` range are rejected rather than rounded.
pub(crate) fn bind_all<'q>(
    mut query: SqliteQuery<'q>,
    binds: &'q [Value],
) -> Result<SqliteQuery<'q>, DataError> {
    for value in binds {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match (n.as_i64(), n.is_f64()) {
                (Some(i), _) => query.bind(i),
                (None, true) => query.bind(n.as_f64()),
                (None, false) => {
                    return Err(DataError::parameter(format!(
                        "integer {n} is out of range for SQLite"
                    )))
                }
            },
            Value::String(s) => query.bind(s.as_str()),
            other => query.bind(other.to_string()),
        };
    }
    Ok(query)
}

/// Decode a row by the storage class of each value.
pub(crate) fn decode_row(row: &SqliteRow) -> Result<Record, DataError> {
    let mut record = Record::new();
    for column in row.columns() {
        let index = column.ordinal();
        let raw = row.try_get_raw(index).map_err(SqlxErrorExt::into_data_error)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let class = raw.type_info().name().to_string();
            match class.as_str() {
                "INTEGER" => Value::from(get::<i64>(row, index)?),
                "REAL" => Number::from_f64(get::<f64>(row, index)?)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                "BLOB" => Value::from(get::<Vec<u8>>(row, index)?),
                _ => Value::String(get::<String>(row, index)?),
            }
        };
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

fn get<'r, T>(row: &'r SqliteRow, index: usize) -> Result<T, DataError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get::<T, _>(index).map_err(SqlxErrorExt::into_data_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_out_of_range_integer_is_rejected() {
        let binds = vec![json!(u64::MAX)];
        let err = bind_all(sqlx::query("SELECT ?"), &binds).err().unwrap();
        assert!(matches!(err, DataError::Parameter(_)));
    }

    #[test]
    fn test_numbers_bind() {
        let binds = vec![json!(i64::MAX), json!(-3), json!(1.5), json!(null), json!([1, 2])];
        assert!(bind_all(sqlx::query("SELECT ?, ?, ?, ?, ?"), &binds).is_ok());
    }
}
