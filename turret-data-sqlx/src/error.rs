use turret_data::DataError;

/// Extension trait for converting `sqlx::Error` into `DataError`.
///
/// Due to Rust's orphan rules, `From<sqlx::Error> for DataError` can't live in
/// this crate. Use `.map_err(SqlxErrorExt::into_data_error)` instead.
pub trait SqlxErrorExt {
    fn into_data_error(self) -> DataError;
}

impl SqlxErrorExt for sqlx::Error {
    fn into_data_error(self) -> DataError {
        match self {
            sqlx::Error::Configuration(err) => {
                DataError::Other(format!("invalid database configuration: {err}"))
            }
            sqlx::Error::ColumnNotFound(column) => {
                DataError::parameter(format!("unknown column '{column}'"))
            }
            other => DataError::database(other),
        }
    }
}

/// Convenience alias for data-layer results using `DataError`.
pub type SqlxResult<T> = Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_is_database_error() {
        let err = sqlx::Error::RowNotFound.into_data_error();
        assert!(matches!(err, DataError::Database(_)));
    }

    #[test]
    fn test_column_not_found_is_parameter_error() {
        let err = sqlx::Error::ColumnNotFound("age".into()).into_data_error();
        assert_eq!(err.to_string(), "Invalid parameter: unknown column 'age'");
    }
}
