use crate::config::ConfigError;

/// Errors that can occur in the data layer.
#[derive(Debug)]
pub enum DataError {
    /// Unknown configuration or entity name, or invalid entity options.
    Config(ConfigError),
    /// The adapter could not build a parameter for an entity or query.
    Parameter(String),
    /// A session operation failed (connection, transport, statement).
    Database(Box<dyn std::error::Error + Send + Sync>),
    /// The controller's unit of work has already finished.
    Closed,
    /// A custom repository could not be produced for an entity.
    Repository(String),
    Other(String),
}

impl DataError {
    /// Construct a `Database` variant from any error type.
    ///
    /// Used by adapter crates (e.g. `turret-data-sqlx`) to wrap
    /// driver-specific errors.
    pub fn database(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        DataError::Database(Box::new(err))
    }

    pub fn parameter(msg: impl Into<String>) -> Self {
        DataError::Parameter(msg.into())
    }
}

impl std::fmt::Display for DataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataError::Config(err) => write!(f, "Configuration error: {err}"),
            DataError::Parameter(msg) => write!(f, "Invalid parameter: {msg}"),
            DataError::Database(err) => write!(f, "Database error: {err}"),
            DataError::Closed => write!(f, "Controller session is closed"),
            DataError::Repository(msg) => write!(f, "Repository error: {msg}"),
            DataError::Other(msg) => write!(f, "Data error: {msg}"),
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataError::Config(err) => Some(err),
            DataError::Database(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<ConfigError> for DataError {
    fn from(err: ConfigError) -> Self {
        DataError::Config(err)
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::Other(err.to_string())
    }
}

/// Convenience alias for data-layer results.
pub type DataResult<T> = Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_display_messages() {
        let err = DataError::from(ConfigError::UnknownEntity("user".into()));
        assert_eq!(
            err.to_string(),
            "Configuration error: Unknown entity \"user\""
        );
        assert_eq!(DataError::Closed.to_string(), "Controller session is closed");
        assert_eq!(
            DataError::parameter("missing id").to_string(),
            "Invalid parameter: missing id"
        );
    }

    #[test]
    fn test_database_source_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = DataError::database(io);
        assert!(err.source().is_some());
        assert!(err.to_string().contains("reset"));
    }
}
