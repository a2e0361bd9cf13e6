use thiserror::Error;

/// Top-level error type for the parley system.
///
/// Lookup failures carry the names that failed to resolve so that callers can
/// report them without another round trip. Subsystem crates define their own
/// error types and implement `From<ParleyError>` so that `?` works across
/// crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParleyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown tenant: {0}")]
    UnknownTenant(String),

    #[error("Database '{database}' not found for tenant '{tenant}'")]
    DatabaseNotFound { tenant: String, database: String },

    #[error("No schema registered for database '{database}' of tenant '{tenant}'")]
    SchemaNotFound { tenant: String, database: String },

    #[error("User '{user}' not found for tenant '{tenant}'")]
    UserNotFound { tenant: String, user: String },

    #[error("Invalid credentials for tenant '{0}'")]
    InvalidCredentials(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ParleyError {
    /// Whether this error reports a missing tenant, database, schema, or user.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ParleyError::UnknownTenant(_)
                | ParleyError::DatabaseNotFound { .. }
                | ParleyError::SchemaNotFound { .. }
                | ParleyError::UserNotFound { .. }
        )
    }
}

impl From<toml::de::Error> for ParleyError {
    fn from(err: toml::de::Error) -> Self {
        ParleyError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ParleyError {
    fn from(err: toml::ser::Error) -> Self {
        ParleyError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ParleyError {
    fn from(err: serde_json::Error) -> Self {
        ParleyError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for parley operations.
pub type Result<T> = std::result::Result<T, ParleyError>;
