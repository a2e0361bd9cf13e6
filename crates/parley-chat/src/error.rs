//! Error types for the query pipeline.

use parley_core::error::ParleyError;

/// Errors surfaced by the pipeline to its callers.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("text generation unavailable: {0}")]
    Generation(String),
    #[error("text generation timed out after {0} seconds")]
    GenerationTimeout(u64),
    #[error("query execution failed: {0}")]
    ExecutionFailed(String),
    #[error("storage error: {0}")]
    StorageError(String),
}

impl ChatError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChatError::Generation(_) | ChatError::GenerationTimeout(_))
    }
}

impl From<ParleyError> for ChatError {
    fn from(err: ParleyError) -> Self {
        if err.is_not_found() {
            return ChatError::NotFound(err.to_string());
        }
        match err {
            ParleyError::Validation(msg) => ChatError::Validation(msg),
            ParleyError::InvalidCredentials(_) => ChatError::Validation(err.to_string()),
            other => ChatError::StorageError(other.to_string()),
        }
    }
}

/// Failure of a structured-query run.
///
/// This is the only error the execution stage answers with a correction attempt.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("query rejected: {0}")]
    Rejected(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("execution timed out after {0} seconds")]
    Timeout(u64),
    #[error("data source unavailable: {0}")]
    DataSource(String),
    #[error("query generation failed: {0}")]
    Generation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_display() {
        let err = ChatError::NotFound("schema".to_string());
        assert_eq!(err.to_string(), "not found: schema");

        let err = ChatError::Validation("question cannot be empty".to_string());
        assert_eq!(err.to_string(), "validation error: question cannot be empty");

        let err = ChatError::GenerationTimeout(30);
        assert_eq!(err.to_string(), "text generation timed out after 30 seconds");

        let err = ChatError::ExecutionFailed("no such table: orders".to_string());
        assert_eq!(err.to_string(), "query execution failed: no such table: orders");
    }

    #[test]
    fn test_transient_errors() {
        assert!(ChatError::Generation("down".into()).is_transient());
        assert!(ChatError::GenerationTimeout(1).is_transient());
        assert!(!ChatError::NotFound("x".into()).is_transient());
        assert!(!ChatError::ExecutionFailed("x".into()).is_transient());
    }

    #[test]
    fn test_from_parley_error_lookups_become_not_found() {
        let err: ChatError = ParleyError::SchemaNotFound {
            tenant: "acme".into(),
            database: "sales".into(),
        }
        .into();
        assert!(matches!(err, ChatError::NotFound(_)));
        assert!(err.to_string().contains("sales"));

        let err: ChatError = ParleyError::UnknownTenant("ghost".into()).into();
        assert!(matches!(err, ChatError::NotFound(_)));
    }

    #[test]
    fn test_from_parley_error_validation_and_storage() {
        let err: ChatError = ParleyError::Validation("empty".into()).into();
        assert!(matches!(err, ChatError::Validation(ref m) if m == "empty"));

        let err: ChatError = ParleyError::Storage("disk full".into()).into();
        assert!(matches!(err, ChatError::StorageError(_)));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_execution_error_display() {
        let err = ExecutionError::Query("no such column: totl".into());
        assert_eq!(err.to_string(), "query failed: no such column: totl");
        assert_eq!(
            ExecutionError::Timeout(60).to_string(),
            "execution timed out after 60 seconds"
        );
    }
}
