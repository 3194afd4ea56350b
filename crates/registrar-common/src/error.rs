//! Error types shared by the registrar crates.

use thiserror::Error;

/// Main error type for the registration engine.
///
/// Access denials are not errors: the creation-access chain and the rule
/// evaluator report them as ordinary decisions.
#[derive(Error, Debug)]
pub enum AppError {
    /// Required context is missing, e.g. an access decision for an event
    /// that cannot be loaded
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A condition or action plugin id could not be resolved
    #[error("Unknown plugin: {0}")]
    PluginResolution(String),

    /// An action failed while a rule was firing
    #[error("Trigger execution failed: {0}")]
    TriggerExecution(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage error
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Returns the error code string for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::PluginResolution(_) => "PLUGIN_RESOLUTION_FAILURE",
            AppError::TriggerExecution(_) => "TRIGGER_EXECUTION_FAILURE",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether retrying the same call later can succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::TriggerExecution(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            _ => AppError::Database(err.to_string()),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::Configuration("no event".into()).error_code(),
            "CONFIGURATION_ERROR"
        );
        assert_eq!(
            AppError::PluginResolution("missing".into()).error_code(),
            "PLUGIN_RESOLUTION_FAILURE"
        );
    }

    #[test]
    fn test_transient_errors() {
        assert!(AppError::Database("timeout".into()).is_transient());
        assert!(!AppError::Configuration("no event".into()).is_transient());
    }

    #[test]
    fn test_from_serde_json() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        let app: AppError = err.into();
        assert_eq!(app.error_code(), "SERIALIZATION_ERROR");
    }
}
