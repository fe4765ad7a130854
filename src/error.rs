use std::collections::BTreeMap;

use thiserror::Error;

/// Main error type for Portal Links
#[derive(Error, Debug)]
pub enum PortalError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Primary or counterpart entity missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Permission gate rejection
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Primary entity field validation failed; keyed by field name
    #[error("Validation failed for {entity}: {}", format_field_errors(.errors))]
    ValidationFailed {
        entity: String,
        errors: BTreeMap<String, String>,
    },

    /// Type tag not present in the entity registry
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    /// Stored data violates a registry invariant
    #[error("Data integrity error: {0}")]
    Integrity(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

fn format_field_errors(errors: &BTreeMap<String, String>) -> String {
    errors
        .iter()
        .map(|(field, message)| format!("{}: {}", field, message))
        .collect::<Vec<_>>()
        .join(", ")
}

impl PortalError {
    /// Build a single-field validation error.
    pub fn validation(entity: impl Into<String>, field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(field.into(), message.into());
        PortalError::ValidationFailed {
            entity: entity.into(),
            errors,
        }
    }

    /// HTTP status code the route boundary should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            PortalError::NotFound(_) => 404,
            PortalError::Forbidden(_) => 403,
            PortalError::ValidationFailed { .. } => 422,
            PortalError::UnknownEntityType(_) | PortalError::InvalidInput(_) => 400,
            PortalError::Database(_)
            | PortalError::Io(_)
            | PortalError::Json(_)
            | PortalError::Config(_)
            | PortalError::Integrity(_) => 500,
        }
    }
}

/// Convenient Result type using PortalError
pub type Result<T> = std::result::Result<T, PortalError>;
