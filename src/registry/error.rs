//! Error types for registry operations

use std::fmt;

/// Result type alias for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur during registry operations
#[derive(Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// No service with the given id
    ServiceNotFound(u64),

    /// No config property with the given id
    PropertyNotFound(u64),

    /// Malformed input (empty key, bad payload)
    Validation(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::ServiceNotFound(id) => write!(f, "no service with id {}", id),
            RegistryError::PropertyNotFound(id) => {
                write!(f, "no config property with id {}", id)
            }
            RegistryError::Validation(msg) => write!(f, "invalid input: {}", msg),
        }
    }
}

impl std::error::Error for RegistryError {}
