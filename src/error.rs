//! Error types for the e-Factura sync service.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// EDI connector (ANAF transport) errors.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("No access token on EDI configuration {name}")]
    MissingToken { name: String },

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Request to {path} failed: {reason}")]
    RequestFailed { path: String, reason: String },

    #[error("Request to {path} timed out after {timeout:?}")]
    Timeout { path: String, timeout: Duration },
}
