//! Error types for Daybreak.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Step error: {0}")]
    Step(#[from] StepError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
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

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Sequence/step errors surfaced by the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("Unknown step key: {0}")]
    UnknownStep(String),

    #[error("Unknown sequence: {0}")]
    UnknownSequence(String),

    #[error("Invalid response for metric {metric}: {message}")]
    InvalidResponse { metric: String, message: String },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
