//! Errors raised while loading or validating host configuration.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// No file at the given path.
    #[error("No configuration at {0}")]
    NotFound(String),

    /// A value failed validation.
    #[error("{field}: {message}")]
    InvalidValue { field: String, message: String },

    /// A `${VAR}` reference names an unset variable.
    #[error("Configuration references ${{{0}}}, which is not set")]
    EnvVarNotSet(String),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed configuration: {0}")]
    TomlParse(#[from] toml::de::Error),
}
