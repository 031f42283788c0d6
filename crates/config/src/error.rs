//! Configuration errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more required environment variables are unset.
    #[error("missing required configuration: {}", .0.join(", "))]
    MissingCredentials(Vec<String>),

    /// The configuration sources could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}
