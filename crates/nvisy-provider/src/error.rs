//! Errors raised while constructing providers.
//!
//! Recognition failures use [`nvisy_core::provider::ProviderError`]; this type
//! only covers setup: bad configuration, invalid URLs, duplicate registrations.

use nvisy_core::provider::ProviderId;

/// Result type for provider construction.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Provider construction errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration errors.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration problem.
        message: String,
    },

    /// Invalid service URL.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Two providers share the same id.
    #[error("Provider '{0}' is already registered")]
    Duplicate(ProviderId),
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
