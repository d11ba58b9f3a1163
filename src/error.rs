use thiserror::Error;

use crate::providers::Provider;

#[derive(Debug, Error)]
pub enum SearchError {
    /// Missing API key or unknown provider. Raised before any transport attempt.
    #[error("{0}")]
    Configuration(String),

    #[error(
        "Authentication error ({status}). Please check if your {} API key is valid.",
        .provider.vendor()
    )]
    Authentication { provider: Provider, status: u16 },

    #[error("Rate limit exceeded ({status}). Please wait before trying again.")]
    RateLimited { status: u16 },

    #[error("{} API error ({status}): {message}", .provider.vendor())]
    Http {
        provider: Provider,
        status: u16,
        message: String,
    },

    #[error("Request failed: {0}")]
    Network(String),

    #[error("The operation was aborted.")]
    Cancelled,

    #[error("The AI returned a response in an unexpected format.")]
    Format,

    #[error("Failed to fetch data from {provider} API. {source}")]
    Provider {
        provider: Provider,
        #[source]
        source: Box<SearchError>,
    },
}

impl SearchError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            SearchError::Cancelled => true,
            SearchError::Provider { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    pub fn is_configuration(&self) -> bool {
        match self {
            SearchError::Configuration(_) => true,
            SearchError::Provider { source, .. } => source.is_configuration(),
            _ => false,
        }
    }

    /// Innermost error, skipping the facade's provider context.
    pub fn root(&self) -> &SearchError {
        match self {
            SearchError::Provider { source, .. } => source.root(),
            other => other,
        }
    }
}
