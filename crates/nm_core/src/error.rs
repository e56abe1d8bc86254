use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Provider {provider} fetch failed: {reason}")]
    ProviderFetch { provider: String, reason: String },

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Duplicate URL: {0}")]
    DuplicateUrl(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Email error: {0}")]
    Email(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("An ingestion cycle is already in progress")]
    CycleInProgress,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("External error: {0}")]
    External(#[from] anyhow::Error),
}

impl Error {
    pub fn provider(provider: impl Into<String>, reason: impl ToString) -> Self {
        Self::ProviderFetch {
            provider: provider.into(),
            reason: reason.to_string(),
        }
    }

    /// Only an unreachable store aborts an ingestion cycle.
    pub fn is_fatal_for_cycle(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateUrl(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
