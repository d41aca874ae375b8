use thiserror::Error;

/// Failures surfaced by the fetch gateway.
///
/// Duplicate-identity cache writes never appear here; the cache reports
/// them as already present.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("API key is required")]
    Configuration,

    #[error("Invalid API response format: {0}")]
    Format(String),

    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FetchError>;
