use thiserror::Error;

#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid query: {0:?}")]
    Validation(Vec<String>),

    #[error("Provider error: {message}")]
    Provider { message: String },

    // Per-provider timeouts and guard rejections travel as
    // ProviderStatus/GuardRejection, not as errors; they never unwind
    // past the fan-out.
    #[error("All providers failed or were unavailable")]
    AllProvidersFailed,
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
