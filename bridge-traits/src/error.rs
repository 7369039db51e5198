use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No credential configured for {provider}")]
    MissingCredential { provider: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("No audio stream found in {0}")]
    NoAudioStream(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Input of {size} bytes exceeds the {limit} byte limit")]
    InputTooLarge { size: u64, limit: u64 },

    #[error("Provider rejected the request: {0}")]
    ProviderRejected(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
