use thiserror::Error;

pub type BndlResult<T> = Result<T, BndlError>;

/// Per-bundle failures are recoverable: the orchestrator records them and
/// retries the bundle on the next pass. Only catalog acquisition and
/// output-root creation failures abort a whole run.
#[derive(Debug, Error)]
pub enum BndlError {
    /// Container header failed structural validation.
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    /// Stored payload hash does not match the computed hash.
    #[error("integrity mismatch: stored {stored}, computed {computed}")]
    IntegrityMismatch { stored: String, computed: String },

    /// Network fetch failed or timed out.
    #[error("transport error: {0}")]
    Transport(String),

    /// Writing decrypted bytes to the output path failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    /// Unexpected decode failure, logged distinctly because it may point
    /// at a key-derivation bug rather than a transient fault.
    #[error("protocol corruption: {0}")]
    ProtocolCorruption(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
