//! Error kinds a training run can stop on.
//!
//! Most plumbing returns `anyhow::Result`; the variants below are
//! raised by the leaf modules and travel inside `anyhow::Error`,
//! so a caller can `downcast_ref::<PipelineError>()` to tell them apart.

/// Typed failures of the data pipeline and training loop.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A record blob failed format or shape validation.
    #[error("corrupt data: {0}")]
    CorruptData(String),

    /// The vocabulary file is missing or malformed.
    #[error("cannot load vocabulary: {0}")]
    VocabLoad(String),

    /// A tensor bundle disagrees with the active graph's signature.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A set of frozen sub-networks no optimiser mask can express.
    #[error("unsupported freeze: {0}")]
    UnsupportedFreeze(String),

    /// Writing a checkpoint failed.
    #[error("checkpoint I/O: {0}")]
    CheckpointIo(String),

    /// The embedding provider could not embed a batch.
    #[error("embedding provider: {0}")]
    EmbeddingProvider(String),
}

/// Failure reported by an embedding provider.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// Worth retrying (busy service, dropped connection).
    #[error("transient: {0}")]
    Transient(String),

    /// Retrying will not help.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl From<EmbeddingError> for PipelineError {
    fn from(e: EmbeddingError) -> Self {
        PipelineError::EmbeddingProvider(e.to_string())
    }
}
