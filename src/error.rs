use crate::codec::CodecError;
use crate::repository::DataType;
use thiserror::Error;

/// Failures that abort the extraction of one block.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The provider answered, but with nothing usable for this block.
    #[error("provider failure for block {block}: {reason}")]
    ProviderFailure { block: u64, reason: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("provider request failed: {0:#}")]
    Provider(#[from] anyhow::Error),
}

impl ExtractError {
    pub fn provider_failure(block: u64, reason: impl Into<String>) -> Self {
        ExtractError::ProviderFailure {
            block,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("Already fetching historic data for {0}")]
    AlreadyRunning(DataType),

    #[error("Invalid backfill request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
