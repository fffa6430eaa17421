use thiserror::Error;

use crate::store::StoreError;

/// Failure taxonomy for the fail-hard parts of the pipeline.
///
/// The vision adapter never produces these; it folds its own failures into
/// an `AnalysisOutcome::Failure` instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Required input missing; the caller can fix the request.
    #[error("{0}")]
    Validation(String),
    /// Provider unreachable, timed out, or answered non-2xx.
    #[error("upstream provider error: {0}")]
    Upstream(String),
    /// Provider bytes are not a decodable image.
    #[error("image decode error: {0}")]
    Decode(String),
    /// Object-store upload failed.
    #[error("image storage error: {0}")]
    Storage(String),
    /// Generation envelope carried no usable URL under any known key.
    #[error("No image URL returned")]
    NoUrl,
    /// Record write failed after a successful provider call; the result is discarded.
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl PipelineError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            _ => 500,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Upstream(_) => "upstream",
            Self::Decode(_) => "decode",
            Self::Storage(_) => "storage",
            Self::NoUrl => "no_url",
            Self::Persistence(_) => "persistence",
            Self::NotFound(_) => "not_found",
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Persistence(other.to_string()),
        }
    }
}

/// Transport failures from reqwest, including client-level timeouts.
pub(crate) fn upstream(provider: &str, err: reqwest::Error) -> PipelineError {
    if err.is_timeout() {
        return PipelineError::Upstream(format!("{provider} request timed out"));
    }
    PipelineError::Upstream(format!("{provider} request failed: {err}"))
}
