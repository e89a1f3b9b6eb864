//! Errors reported to clients of the predict endpoint.
//!
use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("No image data provided")]
    MissingImage,
    #[error("Invalid image data")]
    InvalidImage,
    /// The request body could not be read, e.g. because it exceeds the size limit.
    #[error("{message}")]
    Body { status: StatusCode, message: String },
    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl PredictError {
    /// Status used when differentiated error codes are enabled.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingImage => StatusCode::BAD_REQUEST,
            Self::InvalidImage => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Body { status, .. } => *status,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
