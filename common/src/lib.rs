//! Common code shared between `predict_server` and `predict_client`.
pub mod protocol;

/// Error type.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
