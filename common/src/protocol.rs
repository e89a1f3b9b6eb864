//! Protocol definition for the predict endpoint.
//!
//! Requests and responses are JSON objects carrying images as base64 strings:
//! - request: `{"image": "<base64>"}`
//! - success: `{"success": true, "image": "<base64>"}`
//! - failure: `{"error": "<message>"}`
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Path of the predict endpoint.
pub const PREDICT_PATH: &str = "/api/predict";

/// Request carrying the image to annotate.
#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PredictRequest {
    pub image: String,
}

impl PredictRequest {
    pub fn new(image_bytes: &[u8]) -> Self {
        Self {
            image: encode_image_data(image_bytes),
        }
    }
}

/// Response of the predict endpoint.
#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredictResponse {
    Success { success: bool, image: String },
    Error { error: String },
}

impl PredictResponse {
    pub fn success(image: String) -> Self {
        Self::Success {
            success: true,
            image,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    /// Base64 image on success, the error message otherwise.
    pub fn into_result(self) -> Result<String, String> {
        match self {
            Self::Success {
                success: true,
                image,
            } => Ok(image),
            Self::Success { success: false, .. } => Err("request was not successful".into()),
            Self::Error { error } => Err(error),
        }
    }
}

/// Encode raw image bytes for transport.
pub fn encode_image_data(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a transported image.
///
/// ASCII whitespace is ignored and a `data:<mime>;base64,` prefix is stripped, so payloads
/// copied from browsers or wrapped at 76 columns decode as well.
pub fn decode_image_data(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let data = match data.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, payload)| payload).unwrap_or(rest),
        None => data,
    };
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    STANDARD.decode(compact)
}
