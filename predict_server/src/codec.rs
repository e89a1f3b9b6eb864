//! Conversions between transported payloads and pixel buffers.
//!
use std::io::Cursor;

use anyhow::{Context, Result};
use common::protocol::{decode_image_data, encode_image_data};
use image::{codecs::jpeg::JpegEncoder, ColorType, RgbImage};

use crate::error::PredictError;

/// Decode a base64 payload into an RGB image.
///
/// Any format `image` can detect from the bytes is accepted. Everything that does not end in a
/// valid image, including broken base64, is reported as [`PredictError::InvalidImage`].
pub fn decode_image(data: &str) -> Result<RgbImage, PredictError> {
    let bytes = decode_image_data(data).map_err(|e| {
        log::debug!("Rejecting payload, base64 error: {}", e);
        PredictError::InvalidImage
    })?;

    let image = image::load_from_memory(&bytes).map_err(|e| {
        log::debug!("Rejecting payload, image error: {}", e);
        PredictError::InvalidImage
    })?;

    Ok(image.to_rgb8())
}

/// Encode an RGB image as JPEG.
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let (width, height) = frame.dimensions();
    let mut buf = Cursor::new(Vec::new());

    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode(frame, width, height, ColorType::Rgb8)
        .context("failed to encode JPEG")?;

    Ok(buf.into_inner())
}

/// Encode an RGB image as base64 JPEG ready for the response.
pub fn encode_image(frame: &RgbImage, quality: u8) -> Result<String> {
    Ok(encode_image_data(&encode_jpeg(frame, quality)?))
}
