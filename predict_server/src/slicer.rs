//! Sliced inference over overlapping image windows.
//!
//! Small objects shrink to a few pixels when a large image is resized to the model input. The
//! slicer runs the model on overlapping windows instead, moves each window's detections into
//! image coordinates and merges duplicates along the overlaps with non-maximum-suppression.
use anyhow::{ensure, Result};
use image::RgbImage;
use itertools::iproduct;

use crate::detections::Detections;

/// Slicing parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlicerConfig {
    pub slice_width: u32,
    pub slice_height: u32,
    pub overlap_width_ratio: f32,
    pub overlap_height_ratio: f32,
    /// IoU above which merged detections suppress each other.
    pub iou_threshold: f32,
    pub class_agnostic: bool,
}

impl Default for SlicerConfig {
    fn default() -> Self {
        Self {
            slice_width: 320,
            slice_height: 320,
            overlap_width_ratio: 0.2,
            overlap_height_ratio: 0.2,
            iou_threshold: 0.5,
            class_agnostic: false,
        }
    }
}

/// Window of the full image handed to the model.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SliceWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

pub struct InferenceSlicer {
    config: SlicerConfig,
}

impl InferenceSlicer {
    pub fn new(config: SlicerConfig) -> Result<Self> {
        ensure!(
            config.slice_width > 0 && config.slice_height > 0,
            "slice size must be positive, got {}x{}",
            config.slice_width,
            config.slice_height
        );
        for ratio in [config.overlap_width_ratio, config.overlap_height_ratio] {
            ensure!(
                (0.0..1.0).contains(&ratio),
                "overlap ratio must be in [0, 1), got {}",
                ratio
            );
        }

        Ok(Self { config })
    }

    /// Windows covering an image of the given size, row by row.
    pub fn windows(&self, width: u32, height: u32) -> Vec<SliceWindow> {
        let (slice_w, slice_h) = (self.config.slice_width, self.config.slice_height);
        let stride_x = stride(slice_w, self.config.overlap_width_ratio);
        let stride_y = stride(slice_h, self.config.overlap_height_ratio);

        iproduct!(
            (0..height.max(1)).step_by(stride_y as usize),
            (0..width.max(1)).step_by(stride_x as usize)
        )
        .map(|(y, x)| SliceWindow {
            x,
            y,
            width: slice_w.min(width - x),
            height: slice_h.min(height - y),
        })
        .filter(|window| window.width > 0 && window.height > 0)
        .collect()
    }

    /// Run `callback` on every window and merge the results in image coordinates.
    pub fn run<F>(&self, image: &RgbImage, mut callback: F) -> Result<Detections>
    where
        F: FnMut(&RgbImage) -> Result<Detections>,
    {
        let (width, height) = image.dimensions();
        let windows = self.windows(width, height);
        log::debug!(
            "Slicing {}x{} image into {} windows",
            width,
            height,
            windows.len()
        );

        let mut merged = Detections::new();
        for window in windows {
            let slice =
                image::imageops::crop_imm(image, window.x, window.y, window.width, window.height)
                    .to_image();
            let detections = callback(&slice)?;
            merged.extend(detections.translate(window.x as f32, window.y as f32));
        }

        let candidates = merged.len();
        let merged = merged.with_nms(self.config.iou_threshold, self.config.class_agnostic);
        log::debug!("Merged {} candidates into {} detections", candidates, merged.len());

        Ok(merged)
    }
}

/// Step between window origins. Always at least one pixel.
fn stride(slice: u32, overlap_ratio: f32) -> u32 {
    let overlap = (slice as f32 * overlap_ratio).floor() as u32;
    slice.saturating_sub(overlap).max(1)
}
