//! Command line configuration of the predict server.
//!
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::{
    annotate::BoxAnnotator,
    endpoints::AppState,
    nn::Thresholds,
    pipeline::Pipeline,
    registry::{ModelRegistry, ModelStore},
    slicer::{InferenceSlicer, SlicerConfig},
};

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about = "Annotate images with object detections over HTTP")]
pub struct Config {
    /// Address the HTTP server binds to
    #[clap(long, default_value = "0.0.0.0:6060")]
    pub server_address: String,

    /// Identifier of the served model
    #[clap(long, default_value = "yolov8s-seg-640")]
    pub model_id: String,

    /// Directory holding `<model-id>.onnx` files [default: user cache dir]
    #[clap(long)]
    pub models_dir: Option<PathBuf>,

    /// Base URL to download `<model-id>.onnx` from when it is not on disk
    #[clap(long)]
    pub model_base_url: Option<String>,

    /// Load the model at startup instead of on the first request
    #[clap(long)]
    pub preload: bool,

    /// Width of the windows the model runs on
    #[clap(long, default_value_t = 320)]
    pub slice_width: u32,

    /// Height of the windows the model runs on
    #[clap(long, default_value_t = 320)]
    pub slice_height: u32,

    /// Horizontal overlap of neighbouring windows as fraction of the window width
    #[clap(long, default_value_t = 0.2)]
    pub overlap_width_ratio: f32,

    /// Vertical overlap of neighbouring windows as fraction of the window height
    #[clap(long, default_value_t = 0.2)]
    pub overlap_height_ratio: f32,

    /// IoU threshold when merging detections of all windows
    #[clap(long, default_value_t = 0.5)]
    pub slice_iou: f32,

    /// Let detections of different classes suppress each other when merging
    #[clap(long)]
    pub class_agnostic: bool,

    /// Minimum confidence of a detection
    #[clap(long, default_value_t = 0.5)]
    pub confidence: f32,

    /// IoU threshold of the per-window non-maximum-suppression
    #[clap(long, default_value_t = 0.5)]
    pub iou: f32,

    /// Line thickness of drawn boxes in pixels
    #[clap(long, default_value_t = 2)]
    pub thickness: u32,

    /// Quality of the returned JPEG
    #[clap(long, default_value_t = 95, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub jpeg_quality: u8,

    /// Maximum accepted request body size in bytes
    #[clap(long, default_value_t = 32 * 1024 * 1024)]
    pub max_body_bytes: usize,

    /// Answer errors with 400/422/500 instead of 200
    #[clap(long)]
    pub error_status_codes: bool,

    /// Seconds between throughput log lines
    #[clap(long, default_value_t = 10)]
    pub meter_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_from(["predict_server"])
    }
}

impl Config {
    pub fn slicer_config(&self) -> SlicerConfig {
        SlicerConfig {
            slice_width: self.slice_width,
            slice_height: self.slice_height,
            overlap_width_ratio: self.overlap_width_ratio,
            overlap_height_ratio: self.overlap_height_ratio,
            iou_threshold: self.slice_iou,
            class_agnostic: self.class_agnostic,
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            min_confidence: self.confidence,
            max_iou: self.iou,
        }
    }

    pub fn model_store(&self) -> ModelStore {
        let dir = self
            .models_dir
            .clone()
            .unwrap_or_else(ModelStore::default_dir);
        ModelStore::new(dir, self.model_base_url.clone())
    }

    pub fn pipeline(&self) -> Result<Pipeline> {
        let slicer = InferenceSlicer::new(self.slicer_config())?;
        Ok(Pipeline::new(
            slicer,
            BoxAnnotator::new(self.thickness),
            self.jpeg_quality,
        ))
    }

    /// Shared state of the HTTP handlers, with a model loaded lazily from the model store.
    pub fn app_state(&self) -> Result<AppState> {
        let registry = ModelRegistry::new(&self.model_id, self.model_store(), self.thresholds());
        Ok(AppState::new(
            registry,
            self.pipeline()?,
            self.error_status_codes,
        ))
    }
}
