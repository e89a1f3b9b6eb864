//! HTTP service annotating images with object detections.
//!
//! A posted base64 image is split into overlapping slices, every slice runs through a YOLOv8 ONNX
//! model, the merged detections are drawn onto a copy of the image and the copy is returned as
//! base64 JPEG.
pub mod annotate;
pub mod codec;
pub mod config;
pub mod detections;
pub mod endpoints;
pub mod error;
pub mod meter;
pub mod nn;
pub mod pipeline;
pub mod registry;
pub mod slicer;
pub mod utils;
