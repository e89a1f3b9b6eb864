//! Neural network models producing detections.
//!
use std::path::Path;

use anyhow::{bail, Context, Result};
use image::RgbImage;
use ndarray::{s, ArrayView3};
use tract_onnx::prelude::*;

use crate::detections::{Bbox, Detection, Detections};

type NnModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A model turning an image into detections in pixel coordinates of that image.
pub trait InferModel: Send + Sync {
    fn infer(&self, image: &RgbImage) -> Result<Detections>;
}

/// Score and overlap limits applied to raw model output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    pub min_confidence: f32,
    pub max_iou: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            max_iou: 0.5,
        }
    }
}

/// YOLOv8 detection or segmentation model exported to ONNX.
///
/// Segmentation heads carry `num_masks` mask coefficients after the class scores. Only boxes are
/// used, so the coefficients and the prototype output are ignored.
pub struct YoloModel {
    model: NnModel,
    input_size: u32,
    num_classes: usize,
    num_masks: usize,
    thresholds: Thresholds,
}

impl YoloModel {
    pub fn load(
        path: impl AsRef<Path>,
        input_size: u32,
        num_classes: usize,
        num_masks: usize,
        thresholds: Thresholds,
    ) -> Result<Self> {
        let path = path.as_ref();
        let side = input_size as usize;
        let input_fact = InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side));
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .with_context(|| format!("failed to read ONNX model {}", path.display()))?
            .with_input_fact(0, input_fact)?
            .into_optimized()?
            .into_runnable()
            .context("failed to make model runnable")?;

        log::info!(
            "Loaded {} ({}x{} input, {} classes)",
            path.display(),
            input_size,
            input_size,
            num_classes
        );

        Ok(Self {
            model,
            input_size,
            num_classes,
            num_masks,
            thresholds,
        })
    }

    fn preproc(&self, input: &RgbImage) -> Tensor {
        let side = self.input_size;
        let resized: RgbImage =
            image::imageops::resize(input, side, side, image::imageops::FilterType::Triangle);

        tract_ndarray::Array4::from_shape_fn((1, 3, side as usize, side as usize), |(_, c, y, x)| {
            resized[(x as _, y as _)][c] as f32 / 255.0
        })
        .into()
    }
}

impl InferModel for YoloModel {
    fn infer(&self, image: &RgbImage) -> Result<Detections> {
        let input = self.preproc(image);
        let outputs = self.model.run(tvec!(input.into()))?;
        let raw = outputs.first().context("model produced no output")?;
        let view = raw
            .to_array_view::<f32>()?
            .into_dimensionality::<ndarray::Ix3>()
            .context("unexpected rank of detection output")?;

        let detections = parse_output(
            view,
            self.num_classes,
            self.num_masks,
            self.thresholds.min_confidence,
            self.input_size,
            image.dimensions(),
        )?;

        Ok(detections.with_nms(self.thresholds.max_iou, false))
    }
}

/// Decode the first output of a YOLOv8 head.
///
/// The expected layout is `[1, 4 + num_classes + num_masks, proposals]` where each column holds
/// `cx, cy, w, h` in input pixels followed by class scores and mask coefficients. A transposed
/// `[1, proposals, channels]` layout is accepted as well, the channel axis is the one matching the
/// channel count exactly. Boxes are scaled from the square model input to `frame` and clipped to
/// it.
pub fn parse_output(
    output: ArrayView3<f32>,
    num_classes: usize,
    num_masks: usize,
    min_confidence: f32,
    input_size: u32,
    frame: (u32, u32),
) -> Result<Detections> {
    let num_channels = 4 + num_classes + num_masks;
    let output = match output.dim() {
        (1, channels, _) if channels == num_channels => output,
        (1, _, channels) if channels == num_channels => output.permuted_axes([0, 2, 1]),
        dim => bail!(
            "cannot decode output of shape {:?}, expected {} channels ({} classes, {} masks)",
            dim,
            num_channels,
            num_classes,
            num_masks
        ),
    };

    let (width, height) = (frame.0 as f32, frame.1 as f32);
    let scale_x = width / input_size as f32;
    let scale_y = height / input_size as f32;

    let mut detections = Detections::new();
    for proposal in output.slice(s![0, .., ..]).columns() {
        let (class_id, confidence) = proposal
            .iter()
            .skip(4)
            .take(num_classes)
            .copied()
            .enumerate()
            .fold((0, f32::MIN), |best, (class_id, score)| match score {
                x if x > best.1 => (class_id, x),
                _ => best,
            });

        if confidence < min_confidence {
            continue;
        }

        let bbox = Bbox::from_center(
            proposal[0] * scale_x,
            proposal[1] * scale_y,
            proposal[2] * scale_x,
            proposal[3] * scale_y,
        )
        .clip(width, height);

        detections.push(Detection::new(bbox, class_id, confidence));
    }

    Ok(detections)
}
