//! Detection and annotation of one decoded image.
//!
use anyhow::{Context, Result};
use image::RgbImage;

use crate::{
    annotate::BoxAnnotator,
    codec::encode_image,
    detections::Detections,
    nn::InferModel,
    slicer::InferenceSlicer,
};

/// Output of a pipeline run.
pub struct Annotated {
    /// Base64 JPEG of the annotated image.
    pub image: String,
    pub detections: Detections,
}

pub struct Pipeline {
    slicer: InferenceSlicer,
    annotator: BoxAnnotator,
    jpeg_quality: u8,
}

impl Pipeline {
    pub fn new(slicer: InferenceSlicer, annotator: BoxAnnotator, jpeg_quality: u8) -> Self {
        Self {
            slicer,
            annotator,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Detect objects slice by slice and draw them on a copy of `image`.
    pub fn detect_and_annotate(
        &self,
        model: &dyn InferModel,
        image: &RgbImage,
    ) -> Result<(RgbImage, Detections)> {
        let detections = self
            .slicer
            .run(image, |slice| model.infer(slice))
            .context("inference failed")?;
        let frame = self.annotator.annotate(image, &detections);

        Ok((frame, detections))
    }

    /// Full run ending in the encoded response image.
    pub fn run(&self, model: &dyn InferModel, image: &RgbImage) -> Result<Annotated> {
        let (frame, detections) = self.detect_and_annotate(model, image)?;
        let image = encode_image(&frame, self.jpeg_quality)?;

        Ok(Annotated { image, detections })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        codec::decode_image,
        detections::{Bbox, Detection},
        slicer::SlicerConfig,
    };
    use anyhow::bail;
    use image::Rgb;

    /// Finds one object in every slice, centered in that slice.
    struct CenterModel;

    impl InferModel for CenterModel {
        fn infer(&self, image: &RgbImage) -> Result<Detections> {
            let (w, h) = (image.width() as f32, image.height() as f32);
            Ok(Detections::from(vec![Detection::new(
                Bbox::from_center(w / 2.0, h / 2.0, w / 4.0, h / 4.0),
                0,
                0.75,
            )]))
        }
    }

    struct BrokenModel;

    impl InferModel for BrokenModel {
        fn infer(&self, _image: &RgbImage) -> Result<Detections> {
            bail!("tensor shape mismatch")
        }
    }

    fn pipeline() -> Pipeline {
        let slicer = InferenceSlicer::new(SlicerConfig::default()).unwrap();
        Pipeline::new(slicer, BoxAnnotator::default(), 95)
    }

    #[test]
    fn test_run_annotates_and_keeps_size() -> Result<()> {
        let image = RgbImage::from_pixel(700, 250, Rgb([40, 40, 40]));
        let (frame, detections) = pipeline().detect_and_annotate(&CenterModel, &image)?;

        // 3 windows along x and 1 along y, objects do not overlap
        assert_eq!(detections.len(), 3);
        assert_eq!(frame.dimensions(), image.dimensions());
        assert_ne!(frame, image);

        let annotated = pipeline().run(&CenterModel, &image)?;
        assert_eq!(decode_image(&annotated.image)?.dimensions(), (700, 250));

        Ok(())
    }

    #[test]
    fn test_model_errors_carry_context() {
        let image = RgbImage::new(32, 32);
        let err = pipeline().run(&BrokenModel, &image).err();

        assert_eq!(
            err.map(|e| format!("{:#}", e)),
            Some("inference failed: tensor shape mismatch".to_owned())
        );
    }
}
