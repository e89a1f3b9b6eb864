//! Drawing detections onto images.
//!
use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::detections::Detections;

/// Colors picked by class id, wrapping around for larger ids.
const DEFAULT_PALETTE: [[u8; 3]; 10] = [
    [0, 255, 0],
    [255, 64, 64],
    [64, 128, 255],
    [255, 200, 0],
    [200, 64, 255],
    [0, 220, 220],
    [255, 128, 0],
    [255, 0, 160],
    [128, 255, 128],
    [160, 160, 255],
];

/// Draws the bounding box of every detection as a hollow rectangle.
#[derive(Clone, Debug)]
pub struct BoxAnnotator {
    palette: Vec<Rgb<u8>>,
    thickness: u32,
}

impl Default for BoxAnnotator {
    fn default() -> Self {
        Self::new(2)
    }
}

impl BoxAnnotator {
    pub fn new(thickness: u32) -> Self {
        Self {
            palette: DEFAULT_PALETTE.iter().map(|c| Rgb(*c)).collect(),
            thickness: thickness.max(1),
        }
    }

    pub fn color_for(&self, class_id: usize) -> Rgb<u8> {
        self.palette[class_id % self.palette.len()]
    }

    /// Draw on a copy of `scene` and return it.
    pub fn annotate(&self, scene: &RgbImage, detections: &Detections) -> RgbImage {
        let mut frame = scene.clone();
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return frame;
        }

        for detection in detections {
            // Coordinates of top-left and bottom-right points, kept on the image
            let bbox = detection.bbox.clip((width - 1) as f32, (height - 1) as f32);
            let (x_tl, y_tl) = (bbox.x_min.round() as i32, bbox.y_min.round() as i32);
            let (x_br, y_br) = (bbox.x_max.round() as i32, bbox.y_max.round() as i32);
            if x_br <= x_tl || y_br <= y_tl {
                continue;
            }

            let color = self.color_for(detection.class_id);
            // Grow the border inwards, one pixel per ring
            for ring in 0..self.thickness as i32 {
                let rect_width = x_br - x_tl + 1 - 2 * ring;
                let rect_height = y_br - y_tl + 1 - 2 * ring;
                if rect_width <= 0 || rect_height <= 0 {
                    break;
                }
                let rect = Rect::at(x_tl + ring, y_tl + ring)
                    .of_size(rect_width as u32, rect_height as u32);
                draw_hollow_rect_mut(&mut frame, rect, color);
            }
        }

        frame
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::detections::{Bbox, Detection};

    fn single(bbox: Bbox, class_id: usize) -> Detections {
        Detections::from(vec![Detection::new(bbox, class_id, 0.9)])
    }

    #[test]
    fn test_draws_border_only() {
        let scene = RgbImage::new(50, 40);
        let annotator = BoxAnnotator::new(2);

        let frame = annotator.annotate(&scene, &single(Bbox::new(10.0, 10.0, 30.0, 25.0), 0));
        let green = Rgb([0, 255, 0]);

        assert_eq!(frame.dimensions(), (50, 40));
        // Outer and inner ring
        assert_eq!(*frame.get_pixel(10, 10), green);
        assert_eq!(*frame.get_pixel(30, 25), green);
        assert_eq!(*frame.get_pixel(11, 18), green);
        assert_eq!(*frame.get_pixel(29, 18), green);
        // Interior and outside stay untouched
        assert_eq!(*frame.get_pixel(20, 18), Rgb([0, 0, 0]));
        assert_eq!(*frame.get_pixel(5, 5), Rgb([0, 0, 0]));
        assert_eq!(*frame.get_pixel(12, 18), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_input_is_not_modified() {
        let scene = RgbImage::from_pixel(20, 20, Rgb([7, 7, 7]));
        let detections = single(Bbox::new(2.0, 2.0, 12.0, 12.0), 1);
        let frame = BoxAnnotator::default().annotate(&scene, &detections);

        assert!(scene.pixels().all(|p| *p == Rgb([7, 7, 7])));
        assert_eq!(*frame.get_pixel(2, 2), Rgb([255, 64, 64]));
    }

    #[test]
    fn test_boxes_outside_are_clipped_or_skipped() {
        let scene = RgbImage::new(20, 20);
        let annotator = BoxAnnotator::new(1);
        let detections = Detections::from(vec![
            Detection::new(Bbox::new(-10.0, -10.0, 50.0, 50.0), 0, 0.9),
            Detection::new(Bbox::new(30.0, 30.0, 40.0, 40.0), 0, 0.9),
            Detection::new(Bbox::new(5.0, 5.0, 5.0, 9.0), 0, 0.9),
        ]);

        let frame = annotator.annotate(&scene, &detections);

        assert_eq!(*frame.get_pixel(0, 0), Rgb([0, 255, 0]));
        assert_eq!(*frame.get_pixel(19, 19), Rgb([0, 255, 0]));
        assert_eq!(*frame.get_pixel(5, 7), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_palette_wraps() {
        let annotator = BoxAnnotator::default();
        assert_eq!(annotator.color_for(3), annotator.color_for(13));
    }
}
