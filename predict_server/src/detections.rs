//! Detection results and their post-processing.
//!
//! Bounding boxes are in pixel coordinates of the image they were detected in. Boxes detected on
//! an image slice are moved into the coordinates of the full image with [`Detections::translate`].

/// Positive additive constant to avoid divide-by-zero.
const EPS: f32 = 1.0e-7;

/// Axis-aligned bounding box defined by its top-left and bottom-right corners.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bbox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl Bbox {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Build a box from the center/size format used by YOLO heads.
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(
            cx - width / 2.0,
            cy - height / 2.0,
            cx + width / 2.0,
            cy + height / 2.0,
        )
    }

    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    /// Calculate the area enclosed by the bounding box.
    ///
    /// If the bounding box is ill-defined by having the bottom-right point above/to the left of
    /// the top-left point, the area is zero.
    pub fn area(&self) -> f32 {
        let (width, height) = (self.width(), self.height());
        if width < 0.0 || height < 0.0 {
            return 0.0;
        }

        width * height
    }

    /// Calculate the intersection-over-union metric with another bounding box.
    pub fn iou(&self, other: &Bbox) -> f32 {
        // If the boxes do not overlap, the corner points of the overlap box are ill defined and
        // its area is zero.
        let overlap = Bbox::new(
            f32::max(self.x_min, other.x_min),
            f32::max(self.y_min, other.y_min),
            f32::min(self.x_max, other.x_max),
            f32::min(self.y_max, other.y_max),
        );
        let overlap_area = overlap.area();

        overlap_area / (self.area() + other.area() - overlap_area + EPS)
    }

    /// Shift the box by an offset.
    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x_min + dx, self.y_min + dy, self.x_max + dx, self.y_max + dy)
    }

    /// Restrict the box to an image of the given size.
    pub fn clip(&self, width: f32, height: f32) -> Self {
        Self::new(
            self.x_min.clamp(0.0, width),
            self.y_min.clamp(0.0, height),
            self.x_max.clamp(0.0, width),
            self.y_max.clamp(0.0, height),
        )
    }
}

/// A single detected object.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub bbox: Bbox,
    pub class_id: usize,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: Bbox, class_id: usize, confidence: f32) -> Self {
        Self {
            bbox,
            class_id,
            confidence,
        }
    }
}

/// Ordered collection of detections for one image.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Detections {
    items: Vec<Detection>,
}

impl Detections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, detection: Detection) {
        self.items.push(detection);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.items.iter()
    }

    /// Move all boxes by an offset, e.g. from slice into image coordinates.
    pub fn translate(mut self, dx: f32, dy: f32) -> Self {
        for detection in self.items.iter_mut() {
            detection.bbox = detection.bbox.translate(dx, dy);
        }
        self
    }

    /// Run non-maximum-suppression over all detections.
    ///
    /// Boxes are visited in the order of sinking confidence. A candidate is kept only if its IoU
    /// with every already kept box stays at or below `max_iou`. Unless `class_agnostic` is set,
    /// only boxes of the same class suppress each other.
    pub fn with_nms(self, max_iou: f32, class_agnostic: bool) -> Self {
        let mut candidates = self.items;
        // Ascending order, the most confident candidate sits at the back.
        candidates.sort_by(|a, b| a.confidence.total_cmp(&b.confidence));

        let mut selected: Vec<Detection> = Vec::with_capacity(candidates.len());
        'candidates: while let Some(candidate) = candidates.pop() {
            for kept in selected.iter() {
                let same_group = class_agnostic || kept.class_id == candidate.class_id;
                if same_group && candidate.bbox.iou(&kept.bbox) > max_iou {
                    continue 'candidates;
                }
            }

            selected.push(candidate);
        }

        Self { items: selected }
    }
}

impl From<Vec<Detection>> for Detections {
    fn from(items: Vec<Detection>) -> Self {
        Self { items }
    }
}

impl FromIterator<Detection> for Detections {
    fn from_iter<T: IntoIterator<Item = Detection>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl Extend<Detection> for Detections {
    fn extend<T: IntoIterator<Item = Detection>>(&mut self, iter: T) {
        self.items.extend(iter);
    }
}

impl IntoIterator for Detections {
    type Item = Detection;
    type IntoIter = std::vec::IntoIter<Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Detections {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
