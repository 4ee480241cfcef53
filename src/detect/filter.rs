//! Confidence filtering of raw detector output.

use crate::detect::result::{BoundingBox, RawDetection};

/// Detections that survived the confidence filter for one frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Filtered {
    pub count: u32,
    pub boxes: Vec<BoundingBox>,
}

/// Keep detections whose confidence strictly exceeds `threshold`, scaling
/// their normalized boxes to pixel coordinates of a `frame_width` x
/// `frame_height` frame.
///
/// Rows with non-finite values or inverted extents are dropped outright so
/// the tracker downstream only ever observes a count of well-formed boxes.
/// Pure and deterministic.
pub fn filter_detections(
    raw: &[RawDetection],
    threshold: f32,
    frame_width: u32,
    frame_height: u32,
) -> Filtered {
    let mut boxes = Vec::new();
    for det in raw {
        if !(det.confidence > threshold) {
            continue;
        }
        if !is_well_formed(det) {
            continue;
        }
        boxes.push(to_pixel_box(det, frame_width, frame_height));
    }
    Filtered {
        count: boxes.len() as u32,
        boxes,
    }
}

fn is_well_formed(det: &RawDetection) -> bool {
    let coords = [det.xmin, det.ymin, det.xmax, det.ymax];
    coords.iter().all(|c| c.is_finite())
        && det.confidence.is_finite()
        && det.xmax > det.xmin
        && det.ymax > det.ymin
}

fn to_pixel_box(det: &RawDetection, frame_width: u32, frame_height: u32) -> BoundingBox {
    let scale = |v: f32, extent: u32| -> u32 {
        let max = extent.saturating_sub(1);
        ((v * extent as f32) as i64).clamp(0, i64::from(max)) as u32
    };
    BoundingBox {
        xmin: scale(det.xmin, frame_width),
        ymin: scale(det.ymin, frame_height),
        xmax: scale(det.xmax, frame_width),
        ymax: scale(det.ymax, frame_height),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(confidence: f32) -> RawDetection {
        RawDetection {
            confidence,
            xmin: 0.1,
            ymin: 0.2,
            xmax: 0.4,
            ymax: 0.9,
        }
    }

    #[test]
    fn accepts_detections_above_threshold() {
        let raw = [det(0.4), det(0.6), det(0.9)];
        let filtered = filter_detections(&raw, 0.5, 640, 480);
        assert_eq!(filtered.count, 2);
        assert_eq!(filtered.boxes.len(), 2);
    }

    #[test]
    fn threshold_comparison_is_strict() {
        let raw = [det(0.5)];
        let filtered = filter_detections(&raw, 0.5, 640, 480);
        assert_eq!(filtered.count, 0);
    }

    #[test]
    fn scales_normalized_boxes_to_pixels() {
        let raw = [RawDetection {
            confidence: 0.9,
            xmin: 0.25,
            ymin: 0.5,
            xmax: 0.75,
            ymax: 1.0,
        }];
        let filtered = filter_detections(&raw, 0.5, 640, 480);
        assert_eq!(
            filtered.boxes[0],
            BoundingBox {
                xmin: 160,
                ymin: 240,
                xmax: 480,
                ymax: 479,
            }
        );
    }

    #[test]
    fn clamps_out_of_range_boxes_to_frame_bounds() {
        let raw = [RawDetection {
            confidence: 0.9,
            xmin: -0.2,
            ymin: 0.0,
            xmax: 1.4,
            ymax: 0.5,
        }];
        let filtered = filter_detections(&raw, 0.5, 640, 480);
        assert_eq!(filtered.boxes[0].xmin, 0);
        assert_eq!(filtered.boxes[0].xmax, 639);
    }

    #[test]
    fn drops_malformed_rows() {
        let raw = [
            RawDetection {
                confidence: 0.9,
                xmin: 0.5,
                ymin: 0.5,
                xmax: 0.4, // inverted
                ymax: 0.9,
            },
            RawDetection {
                confidence: 0.9,
                xmin: f32::NAN,
                ymin: 0.1,
                xmax: 0.2,
                ymax: 0.3,
            },
            det(0.9),
        ];
        let filtered = filter_detections(&raw, 0.5, 640, 480);
        assert_eq!(filtered.count, 1);
    }
}
