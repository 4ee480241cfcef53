/// One raw detector output row, in normalized image coordinates.
///
/// Layout follows the detection model's output semantics: a confidence score
/// and corner coordinates in `[0, 1]` relative to the input image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawDetection {
    pub confidence: f32,
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

/// Axis-aligned box in pixel coordinates of the source frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub xmin: u32,
    pub ymin: u32,
    pub xmax: u32,
    pub ymax: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.xmax.saturating_sub(self.xmin)
    }

    pub fn height(&self) -> u32 {
        self.ymax.saturating_sub(self.ymin)
    }
}
