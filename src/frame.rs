//! Frame raster type shared across the pipeline.

use std::time::Instant;

/// One decoded frame in packed RGB24 layout.
///
/// A frame is owned by the stream driver for the duration of a single
/// pipeline iteration and is not retained across iterations. The capture
/// instant is monotonic and drives presence-interval durations, so sources
/// must stamp frames in capture order.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Packed RGB pixel data, `width * height * 3` bytes.
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic capture instant, stamped by the source.
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, captured_at: Instant) -> Self {
        Self {
            pixels,
            width,
            height,
            captured_at,
        }
    }

    /// Expected byte length of an RGB24 raster with these dimensions.
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_len_matches_rgb24_layout() {
        assert_eq!(Frame::expected_len(640, 480), 640 * 480 * 3);
        assert_eq!(Frame::expected_len(0, 480), 0);
    }
}
