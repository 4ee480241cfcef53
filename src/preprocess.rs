//! Frame-to-tensor preprocessing.

use anyhow::{anyhow, Result};
use image::imageops::FilterType;
use image::RgbImage;

use crate::frame::Frame;

/// Geometry of the detector's input tensor (batch of one, CHW layout).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputShape {
    pub channels: u32,
    pub height: u32,
    pub width: u32,
}

impl InputShape {
    pub fn element_count(&self) -> usize {
        self.channels as usize * self.height as usize * self.width as usize
    }
}

/// One frame, resized and reordered into the layout the detector expects.
#[derive(Clone, Debug, PartialEq)]
pub struct InputTensor {
    /// NCHW f32 values in `[0, 1]`, batch dimension of one elided.
    pub data: Vec<f32>,
    pub shape: InputShape,
}

/// Resize a frame to the model's input dimensions (no aspect-ratio
/// preservation) and reorder packed HWC bytes into planar CHW floats scaled
/// to `[0, 1]`. Stateless.
pub fn preprocess(frame: &Frame, shape: &InputShape) -> Result<InputTensor> {
    if shape.channels != 3 {
        return Err(anyhow!(
            "detector expects {} channels, only RGB input is supported",
            shape.channels
        ));
    }
    let image = RgbImage::from_raw(frame.width, frame.height, frame.pixels.clone())
        .ok_or_else(|| anyhow!("frame pixel buffer does not match its dimensions"))?;
    let resized = image::imageops::resize(&image, shape.width, shape.height, FilterType::Triangle);

    let plane = (shape.width * shape.height) as usize;
    let mut data = vec![0f32; shape.element_count()];
    for (i, pixel) in resized.pixels().enumerate() {
        for channel in 0..3 {
            data[channel * plane + i] = f32::from(pixel.0[channel]) / 255.0;
        }
    }

    Ok(InputTensor {
        data,
        shape: *shape,
    })
}
