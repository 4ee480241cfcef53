//! Frame annotation and output sinks.
//!
//! Detection boxes are drawn onto the frame; annotated frames stream as raw
//! RGB24 to stdout for an external encoder pipe, or land in an output image
//! for single-image inputs.

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::io::Write;
use std::path::Path;

use crate::detect::BoundingBox;
use crate::frame::Frame;

/// Box outline color.
const BOX_COLOR: Rgb<u8> = Rgb([255, 55, 0]);

/// Draw hollow rectangles for each accepted detection, in place.
pub fn annotate(frame: &mut Frame, boxes: &[BoundingBox]) -> Result<()> {
    let pixels = std::mem::take(&mut frame.pixels);
    let mut image = RgbImage::from_raw(frame.width, frame.height, pixels)
        .ok_or_else(|| anyhow!("frame pixel buffer does not match its dimensions"))?;

    for bbox in boxes {
        if bbox.width() == 0 || bbox.height() == 0 {
            continue;
        }
        let rect =
            Rect::at(bbox.xmin as i32, bbox.ymin as i32).of_size(bbox.width(), bbox.height());
        draw_hollow_rect_mut(&mut image, rect, BOX_COLOR);
    }

    frame.pixels = image.into_raw();
    Ok(())
}

/// Write one annotated frame as raw RGB24 bytes to stdout, for piping into
/// an external encoder.
pub fn write_raw_frame(frame: &Frame) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(&frame.pixels)
        .context("write raw frame to stdout")?;
    stdout.flush().context("flush raw frame to stdout")?;
    Ok(())
}

/// Save one annotated frame to `path` (single-image mode).
pub fn write_output_image(frame: &Frame, path: &Path) -> Result<()> {
    image::save_buffer(
        path,
        &frame.pixels,
        frame.width,
        frame.height,
        image::ColorType::Rgb8,
    )
    .with_context(|| format!("failed to write output image {}", path.display()))
}
