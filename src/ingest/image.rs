//! Single-image source.
//!
//! Inputs ending in `.jpg` or `.bmp` are processed once: the image is
//! decoded into one frame, and the stream ends after it. The driver writes
//! the annotated result to the configured output image path.

use anyhow::{Context, Result};
use std::time::Instant;

use crate::frame::Frame;
use crate::ingest::SourceStats;

pub struct ImageSource {
    path: String,
    consumed: bool,
    decode_failed: bool,
}

impl ImageSource {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            consumed: false,
            decode_failed: false,
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        log::info!("ImageSource: processing {} once", self.path);
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.consumed {
            return Ok(None);
        }
        self.consumed = true;

        let image = image::open(&self.path)
            .map_err(|e| {
                self.decode_failed = true;
                e
            })
            .with_context(|| format!("failed to decode image {}", self.path))?
            .to_rgb8();
        let (width, height) = image.dimensions();
        Ok(Some(Frame::new(
            image.into_raw(),
            width,
            height,
            Instant::now(),
        )))
    }

    pub fn is_healthy(&self) -> bool {
        !self.decode_failed
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: u64::from(self.consumed && !self.decode_failed),
            descriptor: self.path.clone(),
        }
    }
}
