//! Frame ingestion sources.
//!
//! One input argument selects the source, mirroring the CLI contract:
//! - `VIDEOCAMERA` selects the local camera (feature: ingest-v4l2)
//! - paths ending in `.jpg`/`.bmp` are processed as a single image
//! - anything else is a video file (feature: ingest-file-ffmpeg), with
//!   `stub://` paths producing synthetic staged scenes for demos and tests
//!
//! Sources stamp each frame with a monotonic capture instant and hand frames
//! to the stream driver in capture order; `next_frame` returns `Ok(None)`
//! when the stream is exhausted.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod image;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use std::path::Path;

use anyhow::{anyhow, Result};

use crate::config::SourceSettings;
use crate::frame::Frame;

pub use file::FileSource;
pub use self::image::ImageSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// Input sentinel selecting the local camera.
pub const CAMERA_SENTINEL: &str = "VIDEOCAMERA";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    Camera,
    Image,
    Video,
}

/// Classify the `--input` argument.
pub fn classify_input(input: &str) -> InputKind {
    if input == CAMERA_SENTINEL {
        InputKind::Camera
    } else if input.ends_with(".jpg") || input.ends_with(".bmp") {
        InputKind::Image
    } else {
        InputKind::Video
    }
}

/// Capture statistics, reported in the driver's periodic health line.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub descriptor: String,
}

/// A connected frame source of any supported kind.
pub enum FrameSource {
    File(FileSource),
    Image(ImageSource),
    #[cfg(feature = "ingest-v4l2")]
    Camera(V4l2Source),
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::File(_) => "File",
            Self::Image(_) => "Image",
            #[cfg(feature = "ingest-v4l2")]
            Self::Camera(_) => "Camera",
        };
        f.debug_tuple("FrameSource").field(&kind).finish()
    }
}

impl FrameSource {
    /// Open the source selected by `input`.
    ///
    /// A video or image path that does not name an existing file is a fatal
    /// startup error.
    pub fn open(input: &str, settings: &SourceSettings) -> Result<Self> {
        match classify_input(input) {
            InputKind::Camera => Self::open_camera(settings),
            InputKind::Image => {
                require_existing_file(input)?;
                Ok(Self::Image(ImageSource::new(input)))
            }
            InputKind::Video => {
                if !input.starts_with("stub://") {
                    require_existing_file(input)?;
                }
                Ok(Self::File(FileSource::new(input, settings)?))
            }
        }
    }

    #[cfg(feature = "ingest-v4l2")]
    fn open_camera(settings: &SourceSettings) -> Result<Self> {
        Ok(Self::Camera(V4l2Source::new(settings)?))
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    fn open_camera(_settings: &SourceSettings) -> Result<Self> {
        Err(anyhow!(
            "camera capture requires the ingest-v4l2 feature"
        ))
    }

    pub fn connect(&mut self) -> Result<()> {
        match self {
            Self::File(source) => source.connect(),
            Self::Image(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            Self::Camera(source) => source.connect(),
        }
    }

    /// Capture the next frame, or `Ok(None)` once the stream is exhausted.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self {
            Self::File(source) => source.next_frame(),
            Self::Image(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            Self::Camera(source) => source.next_frame(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        match self {
            Self::File(source) => source.is_healthy(),
            Self::Image(source) => source.is_healthy(),
            #[cfg(feature = "ingest-v4l2")]
            Self::Camera(source) => source.is_healthy(),
        }
    }

    pub fn stats(&self) -> SourceStats {
        match self {
            Self::File(source) => source.stats(),
            Self::Image(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            Self::Camera(source) => source.stats(),
        }
    }

    /// True for single-image inputs, which render to an output file instead
    /// of a stream.
    pub fn is_single_image(&self) -> bool {
        matches!(self, Self::Image(_))
    }
}

fn require_existing_file(path: &str) -> Result<()> {
    if Path::new(path).is_file() {
        Ok(())
    } else {
        Err(anyhow!("missing input source: {}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_camera_sentinel() {
        assert_eq!(classify_input("VIDEOCAMERA"), InputKind::Camera);
        // The sentinel is case-sensitive; anything else is a path.
        assert_eq!(classify_input("videocamera"), InputKind::Video);
    }

    #[test]
    fn classifies_image_extensions() {
        assert_eq!(classify_input("frame.jpg"), InputKind::Image);
        assert_eq!(classify_input("frame.bmp"), InputKind::Image);
        assert_eq!(classify_input("clip.mp4"), InputKind::Video);
    }

    #[test]
    fn missing_video_file_is_a_startup_error() {
        let settings = SourceSettings::default();
        let err = FrameSource::open("/does/not/exist.mp4", &settings).unwrap_err();
        assert!(err.to_string().contains("missing input source"));
    }

    #[test]
    fn stub_video_path_opens_without_a_file() -> Result<()> {
        let settings = SourceSettings::default();
        let source = FrameSource::open("stub://lobby", &settings)?;
        assert!(!source.is_single_image());
        Ok(())
    }
}
