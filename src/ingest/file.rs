//! Video-file frame source.

use anyhow::Result;
use std::time::Instant;

use crate::config::SourceSettings;
use crate::frame::Frame;
use crate::ingest::SourceStats;

#[cfg(feature = "ingest-file-ffmpeg")]
use crate::ingest::file_ffmpeg::FfmpegFileSource;

/// Video-file frame source.
///
/// `stub://` paths produce an endless synthetic stream of staged scenes;
/// real files decode through FFmpeg behind the ingest-file-ffmpeg feature.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(path: &str, settings: &SourceSettings) -> Result<Self> {
        if path.starts_with("stub://") {
            Ok(Self {
                backend: FileBackend::Synthetic(SyntheticFileSource::new(path, settings)),
            })
        } else {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                Ok(Self {
                    backend: FileBackend::Ffmpeg(FfmpegFileSource::new(path, settings)?),
                })
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                let _ = settings;
                Err(anyhow::anyhow!(
                    "video file {} requires the ingest-file-ffmpeg feature",
                    path
                ))
            }
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.connect(),
        }
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            FileBackend::Synthetic(_) => true,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.is_healthy(),
        }
    }

    pub fn stats(&self) -> SourceStats {
        match &self.backend {
            FileBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for demos and tests
// ----------------------------------------------------------------------------

/// Frames per synthetic visit phase. Alternates empty scene / person scene,
/// long enough for an entry and a debounced exit per cycle.
const PHASE_FRAMES: u64 = 60;
const BACKGROUND_VALUE: u8 = 20;
const PERSON_VALUE: u8 = 230;

struct SyntheticFileSource {
    path: String,
    width: u32,
    height: u32,
    frame_count: u64,
    /// End of stream after this many frames; `stub://scene?frames=N`.
    frame_limit: Option<u64>,
}

impl SyntheticFileSource {
    fn new(path: &str, settings: &SourceSettings) -> Self {
        let frame_limit = path
            .split_once("?frames=")
            .and_then(|(_, limit)| limit.parse().ok());
        Self {
            path: path.to_string(),
            width: settings.width,
            height: settings.height,
            frame_count: 0,
            frame_limit,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("FileSource: connected to {} (synthetic)", self.path);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self
            .frame_limit
            .is_some_and(|limit| self.frame_count >= limit)
        {
            return Ok(None);
        }
        let person_present = (self.frame_count / PHASE_FRAMES) % 2 == 1;
        let pixels = self.generate_scene(person_present);
        self.frame_count += 1;
        Ok(Some(Frame::new(
            pixels,
            self.width,
            self.height,
            Instant::now(),
        )))
    }

    /// Flat dark background, with a bright block standing in for a person
    /// during visit phases. Bright enough for the stub detector's intensity
    /// test.
    fn generate_scene(&self, person_present: bool) -> Vec<u8> {
        let mut pixels =
            vec![BACKGROUND_VALUE; Frame::expected_len(self.width, self.height)];
        if person_present {
            let x_range = (self.width / 3)..(self.width * 2 / 3);
            let y_range = (self.height / 5)..(self.height * 9 / 10);
            for y in y_range {
                for x in x_range.clone() {
                    let offset = ((y * self.width + x) * 3) as usize;
                    pixels[offset..offset + 3].fill(PERSON_VALUE);
                }
            }
        }
        pixels
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            descriptor: self.path.clone(),
        }
    }
}
