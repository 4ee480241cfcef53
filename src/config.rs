//! Layered daemon configuration.
//!
//! Defaults, then an optional JSON config file (path from `COUNTD_CONFIG`),
//! then environment overrides; CLI flags apply last in the binary.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::track::DEFAULT_TOLERANCE_FRAMES;

const DEFAULT_BROKER_ADDR: &str = "127.0.0.1:3001";
const DEFAULT_CLIENT_ID: &str = "countd";
const DEFAULT_PROB_THRESHOLD: f32 = 0.5;
const DEFAULT_IN_FLIGHT: usize = 1;
const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";
const DEFAULT_TARGET_FPS: u32 = 24;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_OUTPUT_IMAGE: &str = "output_image.jpg";

#[derive(Debug, Deserialize, Default)]
struct CountdConfigFile {
    broker: Option<BrokerConfigFile>,
    tracker: Option<TrackerConfigFile>,
    source: Option<SourceConfigFile>,
    render: Option<RenderConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct BrokerConfigFile {
    addr: Option<String>,
    client_id: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackerConfigFile {
    prob_threshold: Option<f32>,
    tolerance_frames: Option<u32>,
    in_flight: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    camera_device: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct RenderConfigFile {
    stdout_stream: Option<bool>,
    output_image: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CountdConfig {
    pub broker: BrokerSettings,
    pub tracker: TrackerSettings,
    pub source: SourceSettings,
    pub render: RenderSettings,
}

#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub addr: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    /// Confidence a detection must strictly exceed to be counted.
    pub prob_threshold: f32,
    /// Consecutive non-increasing frames before an exit is confirmed.
    pub tolerance_frames: u32,
    /// Concurrently in-flight inference requests.
    pub in_flight: usize,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub camera_device: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            camera_device: DEFAULT_CAMERA_DEVICE.to_string(),
            target_fps: DEFAULT_TARGET_FPS,
            width: DEFAULT_SOURCE_WIDTH,
            height: DEFAULT_SOURCE_HEIGHT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// Stream annotated raw RGB24 frames to stdout for an encoder pipe.
    pub stdout_stream: bool,
    /// Destination for the annotated frame in single-image mode.
    pub output_image: PathBuf,
}

impl CountdConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("COUNTD_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CountdConfigFile) -> Self {
        let broker = BrokerSettings {
            addr: file
                .broker
                .as_ref()
                .and_then(|broker| broker.addr.clone())
                .unwrap_or_else(|| DEFAULT_BROKER_ADDR.to_string()),
            client_id: file
                .broker
                .as_ref()
                .and_then(|broker| broker.client_id.clone())
                .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
            username: file.broker.as_ref().and_then(|broker| broker.username.clone()),
            password: file.broker.as_ref().and_then(|broker| broker.password.clone()),
        };
        let tracker = TrackerSettings {
            prob_threshold: file
                .tracker
                .as_ref()
                .and_then(|tracker| tracker.prob_threshold)
                .unwrap_or(DEFAULT_PROB_THRESHOLD),
            tolerance_frames: file
                .tracker
                .as_ref()
                .and_then(|tracker| tracker.tolerance_frames)
                .unwrap_or(DEFAULT_TOLERANCE_FRAMES),
            in_flight: file
                .tracker
                .as_ref()
                .and_then(|tracker| tracker.in_flight)
                .unwrap_or(DEFAULT_IN_FLIGHT),
        };
        let source = SourceSettings {
            camera_device: file
                .source
                .as_ref()
                .and_then(|source| source.camera_device.clone())
                .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
            target_fps: file
                .source
                .as_ref()
                .and_then(|source| source.target_fps)
                .unwrap_or(DEFAULT_TARGET_FPS),
            width: file
                .source
                .as_ref()
                .and_then(|source| source.width)
                .unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: file
                .source
                .as_ref()
                .and_then(|source| source.height)
                .unwrap_or(DEFAULT_SOURCE_HEIGHT),
        };
        let render = RenderSettings {
            stdout_stream: file
                .render
                .as_ref()
                .and_then(|render| render.stdout_stream)
                .unwrap_or(false),
            output_image: file
                .render
                .and_then(|render| render.output_image)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_IMAGE)),
        };
        Self {
            broker,
            tracker,
            source,
            render,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("COUNTD_BROKER_ADDR") {
            if !addr.trim().is_empty() {
                self.broker.addr = addr;
            }
        }
        if let Ok(client_id) = std::env::var("COUNTD_CLIENT_ID") {
            if !client_id.trim().is_empty() {
                self.broker.client_id = client_id;
            }
        }
        if let Ok(threshold) = std::env::var("COUNTD_PROB_THRESHOLD") {
            self.tracker.prob_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("COUNTD_PROB_THRESHOLD must be a number"))?;
        }
        if let Ok(frames) = std::env::var("COUNTD_TOLERANCE_FRAMES") {
            self.tracker.tolerance_frames = frames
                .parse()
                .map_err(|_| anyhow!("COUNTD_TOLERANCE_FRAMES must be an integer"))?;
        }
        if let Ok(slots) = std::env::var("COUNTD_IN_FLIGHT") {
            self.tracker.in_flight = slots
                .parse()
                .map_err(|_| anyhow!("COUNTD_IN_FLIGHT must be an integer"))?;
        }
        if let Ok(device) = std::env::var("COUNTD_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.source.camera_device = device;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.tracker.prob_threshold) {
            return Err(anyhow!("prob_threshold must be within [0, 1]"));
        }
        if self.tracker.in_flight == 0 {
            return Err(anyhow!("in_flight must be at least 1"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source dimensions must be non-zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<CountdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
