//! presence-counter
//!
//! Single-stream people counter for a fixed camera view. A pre-trained
//! person-detection model runs over the incoming stream; the per-frame
//! detection count feeds a debounced presence state machine; occupancy,
//! running totals and dwell durations publish to an MQTT broker for
//! downstream dashboards.
//!
//! # Module Structure
//!
//! - `ingest`: frame sources (video file, single image, V4L2 camera)
//! - `preprocess`: frame to NCHW input tensor conversion
//! - `detect`: detector backends and the confidence filter
//! - `track`: the presence-tracking state machine
//! - `publish`: MQTT event publishing
//! - `render`: box annotation and output sinks
//! - `pipeline`: the per-frame stream driver
//! - `config`: layered daemon configuration

pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod preprocess;
pub mod publish;
pub mod render;
pub mod track;

pub use config::{BrokerSettings, CountdConfig, RenderSettings, SourceSettings, TrackerSettings};
pub use detect::{
    filter_detections, load_backend, BoundingBox, DetectorBackend, Filtered, RawDetection,
    StubBackend,
};
pub use frame::Frame;
pub use ingest::{classify_input, FrameSource, InputKind, SourceStats, CAMERA_SENTINEL};
pub use pipeline::{PipelineStats, StreamDriver};
pub use preprocess::{preprocess, InputShape, InputTensor};
pub use publish::{publish_event, MqttPublisher, Publisher};
pub use track::{PresenceTracker, TrackEvent, DEFAULT_TOLERANCE_FRAMES};

#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
#[cfg(feature = "ingest-v4l2")]
pub use ingest::V4l2Source;
