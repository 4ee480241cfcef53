//! Stream driver: sequences the per-frame pipeline.
//!
//! source -> preprocess -> detect -> filter -> track -> publish/render, once
//! per frame until the source is exhausted or a stop is requested. The
//! driver owns the only reference to the tracker and drains inference slots
//! strictly in submission order, so the tracker observes frames exactly as
//! captured even when more than one request is in flight.

use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::config::{RenderSettings, TrackerSettings};
use crate::detect::{filter_detections, DetectorBackend};
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::preprocess::{preprocess, InputShape};
use crate::publish::{publish_event, Publisher};
use crate::render;
use crate::track::PresenceTracker;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Totals reported after a run.
#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineStats {
    pub frames: u64,
    pub events_published: u64,
    pub total_count: u64,
}

struct InFlight {
    slot: usize,
    frame: Frame,
    submitted_at: Instant,
}

pub struct StreamDriver {
    source: FrameSource,
    backend: Box<dyn DetectorBackend>,
    tracker: PresenceTracker,
    settings: TrackerSettings,
    render: RenderSettings,
    free_slots: Vec<usize>,
    pending: VecDeque<InFlight>,
    stats: PipelineStats,
    latency_sum: Duration,
    latency_samples: u64,
}

impl StreamDriver {
    pub fn new(
        source: FrameSource,
        backend: Box<dyn DetectorBackend>,
        settings: TrackerSettings,
        render: RenderSettings,
    ) -> Self {
        let tracker = PresenceTracker::new(settings.tolerance_frames);
        // Highest slot first so slot 0 is handed out first.
        let free_slots = (0..settings.in_flight).rev().collect();
        Self {
            source,
            backend,
            tracker,
            settings,
            render,
            free_slots,
            pending: VecDeque::new(),
            stats: PipelineStats::default(),
            latency_sum: Duration::ZERO,
            latency_samples: 0,
        }
    }

    /// Run the pipeline until end of stream or until `stop` is set.
    ///
    /// Frames still in flight when the loop ends are drained and their
    /// events published before the driver returns, so cancellation never
    /// loses an emitted event.
    pub fn run(&mut self, publisher: &mut dyn Publisher, stop: &AtomicBool) -> Result<PipelineStats> {
        self.source.connect()?;
        let shape = self.backend.input_shape();
        let mut last_health_log = Instant::now();

        while !stop.load(Ordering::Relaxed) {
            let Some(frame) = self.source.next_frame()? else {
                break;
            };
            self.submit_frame(frame, &shape)?;

            // Keep at most `in_flight` requests outstanding; completions are
            // always consumed oldest-first.
            while self.pending.len() >= self.settings.in_flight {
                self.drain_oldest(publisher)?;
            }

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                self.log_health();
                last_health_log = Instant::now();
            }
        }

        while !self.pending.is_empty() {
            self.drain_oldest(publisher)?;
        }

        self.stats.total_count = self.tracker.total_count();
        Ok(self.stats)
    }

    fn submit_frame(&mut self, frame: Frame, shape: &InputShape) -> Result<()> {
        let tensor = preprocess(&frame, shape)?;
        let slot = self
            .free_slots
            .pop()
            .ok_or_else(|| anyhow!("no free inference slot"))?;
        let submitted_at = Instant::now();
        self.backend.submit(slot, tensor)?;
        self.pending.push_back(InFlight {
            slot,
            frame,
            submitted_at,
        });
        Ok(())
    }

    fn drain_oldest(&mut self, publisher: &mut dyn Publisher) -> Result<()> {
        let Some(in_flight) = self.pending.pop_front() else {
            return Ok(());
        };
        self.backend.wait(in_flight.slot)?;
        let raw = self.backend.take_output(in_flight.slot)?;
        self.free_slots.push(in_flight.slot);

        self.latency_sum += in_flight.submitted_at.elapsed();
        self.latency_samples += 1;
        self.stats.frames += 1;

        let mut frame = in_flight.frame;
        let filtered = filter_detections(
            &raw,
            self.settings.prob_threshold,
            frame.width,
            frame.height,
        );

        let events = self.tracker.update(filtered.count, frame.captured_at);
        for event in &events {
            publish_event(publisher, event)?;
            self.stats.events_published += 1;
        }

        let single_image = self.source.is_single_image();
        if self.render.stdout_stream || single_image {
            render::annotate(&mut frame, &filtered.boxes)?;
            if self.render.stdout_stream {
                render::write_raw_frame(&frame)?;
            }
            if single_image {
                render::write_output_image(&frame, &self.render.output_image)?;
                log::info!(
                    "annotated image written to {}",
                    self.render.output_image.display()
                );
            }
        }
        Ok(())
    }

    fn log_health(&self) {
        let stats = self.source.stats();
        let avg_latency_ms = if self.latency_samples == 0 {
            0.0
        } else {
            self.latency_sum.as_secs_f64() * 1_000.0 / self.latency_samples as f64
        };
        log::info!(
            "source health={} frames={} occupancy={} total={} avg_inference={:.1}ms input={}",
            self.source.is_healthy(),
            stats.frames_captured,
            self.tracker.occupancy(),
            self.tracker.total_count(),
            avg_latency_ms,
            stats.descriptor,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceSettings;
    use crate::detect::{RawDetection, StubBackend};
    use crate::preprocess::InputTensor;
    use std::path::PathBuf;

    /// Backend that ignores pixels and replays a scripted sequence of
    /// detection counts, keyed by submission order.
    struct ScriptedBackend {
        counts: Vec<u32>,
        next: usize,
        slots: Vec<Option<Vec<RawDetection>>>,
    }

    impl ScriptedBackend {
        fn new(counts: &[u32], in_flight: usize) -> Self {
            Self {
                counts: counts.to_vec(),
                next: 0,
                slots: vec![None; in_flight],
            }
        }
    }

    impl DetectorBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn input_shape(&self) -> InputShape {
            InputShape {
                channels: 3,
                height: 8,
                width: 8,
            }
        }

        fn submit(&mut self, slot: usize, _input: InputTensor) -> Result<()> {
            let count = self.counts.get(self.next).copied().unwrap_or(0);
            self.next += 1;
            let detection = RawDetection {
                confidence: 0.9,
                xmin: 0.2,
                ymin: 0.2,
                xmax: 0.8,
                ymax: 0.8,
            };
            self.slots[slot] = Some(vec![detection; count as usize]);
            Ok(())
        }

        fn wait(&mut self, _slot: usize) -> Result<()> {
            Ok(())
        }

        fn take_output(&mut self, slot: usize) -> Result<Vec<RawDetection>> {
            self.slots[slot]
                .take()
                .ok_or_else(|| anyhow!("slot {} empty", slot))
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        published: Vec<(String, String)>,
    }

    impl Publisher for RecordingPublisher {
        fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
            self.published
                .push((topic.to_string(), String::from_utf8_lossy(payload).into()));
            Ok(())
        }
    }

    fn test_driver(counts: &[u32], tolerance_frames: u32, in_flight: usize) -> StreamDriver {
        let source_settings = SourceSettings {
            width: 32,
            height: 24,
            ..SourceSettings::default()
        };
        let input = format!("stub://pipeline?frames={}", counts.len());
        let source = FrameSource::open(&input, &source_settings).expect("open stub source");
        let backend = Box::new(ScriptedBackend::new(counts, in_flight));
        let settings = TrackerSettings {
            prob_threshold: 0.5,
            tolerance_frames,
            in_flight,
        };
        let render = RenderSettings {
            stdout_stream: false,
            output_image: PathBuf::from("unused.jpg"),
        };
        StreamDriver::new(source, backend, settings, render)
    }

    #[test]
    fn publishes_tracker_events_in_emission_order() -> Result<()> {
        let mut driver = test_driver(&[0, 1, 1, 0, 0], 1, 1);
        let mut publisher = RecordingPublisher::default();
        let stop = AtomicBool::new(false);

        let stats = driver.run(&mut publisher, &stop)?;

        assert_eq!(stats.frames, 5);
        assert_eq!(stats.total_count, 1);
        let expected = vec![
            ("person".to_string(), r#"{"count":0}"#.to_string()),
            ("person".to_string(), r#"{"total":1}"#.to_string()),
            ("person".to_string(), r#"{"count":1}"#.to_string()),
            ("person".to_string(), r#"{"count":1}"#.to_string()),
            ("person".to_string(), r#"{"count":0}"#.to_string()),
            ("person/duration".to_string(), r#"{"duration":0}"#.to_string()),
            ("person".to_string(), r#"{"count":0}"#.to_string()),
        ];
        assert_eq!(publisher.published, expected);
        Ok(())
    }

    #[test]
    fn in_flight_pool_preserves_frame_order() -> Result<()> {
        let counts = [0, 1, 2, 3, 4, 4, 4];
        let mut driver = test_driver(&counts, 10, 2);
        let mut publisher = RecordingPublisher::default();
        let stop = AtomicBool::new(false);

        driver.run(&mut publisher, &stop)?;

        let observed: Vec<String> = publisher
            .published
            .iter()
            .filter(|(topic, payload)| topic == "person" && payload.contains("count"))
            .map(|(_, payload)| payload.clone())
            .collect();
        let expected: Vec<String> = counts
            .iter()
            .map(|count| format!(r#"{{"count":{}}}"#, count))
            .collect();
        assert_eq!(observed, expected);
        Ok(())
    }

    #[test]
    fn stop_flag_halts_the_stream_and_drains_in_flight_frames() -> Result<()> {
        // Endless source; the stop flag is the only way out.
        let source_settings = SourceSettings {
            width: 32,
            height: 24,
            ..SourceSettings::default()
        };
        let source = FrameSource::open("stub://endless", &source_settings)?;
        let backend = Box::new(ScriptedBackend::new(&[0, 0, 0], 1));
        let settings = TrackerSettings {
            prob_threshold: 0.5,
            tolerance_frames: 10,
            in_flight: 1,
        };
        let render = RenderSettings {
            stdout_stream: false,
            output_image: PathBuf::from("unused.jpg"),
        };
        let mut driver = StreamDriver::new(source, backend, settings, render);

        let mut publisher = RecordingPublisher::default();
        let stop = AtomicBool::new(true);
        let stats = driver.run(&mut publisher, &stop)?;

        assert_eq!(stats.frames, 0);
        assert!(publisher.published.is_empty());
        Ok(())
    }

    #[test]
    fn stub_backend_end_to_end_sees_no_one_in_empty_scenes() -> Result<()> {
        let source_settings = SourceSettings {
            width: 32,
            height: 24,
            ..SourceSettings::default()
        };
        let source = FrameSource::open("stub://empty?frames=3", &source_settings)?;
        let backend = Box::new(StubBackend::new(1));
        let settings = TrackerSettings {
            prob_threshold: 0.5,
            tolerance_frames: 10,
            in_flight: 1,
        };
        let render = RenderSettings {
            stdout_stream: false,
            output_image: PathBuf::from("unused.jpg"),
        };
        let mut driver = StreamDriver::new(source, backend, settings, render);

        let mut publisher = RecordingPublisher::default();
        let stop = AtomicBool::new(false);
        let stats = driver.run(&mut publisher, &stop)?;

        assert_eq!(stats.total_count, 0);
        assert!(publisher
            .published
            .iter()
            .all(|(topic, payload)| topic == "person" && payload == r#"{"count":0}"#));
        Ok(())
    }
}
