//! countd - people counter daemon
//!
//! This daemon:
//! 1. Opens the configured input (video file, single image, or camera)
//! 2. Runs person detection on every frame
//! 3. Feeds filtered detection counts to the presence tracker
//! 4. Publishes occupancy, totals and dwell durations over MQTT
//! 5. Optionally streams annotated raw frames to stdout for an encoder pipe

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use presence_counter::{
    detect, CountdConfig, FrameSource, MqttPublisher, StreamDriver,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Count people in a video stream and publish occupancy over MQTT")]
struct Args {
    /// Path to the detection model, or stub:// for the built-in stub.
    #[arg(short, long, env = "COUNTD_MODEL")]
    model: String,

    /// Path to an image or video file. To use a camera write VIDEOCAMERA.
    #[arg(short, long, env = "COUNTD_INPUT")]
    input: String,

    /// Path to a custom-layer extension library (accepted for interface
    /// parity; backends without an extension mechanism ignore it).
    #[arg(short = 'l', long, env = "COUNTD_CUSTOM_OPS")]
    custom_ops: Option<PathBuf>,

    /// Target device to infer on.
    #[arg(short, long, env = "COUNTD_DEVICE", default_value = "CPU")]
    device: String,

    /// Probability threshold for detection filtering.
    #[arg(short = 't', long, env = "COUNTD_PROB_THRESHOLD")]
    prob_threshold: Option<f32>,

    /// MQTT broker address.
    #[arg(long, env = "COUNTD_BROKER_ADDR")]
    broker_addr: Option<String>,

    /// MQTT username for authentication.
    #[arg(long, env = "COUNTD_MQTT_USERNAME")]
    mqtt_username: Option<String>,

    /// MQTT password for authentication.
    #[arg(long, env = "COUNTD_MQTT_PASSWORD")]
    mqtt_password: Option<String>,

    /// Consecutive non-increasing frames before an exit is confirmed.
    #[arg(long, env = "COUNTD_TOLERANCE_FRAMES")]
    tolerance_frames: Option<u32>,

    /// Concurrently in-flight inference requests.
    #[arg(long, env = "COUNTD_IN_FLIGHT")]
    in_flight: Option<usize>,

    /// Stream annotated raw RGB24 frames to stdout for an encoder pipe.
    #[arg(long, env = "COUNTD_RENDER_STDOUT")]
    render_stdout: bool,

    /// Destination for the annotated frame in single-image mode.
    #[arg(long, env = "COUNTD_OUTPUT_IMAGE")]
    output_image: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = CountdConfig::load()?;
    apply_cli_overrides(&mut cfg, &args);

    if let Some(path) = &args.custom_ops {
        log::warn!(
            "custom-layer extension {} ignored: the selected backend loads no extensions",
            path.display()
        );
    }

    let source = FrameSource::open(&args.input, &cfg.source)?;
    let backend = detect::load_backend(&args.model, &args.device, cfg.tracker.in_flight)?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            log::info!("stop requested, draining in-flight frames");
            stop.store(true, Ordering::Relaxed);
        })
        .context("install interrupt handler")?;
    }

    let mut publisher = MqttPublisher::connect(
        &cfg.broker.addr,
        &cfg.broker.client_id,
        cfg.broker.username.as_deref(),
        cfg.broker.password.as_deref(),
    )?;

    log::info!(
        "countd running: input={} model={} device={} threshold={} tolerance={} slots={}",
        args.input,
        args.model,
        args.device,
        cfg.tracker.prob_threshold,
        cfg.tracker.tolerance_frames,
        cfg.tracker.in_flight,
    );

    let mut driver = StreamDriver::new(source, backend, cfg.tracker.clone(), cfg.render.clone());
    let run_result = driver.run(&mut publisher, &stop);

    // Release the transport before reporting the run outcome so a clean
    // disconnect happens on both paths.
    let disconnect_result = publisher.disconnect();
    let stats = run_result?;
    disconnect_result?;

    log::info!(
        "stream finished: frames={} events={} total={}",
        stats.frames,
        stats.events_published,
        stats.total_count,
    );
    Ok(())
}

fn apply_cli_overrides(cfg: &mut CountdConfig, args: &Args) {
    if let Some(threshold) = args.prob_threshold {
        cfg.tracker.prob_threshold = threshold;
    }
    if let Some(frames) = args.tolerance_frames {
        cfg.tracker.tolerance_frames = frames;
    }
    if let Some(slots) = args.in_flight {
        cfg.tracker.in_flight = slots;
    }
    if let Some(addr) = &args.broker_addr {
        cfg.broker.addr = addr.clone();
    }
    if let Some(username) = &args.mqtt_username {
        cfg.broker.username = Some(username.clone());
    }
    if let Some(password) = &args.mqtt_password {
        cfg.broker.password = Some(password.clone());
    }
    if args.render_stdout {
        cfg.render.stdout_stream = true;
    }
    if let Some(path) = &args.output_image {
        cfg.render.output_image = path.clone();
    }
}
