use std::sync::Mutex;

use tempfile::NamedTempFile;

use presence_counter::config::CountdConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "COUNTD_CONFIG",
        "COUNTD_BROKER_ADDR",
        "COUNTD_CLIENT_ID",
        "COUNTD_PROB_THRESHOLD",
        "COUNTD_TOLERANCE_FRAMES",
        "COUNTD_IN_FLIGHT",
        "COUNTD_CAMERA_DEVICE",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_apply_without_a_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = CountdConfig::load().expect("load config");

    assert_eq!(cfg.broker.addr, "127.0.0.1:3001");
    assert_eq!(cfg.broker.client_id, "countd");
    assert_eq!(cfg.tracker.prob_threshold, 0.5);
    assert_eq!(cfg.tracker.tolerance_frames, 10);
    assert_eq!(cfg.tracker.in_flight, 1);
    assert_eq!(cfg.source.camera_device, "/dev/video0");
    assert!(!cfg.render.stdout_stream);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "broker": {
            "addr": "broker.local:1883",
            "client_id": "countd-lobby",
            "username": "counter"
        },
        "tracker": {
            "prob_threshold": 0.6,
            "tolerance_frames": 15,
            "in_flight": 2
        },
        "source": {
            "camera_device": "/dev/video2",
            "target_fps": 30,
            "width": 768,
            "height": 432
        },
        "render": {
            "stdout_stream": true,
            "output_image": "annotated.jpg"
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("COUNTD_CONFIG", file.path());
    std::env::set_var("COUNTD_TOLERANCE_FRAMES", "20");
    std::env::set_var("COUNTD_CAMERA_DEVICE", "/dev/video7");

    let cfg = CountdConfig::load().expect("load config");

    assert_eq!(cfg.broker.addr, "broker.local:1883");
    assert_eq!(cfg.broker.client_id, "countd-lobby");
    assert_eq!(cfg.broker.username.as_deref(), Some("counter"));
    assert_eq!(cfg.tracker.prob_threshold, 0.6);
    // Environment wins over the file.
    assert_eq!(cfg.tracker.tolerance_frames, 20);
    assert_eq!(cfg.source.camera_device, "/dev/video7");
    assert_eq!(cfg.source.width, 768);
    assert!(cfg.render.stdout_stream);
    assert_eq!(cfg.render.output_image.to_str(), Some("annotated.jpg"));

    clear_env();
}

#[test]
fn rejects_out_of_range_threshold() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("COUNTD_PROB_THRESHOLD", "1.5");
    let err = CountdConfig::load().unwrap_err();
    assert!(err.to_string().contains("prob_threshold"));

    clear_env();
}

#[test]
fn rejects_zero_in_flight_slots() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("COUNTD_IN_FLIGHT", "0");
    let err = CountdConfig::load().unwrap_err();
    assert!(err.to_string().contains("in_flight"));

    clear_env();
}
