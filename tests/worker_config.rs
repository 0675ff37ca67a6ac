use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use detect_worker::config::{ConfigOverrides, WorkerConfig};
use detect_worker::{BackendKind, ProtocolVariant};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "DETECT_WORKER_CONFIG",
        "DETECT_WORKER_PROTOCOL",
        "DETECT_WORKER_BACKEND",
        "DETECT_WORKER_MODEL",
        "DETECT_WORKER_MAX_FRAME_BYTES",
        "DETECT_WORKER_STATS_INTERVAL_SECS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = WorkerConfig::load().expect("load config");
    assert_eq!(cfg.protocol, ProtocolVariant::Untagged);
    assert_eq!(cfg.detector.backend, BackendKind::Stub);
    assert_eq!(cfg.max_frame_bytes, 32 * 1024 * 1024);
    assert_eq!(cfg.stats_interval, Duration::from_secs(60));
    assert_eq!(cfg.detector.input_width, 640);
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "protocol": "tagged",
        "max_frame_bytes": 1048576,
        "stats_interval_secs": 5,
        "detector": {
            "backend": "stub",
            "model_path": "/models/yolo11n.onnx",
            "input_width": 320,
            "input_height": 320
        }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("DETECT_WORKER_CONFIG", file.path());
    std::env::set_var("DETECT_WORKER_MAX_FRAME_BYTES", "2048");
    std::env::set_var("DETECT_WORKER_STATS_INTERVAL_SECS", "0");

    let cfg = WorkerConfig::load().expect("load config");

    assert_eq!(cfg.protocol, ProtocolVariant::Tagged);
    assert_eq!(cfg.max_frame_bytes, 2048);
    assert!(cfg.stats_interval.is_zero());
    assert_eq!(
        cfg.detector.model_path,
        Some(PathBuf::from("/models/yolo11n.onnx"))
    );
    assert_eq!(cfg.detector.input_width, 320);
    assert_eq!(cfg.detector.input_height, 320);

    clear_env();
}

#[test]
fn loads_toml_file_and_cli_overrides_win() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
protocol = "untagged"

[detector]
backend = "tract"
model_path = "/models/yolo11n.onnx"
"#;
    file.write_all(toml.as_bytes()).expect("write config");

    std::env::set_var("DETECT_WORKER_PROTOCOL", "multi-source");

    let overrides = ConfigOverrides {
        backend: Some(BackendKind::Stub),
        input_size: Some(416),
        ..ConfigOverrides::default()
    };
    let cfg = WorkerConfig::load_with(Some(file.path()), &overrides).expect("load config");

    assert_eq!(cfg.protocol, ProtocolVariant::Tagged);
    assert_eq!(cfg.detector.backend, BackendKind::Stub);
    assert_eq!(cfg.detector.input_width, 416);
    assert_eq!(cfg.detector.input_height, 416);

    clear_env();
}

#[test]
fn rejects_invalid_settings() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("DETECT_WORKER_PROTOCOL", "auto");
    assert!(WorkerConfig::load().is_err());
    clear_env();

    std::env::set_var("DETECT_WORKER_MAX_FRAME_BYTES", "lots");
    assert!(WorkerConfig::load().is_err());
    clear_env();

    let zero = ConfigOverrides {
        max_frame_bytes: Some(0),
        ..ConfigOverrides::default()
    };
    assert!(WorkerConfig::load_with(None, &zero).is_err());

    let tract_without_model = ConfigOverrides {
        backend: Some(BackendKind::Tract),
        ..ConfigOverrides::default()
    };
    assert!(WorkerConfig::load_with(None, &tract_without_model).is_err());

    std::env::set_var("DETECT_WORKER_BACKEND", "cuda");
    assert!(WorkerConfig::load().is_err());
    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let missing = std::env::temp_dir().join("detect-worker-missing-config.json");
    let err = WorkerConfig::load_with(Some(&missing), &ConfigOverrides::default())
        .expect_err("missing file");
    assert!(err.to_string().contains("failed to read config file"));
}
