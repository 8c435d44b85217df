use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use yolo_detector::config::DetectorConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "YOLO_DETECTOR_CONFIG",
        "YOLO_ASSETS_ROOT",
        "YOLO_PARAM_PATH",
        "YOLO_WEIGHTS_PATH",
        "YOLO_BACKEND",
        "YOLO_THRESHOLD",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(toml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(toml.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"
        [assets]
        root = "/opt/detector/assets"

        [model]
        param_path = "yolov8s/model.onnx"
        weights_path = "yolov8s/model.bin"
        input_size = 320
        backend = "stub"

        [detect]
        threshold = 0.4
        nms_threshold = 0.5
        max_detections = 50

        [labels]
        path = "yolov8s/labels.txt"

        [labels.aliases]
        mug = "cup"
        phone = "cell phone"
        "#,
    );

    std::env::set_var("YOLO_DETECTOR_CONFIG", file.path());
    std::env::set_var("YOLO_WEIGHTS_PATH", "yolov8s/fp16.bin");
    std::env::set_var("YOLO_THRESHOLD", "0.6");

    let cfg = DetectorConfig::load().expect("load config");

    assert_eq!(cfg.assets_root, PathBuf::from("/opt/detector/assets"));
    assert_eq!(cfg.model.param_path, "yolov8s/model.onnx");
    assert_eq!(cfg.model.weights_path, "yolov8s/fp16.bin");
    assert_eq!(cfg.model.input_size, 320);
    assert_eq!(cfg.model.backend, "stub");
    assert_eq!(cfg.detect.threshold, 0.6);
    assert_eq!(cfg.detect.nms_threshold, 0.5);
    assert_eq!(cfg.detect.max_detections, 50);
    assert_eq!(cfg.labels.path.as_deref(), Some("yolov8s/labels.txt"));
    assert_eq!(cfg.labels.aliases.get("phone").map(String::as_str), Some("cell phone"));

    let options = cfg.model_options();
    assert_eq!(options.input_size, 320);
    assert_eq!(options.max_detections, 50);
    assert_eq!(options.aliases.len(), 2);

    clear_env();
}

#[test]
fn defaults_apply_without_a_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = DetectorConfig::load().expect("load config");
    assert_eq!(cfg.assets_root, PathBuf::from("assets"));
    assert_eq!(cfg.model.param_path, "yolov8n/model.onnx");
    assert_eq!(cfg.model.weights_path, "yolov8n/model.bin");
    assert_eq!(cfg.model.backend, "tract");
    assert_eq!(cfg.detect.threshold, 0.25);
    assert!(cfg.labels.aliases.is_empty());

    clear_env();
}

#[test]
fn explicit_path_ignores_config_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let env_file = write_config("[model]\ninput_size = 416\n");
    let explicit = write_config("[model]\ninput_size = 512\n");
    std::env::set_var("YOLO_DETECTOR_CONFIG", env_file.path());

    let cfg = DetectorConfig::load_from(explicit.path()).expect("load config");
    assert_eq!(cfg.model.input_size, 512);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config("[detect]\nthreshold = 1.5\n");
    let err = DetectorConfig::load_from(file.path()).unwrap_err();
    assert!(err.to_string().contains("detect.threshold"));

    let file = write_config("[model]\ninput_size = 600\n");
    assert!(DetectorConfig::load_from(file.path()).is_err());

    let file = write_config("[model]\nbackend = \"ncnn\"\n");
    assert!(DetectorConfig::load_from(file.path()).is_err());

    let file = write_config("[model]\nparam_path = \"/etc/model.onnx\"\n");
    assert!(DetectorConfig::load_from(file.path()).is_err());

    let file = write_config("not = [valid");
    assert!(DetectorConfig::load_from(file.path()).is_err());

    std::env::set_var("YOLO_THRESHOLD", "high");
    assert!(DetectorConfig::load().is_err());

    clear_env();
}
