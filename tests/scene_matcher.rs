use std::fs;
use std::io::Write;

use image::{Rgb, RgbImage};
use tempfile::{tempdir, NamedTempFile};

use yolo_detector::config::DetectorConfig;
use yolo_detector::detect::{RawOutput, StubLoader};
use yolo_detector::{Error, ImageView, MemoryAssets, SceneMatcher, SceneOptions};

const SCENES: &str = r#"{
    "TEXT": [0.9, 0.1, 0.0, 0.0],
    "SCENERY": [0.0, 1.0, 0.2, 0.0],
    "PERSON": [0.0, 0.0, 1.0, 0.1],
    "FOOD": [0.1, 0.0, 0.0, 1.0]
}"#;

fn encoder(embedding: [f32; 4]) -> StubLoader {
    StubLoader::new(RawOutput {
        rows: 1,
        cols: 4,
        data: embedding.to_vec(),
    })
}

fn assets() -> MemoryAssets {
    MemoryAssets::new()
        .with("mobileclip_s0/vision_model_uint8.onnx", b"graph".to_vec())
        .unwrap()
        .with("mobileclip_s0/vision.bin", b"weights".to_vec())
        .unwrap()
        .with("mobileclip_s0/action_embeddings.json", SCENES)
        .unwrap()
}

fn options() -> SceneOptions {
    SceneOptions {
        input_size: 64,
        weights_path: Some("mobileclip_s0/vision.bin".into()),
        ..SceneOptions::default()
    }
}

#[test]
fn food_embedding_matches_food_scene() {
    let mut matcher = SceneMatcher::load(
        &assets(),
        "mobileclip_s0/vision_model_uint8.onnx",
        "mobileclip_s0/action_embeddings.json",
        &encoder([0.05, 0.0, 0.1, 2.0]),
        &options(),
    )
    .expect("load scene matcher");

    let photo = RgbImage::from_pixel(320, 240, Rgb([180, 90, 30]));
    let best = matcher.analyze(&ImageView::from(&photo)).unwrap();
    assert_eq!(best.scene, "FOOD");
    assert!(best.score > 0.9);

    let ranked = matcher.rank(&ImageView::from(&photo)).unwrap();
    assert_eq!(ranked.len(), 4);
    assert_eq!(ranked[0], best);
}

#[test]
fn bad_images_are_rejected() {
    let mut matcher = SceneMatcher::load(
        &assets(),
        "mobileclip_s0/vision_model_uint8.onnx",
        "mobileclip_s0/action_embeddings.json",
        &encoder([1.0, 0.0, 0.0, 0.0]),
        &options(),
    )
    .unwrap();
    let pixels = vec![0u8; 7];
    let view = ImageView::new(&pixels, 4, 4, yolo_detector::PixelFormat::Rgb888);
    assert!(matches!(matcher.analyze(&view), Err(Error::InvalidImage(_))));
}

#[test]
fn config_builds_a_matcher_from_a_directory() {
    let dir = tempdir().expect("temp dir");
    fs::create_dir_all(dir.path().join("clip")).unwrap();
    fs::write(dir.path().join("clip/encoder.onnx"), b"graph").unwrap();
    fs::write(dir.path().join("clip/encoder.bin"), b"weights").unwrap();
    fs::write(
        dir.path().join("clip/scenes.json"),
        r#"{"INDOOR": [1.0], "OUTDOOR": [-1.0]}"#,
    )
    .unwrap();

    let mut file = NamedTempFile::new().expect("temp config");
    let toml = format!(
        r#"
        [assets]
        root = "{}"

        [model]
        backend = "stub"

        [scene]
        model_path = "clip/encoder.onnx"
        weights_path = "clip/encoder.bin"
        embeddings_path = "clip/scenes.json"
        input_size = 32
        "#,
        dir.path().display().to_string().replace('\\', "/")
    );
    file.write_all(toml.as_bytes()).unwrap();

    let cfg = DetectorConfig::load_from(file.path()).expect("load config");
    let mut matcher = cfg.scene_matcher(&cfg.assets()).expect("scene matcher");
    assert_eq!(matcher.embeddings().len(), 2);

    // The stub encoder emits a zero embedding, which ties every scene at 0.
    let photo = RgbImage::from_pixel(16, 16, Rgb([0, 0, 0]));
    let best = matcher.analyze(&ImageView::from(&photo)).unwrap();
    assert_eq!(best.scene, "INDOOR");
    assert_eq!(best.score, 0.0);

    let missing = DetectorConfig {
        scene: yolo_detector::config::SceneSettings {
            embeddings_path: "clip/none.json".into(),
            ..cfg.scene.clone()
        },
        ..cfg.clone()
    };
    assert!(missing.scene_matcher(&missing.assets()).is_err());
}
