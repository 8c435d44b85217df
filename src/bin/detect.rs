//! yolo-detect - run the detector over image files and print JSON results

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

use yolo_detector::config::DetectorConfig;
use yolo_detector::detect::{DetectionResult, ImageView};
use yolo_detector::scene::SceneMatch;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TOML config file.
    #[arg(long, env = "YOLO_DETECTOR_CONFIG")]
    config: Option<PathBuf>,
    /// Asset directory holding the model files.
    #[arg(long)]
    assets: Option<PathBuf>,
    /// Parameter file, relative to the asset directory.
    #[arg(long)]
    param: Option<String>,
    /// Weights file, relative to the asset directory.
    #[arg(long)]
    weights: Option<String>,
    /// Minimum confidence for reported detections.
    #[arg(long)]
    threshold: Option<f32>,
    /// Only report this class (label or alias).
    #[arg(long)]
    class: Option<String>,
    /// Also classify each image's scene with the configured encoder.
    #[arg(long)]
    scene: bool,
    /// Images to run detection on.
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

#[derive(Serialize)]
struct ImageReport<'a> {
    image: &'a str,
    detections: &'a [DetectionResult],
    #[serde(skip_serializing_if = "Option::is_none")]
    scene: Option<SceneMatch>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = match args.config.as_deref() {
        Some(path) => DetectorConfig::load_from(path)?,
        None => DetectorConfig::load()?,
    };
    if let Some(root) = args.assets {
        cfg.assets_root = root;
    }
    if let Some(param) = args.param {
        cfg.model.param_path = param;
    }
    if let Some(weights) = args.weights {
        cfg.model.weights_path = weights;
    }
    if let Some(threshold) = args.threshold {
        cfg.detect.threshold = threshold;
    }
    cfg.validate()?;

    let assets = cfg.assets();
    let binding = cfg.binding()?;
    let status = binding.load_model(&assets, &cfg.model.param_path, &cfg.model.weights_path);
    if status != 0 {
        return Err(anyhow!(
            "failed to load model {} + {} from {} (status {})",
            cfg.model.param_path,
            cfg.model.weights_path,
            assets.root().display(),
            status
        ));
    }

    let mut scenes = if args.scene {
        Some(cfg.scene_matcher(&assets)?)
    } else {
        None
    };

    let mut failures = 0usize;
    for path in &args.images {
        let decoded = match image::open(path).with_context(|| format!("decode {}", path.display())) {
            Ok(decoded) => decoded.to_rgba8(),
            Err(e) => {
                log::warn!("{:#}", e);
                failures += 1;
                continue;
            }
        };
        let view = ImageView::from(&decoded);
        let detections = match args.class.as_deref() {
            Some(query) => binding.detect_class(&view, cfg.detect.threshold, query),
            None => binding.detect(&view, cfg.detect.threshold),
        };
        let scene = scenes.as_mut().and_then(|matcher| match matcher.analyze(&view) {
            Ok(scene) => Some(scene),
            Err(e) => {
                log::warn!("scene analysis of {} failed: {}", path.display(), e);
                None
            }
        });
        let name = path.display().to_string();
        let report = ImageReport {
            image: &name,
            detections: &detections,
            scene,
        };
        println!("{}", serde_json::to_string(&report)?);
    }

    if failures > 0 {
        log::warn!("{} of {} images could not be decoded", failures, args.images.len());
    }
    Ok(())
}
