use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::assets::{sanitize_asset_path, AssetSource, DirectoryAssets};
use crate::binding::DetectorBinding;
use crate::detect::{
    ModelLoader, ModelOptions, ModelRegistry, StubLoader, COCO_CLASSES, DEFAULT_INPUT_SIZE,
    DEFAULT_MAX_DETECTIONS, DEFAULT_NMS_THRESHOLD,
};
use crate::scene::{SceneMatcher, SceneOptions, DEFAULT_MIN_SCORE, DEFAULT_SCENE_INPUT_SIZE};

pub const CONFIG_ENV: &str = "YOLO_DETECTOR_CONFIG";

const DEFAULT_ASSETS_ROOT: &str = "assets";
const DEFAULT_PARAM_PATH: &str = "yolov8n/model.onnx";
const DEFAULT_WEIGHTS_PATH: &str = "yolov8n/model.bin";
const DEFAULT_BACKEND: &str = "tract";
const DEFAULT_THRESHOLD: f32 = 0.25;
const DEFAULT_SCENE_MODEL_PATH: &str = "mobileclip_s0/vision_model_uint8.onnx";
const DEFAULT_SCENE_EMBEDDINGS_PATH: &str = "mobileclip_s0/action_embeddings.json";

const KNOWN_BACKENDS: [&str; 2] = ["tract", "stub"];

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    assets: Option<AssetsConfigFile>,
    model: Option<ModelConfigFile>,
    detect: Option<DetectConfigFile>,
    labels: Option<LabelsConfigFile>,
    scene: Option<SceneConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AssetsConfigFile {
    root: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfigFile {
    param_path: Option<String>,
    weights_path: Option<String>,
    input_size: Option<u32>,
    backend: Option<String>,
    warm_up: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectConfigFile {
    threshold: Option<f32>,
    nms_threshold: Option<f32>,
    max_detections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct LabelsConfigFile {
    path: Option<String>,
    aliases: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SceneConfigFile {
    model_path: Option<String>,
    weights_path: Option<String>,
    embeddings_path: Option<String>,
    input_size: Option<u32>,
    min_score: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub assets_root: PathBuf,
    pub model: ModelSettings,
    pub detect: DetectSettings,
    pub labels: LabelSettings,
    pub scene: SceneSettings,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub param_path: String,
    pub weights_path: String,
    pub input_size: u32,
    pub backend: String,
    pub warm_up: bool,
}

#[derive(Debug, Clone)]
pub struct DetectSettings {
    pub threshold: f32,
    pub nms_threshold: f32,
    pub max_detections: usize,
}

#[derive(Debug, Clone)]
pub struct SceneSettings {
    pub model_path: String,
    pub weights_path: Option<String>,
    pub embeddings_path: String,
    pub input_size: u32,
    pub min_score: f32,
}

#[derive(Debug, Clone, Default)]
pub struct LabelSettings {
    pub path: Option<String>,
    /// alias -> label
    pub aliases: BTreeMap<String, String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::from_file(DetectorConfigFile::default())
    }
}

impl DetectorConfig {
    /// Defaults, then the file named by `YOLO_DETECTOR_CONFIG` if set, then
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV)
            .ok()
            .filter(|path| !path.trim().is_empty());
        Self::load_with(config_path.as_deref().map(Path::new))
    }

    /// Like `load`, reading `path` instead of consulting `YOLO_DETECTOR_CONFIG`.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_with(Some(path))
    }

    fn load_with(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => DetectorConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DetectorConfigFile) -> Self {
        let assets_root = file
            .assets
            .and_then(|assets| assets.root)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ASSETS_ROOT));
        let model = file.model.unwrap_or_default();
        let detect = file.detect.unwrap_or_default();
        let labels = file.labels.unwrap_or_default();
        let scene = file.scene.unwrap_or_default();
        Self {
            assets_root,
            model: ModelSettings {
                param_path: model
                    .param_path
                    .unwrap_or_else(|| DEFAULT_PARAM_PATH.to_string()),
                weights_path: model
                    .weights_path
                    .unwrap_or_else(|| DEFAULT_WEIGHTS_PATH.to_string()),
                input_size: model.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                backend: model
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                warm_up: model.warm_up.unwrap_or(false),
            },
            detect: DetectSettings {
                threshold: detect.threshold.unwrap_or(DEFAULT_THRESHOLD),
                nms_threshold: detect.nms_threshold.unwrap_or(DEFAULT_NMS_THRESHOLD),
                max_detections: detect.max_detections.unwrap_or(DEFAULT_MAX_DETECTIONS),
            },
            labels: LabelSettings {
                path: labels.path,
                aliases: labels.aliases.unwrap_or_default(),
            },
            scene: SceneSettings {
                model_path: scene
                    .model_path
                    .unwrap_or_else(|| DEFAULT_SCENE_MODEL_PATH.to_string()),
                weights_path: scene.weights_path,
                embeddings_path: scene
                    .embeddings_path
                    .unwrap_or_else(|| DEFAULT_SCENE_EMBEDDINGS_PATH.to_string()),
                input_size: scene.input_size.unwrap_or(DEFAULT_SCENE_INPUT_SIZE),
                min_score: scene.min_score.unwrap_or(DEFAULT_MIN_SCORE),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(root) = std::env::var("YOLO_ASSETS_ROOT") {
            if !root.trim().is_empty() {
                self.assets_root = PathBuf::from(root);
            }
        }
        if let Ok(path) = std::env::var("YOLO_PARAM_PATH") {
            if !path.trim().is_empty() {
                self.model.param_path = path;
            }
        }
        if let Ok(path) = std::env::var("YOLO_WEIGHTS_PATH") {
            if !path.trim().is_empty() {
                self.model.weights_path = path;
            }
        }
        if let Ok(backend) = std::env::var("YOLO_BACKEND") {
            if !backend.trim().is_empty() {
                self.model.backend = backend.trim().to_lowercase();
            }
        }
        if let Ok(threshold) = std::env::var("YOLO_THRESHOLD") {
            self.detect.threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("YOLO_THRESHOLD must be a number between 0 and 1"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("detect.threshold", self.detect.threshold),
            ("detect.nms_threshold", self.detect.nms_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
            }
        }
        if self.model.input_size == 0 || self.model.input_size % 32 != 0 {
            return Err(anyhow!(
                "model.input_size must be a positive multiple of 32, got {}",
                self.model.input_size
            ));
        }
        if self.detect.max_detections == 0 {
            return Err(anyhow!("detect.max_detections must be at least 1"));
        }
        if self.assets_root.as_os_str().is_empty() {
            return Err(anyhow!("assets.root must not be empty"));
        }
        sanitize_asset_path(&self.model.param_path).context("model.param_path")?;
        sanitize_asset_path(&self.model.weights_path).context("model.weights_path")?;
        if let Some(path) = &self.labels.path {
            sanitize_asset_path(path).context("labels.path")?;
        }
        sanitize_asset_path(&self.scene.model_path).context("scene.model_path")?;
        sanitize_asset_path(&self.scene.embeddings_path).context("scene.embeddings_path")?;
        if let Some(path) = &self.scene.weights_path {
            sanitize_asset_path(path).context("scene.weights_path")?;
        }
        if self.scene.input_size == 0 {
            return Err(anyhow!("scene.input_size must be positive"));
        }
        if !(-1.0..=1.0).contains(&self.scene.min_score) {
            return Err(anyhow!(
                "scene.min_score must be within [-1, 1], got {}",
                self.scene.min_score
            ));
        }
        if !KNOWN_BACKENDS.contains(&self.model.backend.as_str()) {
            return Err(anyhow!(
                "unknown model.backend '{}' (expected one of: {})",
                self.model.backend,
                KNOWN_BACKENDS.join(", ")
            ));
        }
        Ok(())
    }

    pub fn model_options(&self) -> ModelOptions {
        ModelOptions {
            input_size: self.model.input_size,
            nms_threshold: self.detect.nms_threshold,
            max_detections: self.detect.max_detections,
            labels_path: self.labels.path.clone(),
            aliases: self
                .labels
                .aliases
                .iter()
                .map(|(alias, label)| (alias.clone(), label.clone()))
                .collect(),
            warm_up: self.model.warm_up,
            ..ModelOptions::default()
        }
    }

    /// Loader for `model.backend`. The stub backend never reports detections.
    pub fn loader(&self) -> Result<Arc<dyn ModelLoader>> {
        match self.model.backend.as_str() {
            "stub" => Ok(Arc::new(StubLoader::empty(COCO_CLASSES.len()))),
            "tract" => tract_loader(),
            other => Err(anyhow!("unknown model.backend '{}'", other)),
        }
    }

    pub fn scene_options(&self) -> SceneOptions {
        SceneOptions {
            input_size: self.scene.input_size,
            weights_path: self.scene.weights_path.clone(),
            min_score: self.scene.min_score,
        }
    }

    pub fn scene_matcher(&self, assets: &dyn AssetSource) -> Result<SceneMatcher> {
        let loader = self.loader()?;
        SceneMatcher::load(
            assets,
            &self.scene.model_path,
            &self.scene.embeddings_path,
            loader.as_ref(),
            &self.scene_options(),
        )
        .with_context(|| format!("failed to load scene encoder {}", self.scene.model_path))
    }

    pub fn assets(&self) -> DirectoryAssets {
        DirectoryAssets::new(&self.assets_root)
    }

    pub fn binding(&self) -> Result<DetectorBinding> {
        Ok(DetectorBinding::new(self.loader()?, self.model_options()))
    }

    pub fn registry(&self) -> Result<ModelRegistry> {
        Ok(ModelRegistry::new(self.loader()?, self.model_options()))
    }
}

#[cfg(feature = "backend-tract")]
fn tract_loader() -> Result<Arc<dyn ModelLoader>> {
    Ok(Arc::new(crate::detect::TractLoader::new()))
}

#[cfg(not(feature = "backend-tract"))]
fn tract_loader() -> Result<Arc<dyn ModelLoader>> {
    Err(anyhow!(
        "model.backend 'tract' requires the backend-tract feature"
    ))
}

fn read_config_file(path: &Path) -> Result<DetectorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
