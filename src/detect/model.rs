use std::time::Instant;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::assets::{sanitize_asset_path, AssetSource};
use crate::error::{Error, Result};

use super::backend::{InferenceBackend, ModelLoader};
use super::labels::LabelSet;
use super::postprocess::{decode, DecodeParams};
use super::preprocess::{letterbox, DEFAULT_PAD_VALUE};
use super::result::DetectionResult;
use super::view::ImageView;

pub const DEFAULT_INPUT_SIZE: u32 = 640;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.45;
pub const DEFAULT_MAX_DETECTIONS: usize = 300;

/// Knobs applied when a model is loaded.
#[derive(Clone, Debug)]
pub struct ModelOptions {
    pub input_size: u32,
    pub nms_threshold: f32,
    pub max_detections: usize,
    pub pad_value: u8,
    /// Asset path of a label file, one label per line. COCO-80 when unset.
    pub labels_path: Option<String>,
    /// `(alias, label)` pairs used to resolve class queries.
    pub aliases: Vec<(String, String)>,
    pub warm_up: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            input_size: DEFAULT_INPUT_SIZE,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
            pad_value: DEFAULT_PAD_VALUE,
            labels_path: None,
            aliases: Vec::new(),
            warm_up: false,
        }
    }
}

/// Description of a loaded model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub param_path: String,
    pub weights_path: String,
    pub backend: String,
    pub input_size: u32,
    pub num_classes: usize,
    /// Hex SHA-256 over the parameter bytes followed by the weight bytes.
    pub fingerprint: String,
}

/// A model ready for detection.
pub struct Model {
    backend: Box<dyn InferenceBackend>,
    labels: LabelSet,
    options: ModelOptions,
    info: ModelInfo,
}

impl Model {
    /// Read both model files from `assets` and hand them to `loader`.
    pub fn load(
        assets: &dyn AssetSource,
        param_path: &str,
        weights_path: &str,
        loader: &dyn ModelLoader,
        options: &ModelOptions,
    ) -> Result<Self> {
        sanitize_asset_path(param_path)?;
        sanitize_asset_path(weights_path)?;

        let param = assets.read(param_path)?;
        let weights = assets.read(weights_path)?;
        let fingerprint = fingerprint(&param, &weights);

        let started = Instant::now();
        let mut backend = loader.load(&param, &weights, options.input_size)?;
        if options.warm_up {
            backend.warm_up()?;
        }

        let mut labels = match options.labels_path.as_deref() {
            Some(path) => {
                let raw = assets.read(path)?;
                let text = String::from_utf8(raw)
                    .map_err(|_| Error::ModelLoad(format!("label file {} is not UTF-8", path)))?;
                let labels = LabelSet::from_text(&text);
                if labels.is_empty() {
                    return Err(Error::ModelLoad(format!("label file {} is empty", path)));
                }
                labels
            }
            None => LabelSet::coco(),
        };
        for (alias, label) in &options.aliases {
            if !labels.add_alias(alias, label) {
                log::warn!("alias '{}' names unknown label '{}'", alias, label);
            }
        }

        let info = ModelInfo {
            param_path: param_path.to_string(),
            weights_path: weights_path.to_string(),
            backend: backend.name().to_string(),
            input_size: backend.input_size(),
            num_classes: labels.len(),
            fingerprint,
        };
        log::info!(
            "loaded model {} + {} via {} in {:.2?} (sha256 {})",
            info.param_path,
            info.weights_path,
            info.backend,
            started.elapsed(),
            &info.fingerprint[..12]
        );

        Ok(Self {
            backend,
            labels,
            options: options.clone(),
            info,
        })
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Run the model on `image`. Every result has `confidence >= threshold`;
    /// results are sorted by descending confidence.
    pub fn detect(&mut self, image: &ImageView<'_>, threshold: f32) -> Result<Vec<DetectionResult>> {
        validate_threshold(threshold)?;
        let rgb = image.to_rgb()?;
        let input = letterbox(&rgb, self.backend.input_size(), self.options.pad_value)?;

        let started = Instant::now();
        let output = self.backend.infer(&input)?;
        let params = DecodeParams {
            threshold,
            nms_threshold: self.options.nms_threshold,
            max_detections: self.options.max_detections,
            letterbox: input.letterbox,
            image_width: image.width,
            image_height: image.height,
            labels: &self.labels,
        };
        let results = decode(&output, &params)?;

        match results.first() {
            Some(first) => log::debug!(
                "found {} objects in {:.2?}; first: {} {:.2} at ({:.1}, {:.1}) {:.1}x{:.1}",
                results.len(),
                started.elapsed(),
                first.class_name,
                first.confidence,
                first.x,
                first.y,
                first.width,
                first.height
            ),
            None => log::debug!("no objects above {:.2} in {:.2?}", threshold, started.elapsed()),
        }
        Ok(results)
    }

    /// Like `detect`, keeping only the class named by `query` (label or
    /// alias). A blank query keeps everything; an unknown one keeps nothing.
    pub fn detect_class(
        &mut self,
        image: &ImageView<'_>,
        threshold: f32,
        query: &str,
    ) -> Result<Vec<DetectionResult>> {
        if query.trim().is_empty() {
            return self.detect(image, threshold);
        }
        let Some(class_id) = self.labels.resolve(query) else {
            validate_threshold(threshold)?;
            image.validate()?;
            log::warn!("no class matches query '{}'", query.trim());
            return Ok(Vec::new());
        };
        let mut results = self.detect(image, threshold)?;
        results.retain(|r| r.class_id == class_id);
        Ok(results)
    }
}

pub fn validate_threshold(threshold: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::InvalidThreshold(threshold));
    }
    Ok(())
}

fn fingerprint(param: &[u8], weights: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(param);
    hasher.update(weights);
    hex::encode(hasher.finalize())
}
