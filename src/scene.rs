//! Scene matching with an image-embedding model.
//!
//! A vision encoder (e.g. MobileCLIP) turns an image into an embedding. The
//! embedding is L2-normalized and compared by cosine similarity against a
//! table of named scene vectors shipped next to the model as JSON
//! (`{"FOOD": [..], "TEXT": [..]}`). The best scoring scene wins.

use std::collections::BTreeMap;
use std::time::Instant;

use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::Serialize;

use crate::assets::{sanitize_asset_path, AssetSource};
use crate::detect::preprocess::{InputTensor, Letterbox};
use crate::detect::{ImageView, InferenceBackend, ModelLoader, RawOutput};
use crate::error::{Error, Result};

/// Scene name reported when no scene clears `min_score`.
pub const UNKNOWN_SCENE: &str = "UNKNOWN";

pub const DEFAULT_SCENE_INPUT_SIZE: u32 = 256;
pub const DEFAULT_MIN_SCORE: f32 = -1.0;

const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Norms below this are treated as zero and left unscaled.
const MIN_NORM: f32 = 1e-6;

#[derive(Clone, Debug)]
pub struct SceneOptions {
    /// Square side the encoder expects.
    pub input_size: u32,
    /// External weights for the encoder graph, if it has any.
    pub weights_path: Option<String>,
    /// A scene must score strictly above this to be reported.
    pub min_score: f32,
}

impl Default for SceneOptions {
    fn default() -> Self {
        Self {
            input_size: DEFAULT_SCENE_INPUT_SIZE,
            weights_path: None,
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SceneMatch {
    pub scene: String,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

impl SceneMatch {
    pub fn is_unknown(&self) -> bool {
        self.scene == UNKNOWN_SCENE
    }
}

/// Named, unit-length scene vectors of one shared dimension.
#[derive(Clone, Debug)]
pub struct SceneEmbeddings {
    scenes: Vec<(String, Vec<f32>)>,
    dimension: usize,
}

impl SceneEmbeddings {
    /// Parse a JSON object of scene name to vector. Vectors are normalized
    /// on load; scenes are kept in name order.
    pub fn from_json(raw: &[u8]) -> Result<Self> {
        let table: BTreeMap<String, Vec<f32>> = serde_json::from_slice(raw)
            .map_err(|e| Error::ModelLoad(format!("invalid scene embeddings: {e}")))?;

        let mut dimension = None;
        let mut scenes = Vec::with_capacity(table.len());
        for (name, mut vector) in table {
            if vector.is_empty() {
                return Err(Error::ModelLoad(format!("scene '{}' has an empty vector", name)));
            }
            match dimension {
                None => dimension = Some(vector.len()),
                Some(dim) if dim != vector.len() => {
                    return Err(Error::ModelLoad(format!(
                        "scene '{}' has {} values, expected {}",
                        name,
                        vector.len(),
                        dim
                    )))
                }
                Some(_) => {}
            }
            l2_normalize(&mut vector);
            scenes.push((name, vector));
        }

        let dimension =
            dimension.ok_or_else(|| Error::ModelLoad("scene embeddings are empty".into()))?;
        Ok(Self { scenes, dimension })
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scenes.iter().map(|(name, _)| name.as_str())
    }

    /// Score every scene against a normalized embedding, best first. Ties
    /// keep name order.
    pub fn rank(&self, embedding: &[f32]) -> Vec<SceneMatch> {
        let mut ranked: Vec<SceneMatch> = self
            .scenes
            .iter()
            .map(|(name, vector)| SceneMatch {
                scene: name.clone(),
                score: dot(embedding, vector),
            })
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked
    }
}

/// A loaded encoder plus its scene table.
pub struct SceneMatcher {
    backend: Box<dyn InferenceBackend>,
    embeddings: SceneEmbeddings,
    options: SceneOptions,
}

impl SceneMatcher {
    pub fn load(
        assets: &dyn AssetSource,
        model_path: &str,
        embeddings_path: &str,
        loader: &dyn ModelLoader,
        options: &SceneOptions,
    ) -> Result<Self> {
        sanitize_asset_path(model_path)?;
        sanitize_asset_path(embeddings_path)?;

        let started = Instant::now();
        let model = assets.read(model_path)?;
        let weights = match options.weights_path.as_deref() {
            Some(path) => assets.read(path)?,
            None => Vec::new(),
        };
        let embeddings = SceneEmbeddings::from_json(&assets.read(embeddings_path)?)?;
        let backend = loader.load(&model, &weights, options.input_size)?;

        log::info!(
            "loaded scene encoder {} via {} with {} scenes of dimension {} in {:.2?}",
            model_path,
            backend.name(),
            embeddings.len(),
            embeddings.dimension(),
            started.elapsed()
        );
        Ok(Self {
            backend,
            embeddings,
            options: options.clone(),
        })
    }

    pub fn embeddings(&self) -> &SceneEmbeddings {
        &self.embeddings
    }

    /// Normalized image embedding.
    pub fn embed(&mut self, image: &ImageView<'_>) -> Result<Vec<f32>> {
        let rgb = image.to_rgb()?;
        let input = encoder_input(&rgb, self.backend.input_size())?;
        let output = self.backend.infer(&input)?;
        let mut embedding = first_row(&output)?;
        if embedding.len() != self.embeddings.dimension() {
            return Err(Error::Inference(format!(
                "encoder produced {} values, scene vectors have {}",
                embedding.len(),
                self.embeddings.dimension()
            )));
        }
        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    /// Every scene with its similarity to `image`, best first.
    pub fn rank(&mut self, image: &ImageView<'_>) -> Result<Vec<SceneMatch>> {
        let embedding = self.embed(image)?;
        Ok(self.embeddings.rank(&embedding))
    }

    /// Best matching scene, or `UNKNOWN` when none scores above `min_score`.
    pub fn analyze(&mut self, image: &ImageView<'_>) -> Result<SceneMatch> {
        let best = self
            .rank(image)?
            .into_iter()
            .next()
            .filter(|best| best.score > self.options.min_score);
        let result = best.unwrap_or_else(|| SceneMatch {
            scene: UNKNOWN_SCENE.to_string(),
            score: self.options.min_score,
        });
        log::debug!("scene {} ({:.3})", result.scene, result.score);
        Ok(result)
    }
}

/// Stretch to `side x side` and apply CLIP mean/std normalization, NCHW.
fn encoder_input(image: &RgbImage, side: u32) -> Result<InputTensor> {
    let geometry = Letterbox::compute(side, side, side)?;
    let resized = imageops::resize(image, side, side, FilterType::Triangle);

    let plane = (side * side) as usize;
    let mut data = vec![0.0; plane * 3];
    for (idx, pixel) in resized.pixels().enumerate() {
        for channel in 0..3 {
            let value = pixel[channel] as f32 / 255.0;
            data[channel * plane + idx] = (value - CLIP_MEAN[channel]) / CLIP_STD[channel];
        }
    }
    Ok(InputTensor {
        data,
        letterbox: geometry,
    })
}

fn first_row(output: &RawOutput) -> Result<Vec<f32>> {
    if output.cols == 0 || output.data.len() < output.cols {
        return Err(Error::Inference(format!(
            "encoder output {}x{} holds {} values",
            output.rows,
            output.cols,
            output.data.len()
        )));
    }
    Ok(output.data[..output.cols].to_vec())
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm < MIN_NORM {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssets;
    use crate::detect::{PixelFormat, StubLoader};

    const EMBEDDINGS: &str = r#"{
        "TEXT": [2.0, 0.0, 0.0],
        "FOOD": [0.0, 0.5, 0.0],
        "PERSON": [0.0, 0.0, 3.0]
    }"#;

    fn assets() -> MemoryAssets {
        MemoryAssets::new()
            .with("clip/vision.onnx", b"graph".to_vec())
            .unwrap()
            .with("clip/vision.bin", b"weights".to_vec())
            .unwrap()
            .with("clip/scenes.json", EMBEDDINGS)
            .unwrap()
    }

    fn options() -> SceneOptions {
        SceneOptions {
            input_size: 32,
            weights_path: Some("clip/vision.bin".into()),
            ..SceneOptions::default()
        }
    }

    fn encoder(embedding: Vec<f32>) -> StubLoader {
        StubLoader::new(RawOutput {
            rows: 1,
            cols: embedding.len(),
            data: embedding,
        })
    }

    fn matcher(embedding: Vec<f32>, options: &SceneOptions) -> SceneMatcher {
        SceneMatcher::load(
            &assets(),
            "clip/vision.onnx",
            "clip/scenes.json",
            &encoder(embedding),
            options,
        )
        .unwrap()
    }

    #[test]
    fn embeddings_are_normalized_and_ordered() {
        let table = SceneEmbeddings::from_json(EMBEDDINGS.as_bytes()).unwrap();
        assert_eq!(table.len(), 3);
        assert!(!table.is_empty());
        assert_eq!(table.dimension(), 3);
        assert_eq!(table.names().collect::<Vec<_>>(), ["FOOD", "PERSON", "TEXT"]);

        let ranked = table.rank(&[0.0, 1.0, 0.0]);
        assert_eq!(ranked[0].scene, "FOOD");
        assert!((ranked[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_malformed_embeddings() {
        for raw in [
            "{}",
            "not json",
            r#"{"A": []}"#,
            r#"{"A": [1.0, 0.0], "B": [1.0]}"#,
            r#"["A"]"#,
        ] {
            assert!(matches!(
                SceneEmbeddings::from_json(raw.as_bytes()),
                Err(Error::ModelLoad(_))
            ));
        }
    }

    #[test]
    fn analyze_picks_the_closest_scene() {
        let mut matcher = matcher(vec![0.1, 0.2, 4.0], &options());
        assert_eq!(matcher.embeddings().len(), 3);
        let pixels = vec![200u8; 3 * 20 * 10];
        let image = ImageView::new(&pixels, 20, 10, PixelFormat::Rgb888);

        let best = matcher.analyze(&image).unwrap();
        assert_eq!(best.scene, "PERSON");
        assert!(!best.is_unknown());
        assert!(best.score > 0.99 && best.score <= 1.0);

        let ranked = matcher.rank(&image).unwrap();
        assert_eq!(ranked.len(), 3);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(matcher.analyze(&image).unwrap(), best);
    }

    #[test]
    fn low_scores_are_unknown() {
        let options = SceneOptions {
            min_score: 0.5,
            ..options()
        };
        let mut matcher = matcher(vec![-1.0, -1.0, -1.0], &options);
        let pixels = vec![0u8; 4 * 8 * 8];
        let image = ImageView::new(&pixels, 8, 8, PixelFormat::Rgba8888);
        let result = matcher.analyze(&image).unwrap();
        assert!(result.is_unknown());
        assert_eq!(result.scene, UNKNOWN_SCENE);
    }

    #[test]
    fn embedding_dimension_must_match_scene_table() {
        let mut matcher = matcher(vec![1.0, 0.0], &options());
        let pixels = vec![0u8; 3 * 4 * 4];
        let image = ImageView::new(&pixels, 4, 4, PixelFormat::Rgb888);
        assert!(matches!(matcher.analyze(&image), Err(Error::Inference(_))));
    }

    #[test]
    fn load_reports_missing_assets() {
        let err = SceneMatcher::load(
            &assets(),
            "clip/vision.onnx",
            "clip/missing.json",
            &encoder(vec![1.0, 0.0, 0.0]),
            &options(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::AssetNotFound(_)));
        assert_eq!(err.status_code(), crate::error::STATUS_ASSET_ERROR);
    }

    #[test]
    fn encoder_input_uses_clip_normalization() {
        let image = RgbImage::from_pixel(10, 30, image::Rgb([255, 0, 128]));
        let input = encoder_input(&image, 16).unwrap();
        let plane = 16 * 16;
        assert_eq!(input.data.len(), 3 * plane);
        let red = (1.0 - CLIP_MEAN[0]) / CLIP_STD[0];
        let green = (0.0 - CLIP_MEAN[1]) / CLIP_STD[1];
        assert!((input.data[0] - red).abs() < 1e-2);
        assert!((input.data[plane + plane - 1] - green).abs() < 1e-2);
    }
}
