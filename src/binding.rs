//! Single-model detector binding with status-code loading.
//!
//! This is the narrow surface an embedding runtime calls into: load a model
//! from an asset bundle and get back an integer status, run detection and
//! get back a (possibly empty) list of results. Failures never cross this
//! boundary as panics; they are logged and mapped to a status code or an
//! empty result. `try_*` variants return the underlying error.
//!
//! Callers that need several models at once should use
//! [`ModelRegistry`](crate::detect::ModelRegistry) instead.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use crate::assets::AssetSource;
use crate::detect::{DetectionResult, ImageView, Model, ModelInfo, ModelLoader, ModelOptions};
use crate::error::{Error, Result, STATUS_OK};

pub struct DetectorBinding {
    loader: Arc<dyn ModelLoader>,
    options: ModelOptions,
    model: Mutex<Option<Model>>,
}

impl DetectorBinding {
    pub fn new(loader: Arc<dyn ModelLoader>, options: ModelOptions) -> Self {
        Self {
            loader,
            options,
            model: Mutex::new(None),
        }
    }

    /// Load a model, replacing the current one. Returns `0` on success and a
    /// negative status code otherwise (see `crate::error::STATUS_*`).
    ///
    /// The previous model is dropped before loading starts, so after a
    /// failed load the binding is unloaded.
    pub fn load_model(&self, assets: &dyn AssetSource, param_path: &str, weights_path: &str) -> i32 {
        match self.try_load(assets, param_path, weights_path) {
            Ok(_) => STATUS_OK,
            Err(err) => {
                log::warn!(
                    "load_model({}, {}) from {} failed: {}",
                    param_path,
                    weights_path,
                    assets.describe(),
                    err
                );
                err.status_code()
            }
        }
    }

    pub fn try_load(
        &self,
        assets: &dyn AssetSource,
        param_path: &str,
        weights_path: &str,
    ) -> Result<ModelInfo> {
        let mut slot = self.slot();
        slot.take();
        let model = Model::load(
            assets,
            param_path,
            weights_path,
            self.loader.as_ref(),
            &self.options,
        )?;
        let info = model.info().clone();
        *slot = Some(model);
        Ok(info)
    }

    /// Run detection with the loaded model. Returns an empty list when no
    /// model is loaded or the input is rejected.
    pub fn detect(&self, image: &ImageView<'_>, threshold: f32) -> Vec<DetectionResult> {
        self.try_detect(image, threshold).unwrap_or_else(|err| {
            log::warn!("detect failed: {}", err);
            Vec::new()
        })
    }

    pub fn try_detect(&self, image: &ImageView<'_>, threshold: f32) -> Result<Vec<DetectionResult>> {
        let mut slot = self.slot();
        let model = slot.as_mut().ok_or(Error::NoModelLoaded)?;
        model.detect(image, threshold)
    }

    /// Run detection and keep only the class named by `query`.
    pub fn detect_class(
        &self,
        image: &ImageView<'_>,
        threshold: f32,
        query: &str,
    ) -> Vec<DetectionResult> {
        self.try_detect_class(image, threshold, query)
            .unwrap_or_else(|err| {
                log::warn!("detect_class('{}') failed: {}", query, err);
                Vec::new()
            })
    }

    pub fn try_detect_class(
        &self,
        image: &ImageView<'_>,
        threshold: f32,
        query: &str,
    ) -> Result<Vec<DetectionResult>> {
        let mut slot = self.slot();
        let model = slot.as_mut().ok_or(Error::NoModelLoaded)?;
        model.detect_class(image, threshold, query)
    }

    /// Drop the loaded model. Returns whether one was loaded.
    pub fn release(&self) -> bool {
        let released = self.slot().take().is_some();
        if released {
            log::debug!("detector model released");
        }
        released
    }

    pub fn is_loaded(&self) -> bool {
        self.slot().is_some()
    }

    pub fn model_info(&self) -> Option<ModelInfo> {
        self.slot().as_ref().map(|model| model.info().clone())
    }

    /// Lock the model slot. A lock poisoned by a panicking backend is
    /// recovered by discarding the model it was running, so the binding
    /// reads as unloaded until the next `load_model`.
    fn slot(&self) -> MutexGuard<'_, Option<Model>> {
        self.model.lock().unwrap_or_else(|poisoned| {
            let mut slot = poisoned.into_inner();
            if let Some(model) = slot.take() {
                log::warn!(
                    "discarding model {} after a backend panic",
                    model.info().param_path
                );
            }
            self.model.clear_poison();
            slot
        })
    }
}

/// Process-wide binding, created on first use with the default loader and
/// options. Never torn down.
pub fn shared() -> &'static DetectorBinding {
    static SHARED: OnceLock<DetectorBinding> = OnceLock::new();
    SHARED.get_or_init(|| DetectorBinding::new(default_loader(), ModelOptions::default()))
}

/// The loader used when none is configured.
#[cfg(feature = "backend-tract")]
pub fn default_loader() -> Arc<dyn ModelLoader> {
    Arc::new(crate::detect::TractLoader::new())
}

#[cfg(not(feature = "backend-tract"))]
pub fn default_loader() -> Arc<dyn ModelLoader> {
    log::warn!("built without an inference backend; models will report no detections");
    Arc::new(crate::detect::StubLoader::empty(crate::detect::COCO_CLASSES.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::assets::MemoryAssets;
    use crate::detect::preprocess::InputTensor;
    use crate::detect::{InferenceBackend, PixelFormat, RawOutput, StubLoader};
    use crate::error::{STATUS_ASSET_ERROR, STATUS_INVALID_ARGUMENT, STATUS_MODEL_ERROR};

    fn binding() -> DetectorBinding {
        DetectorBinding::new(
            Arc::new(StubLoader::empty(80)),
            ModelOptions {
                input_size: 32,
                ..ModelOptions::default()
            },
        )
    }

    fn assets() -> MemoryAssets {
        MemoryAssets::new()
            .with("m.param", b"p".to_vec())
            .unwrap()
            .with("m.bin", b"w".to_vec())
            .unwrap()
            .with("empty.bin", Vec::new())
            .unwrap()
    }

    #[test]
    fn status_codes_follow_failure_kind() {
        let binding = binding();
        let assets = assets();
        assert_eq!(binding.load_model(&assets, "m.param", "m.bin"), STATUS_OK);
        assert_eq!(
            binding.load_model(&assets, "m.param", "nope.bin"),
            STATUS_ASSET_ERROR
        );
        assert_eq!(
            binding.load_model(&assets, "m.param", "empty.bin"),
            STATUS_MODEL_ERROR
        );
        assert_eq!(
            binding.load_model(&assets, "/abs/m.param", "m.bin"),
            STATUS_INVALID_ARGUMENT
        );
    }

    #[test]
    fn detect_without_model_is_empty() {
        let binding = binding();
        let pixels = vec![0u8; 4 * 8 * 8];
        let image = ImageView::new(&pixels, 8, 8, PixelFormat::Rgba8888);
        assert!(binding.detect(&image, 0.25).is_empty());
        assert!(matches!(
            binding.try_detect(&image, 0.25),
            Err(Error::NoModelLoaded)
        ));
    }

    #[test]
    fn release_unloads() {
        let binding = binding();
        assert!(!binding.release());
        assert_eq!(binding.load_model(&assets(), "m.param", "m.bin"), STATUS_OK);
        assert!(binding.is_loaded());
        assert_eq!(binding.model_info().unwrap().param_path, "m.param");
        assert!(binding.release());
        assert!(!binding.is_loaded());
        assert!(binding.model_info().is_none());
    }

    /// Loader whose first backend call panics; later calls behave like the stub.
    struct FaultOnceLoader {
        faulted: Arc<AtomicBool>,
    }

    struct FaultOnceBackend {
        inner: Box<dyn InferenceBackend>,
        faulted: Arc<AtomicBool>,
    }

    impl ModelLoader for FaultOnceLoader {
        fn name(&self) -> &'static str {
            "fault-once"
        }

        fn load(
            &self,
            param: &[u8],
            weights: &[u8],
            input_size: u32,
        ) -> Result<Box<dyn InferenceBackend>> {
            Ok(Box::new(FaultOnceBackend {
                inner: StubLoader::empty(80).load(param, weights, input_size)?,
                faulted: self.faulted.clone(),
            }))
        }
    }

    impl InferenceBackend for FaultOnceBackend {
        fn name(&self) -> &'static str {
            "fault-once"
        }

        fn input_size(&self) -> u32 {
            self.inner.input_size()
        }

        fn infer(&mut self, input: &InputTensor) -> Result<RawOutput> {
            if !self.faulted.swap(true, Ordering::SeqCst) {
                panic!("backend fault");
            }
            self.inner.infer(input)
        }
    }

    #[test]
    fn backend_panic_is_recovered_by_reloading() {
        let binding = DetectorBinding::new(
            Arc::new(FaultOnceLoader {
                faulted: Arc::new(AtomicBool::new(false)),
            }),
            ModelOptions {
                input_size: 32,
                ..ModelOptions::default()
            },
        );
        let assets = assets();
        let pixels = vec![0u8; 4 * 8 * 8];
        let image = ImageView::new(&pixels, 8, 8, PixelFormat::Rgba8888);

        assert_eq!(binding.load_model(&assets, "m.param", "m.bin"), STATUS_OK);
        let crashed = catch_unwind(AssertUnwindSafe(|| binding.detect(&image, 0.25)));
        assert!(crashed.is_err());

        assert!(!binding.is_loaded());
        assert!(matches!(
            binding.try_detect(&image, 0.25),
            Err(Error::NoModelLoaded)
        ));

        assert_eq!(binding.load_model(&assets, "m.param", "m.bin"), STATUS_OK);
        assert!(binding.is_loaded());
        assert!(binding.try_detect(&image, 0.25).unwrap().is_empty());
        assert!(binding.try_detect_class(&image, 0.25, "cup").unwrap().is_empty());
    }

    #[test]
    fn shared_binding_is_a_single_instance() {
        assert!(std::ptr::eq(shared(), shared()));
    }
}
