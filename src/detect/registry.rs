use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::assets::AssetSource;
use crate::error::{Error, Result};

use super::backend::ModelLoader;
use super::model::{Model, ModelInfo, ModelOptions};
use super::result::DetectionResult;
use super::view::ImageView;

/// Opaque token naming one loaded model. Never reused within a registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelHandle(u64);

impl fmt::Display for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model#{}", self.0)
    }
}

/// Thread-safe registry of loaded models.
///
/// Models are wrapped in `Mutex` because `Model::detect` takes `&mut self`.
/// Detect calls on different handles run in parallel; calls on the same
/// handle are serialized.
pub struct ModelRegistry {
    loader: Arc<dyn ModelLoader>,
    options: ModelOptions,
    models: Mutex<HashMap<ModelHandle, Arc<Mutex<Model>>>>,
    next_id: AtomicU64,
}

impl ModelRegistry {
    pub fn new(loader: Arc<dyn ModelLoader>, options: ModelOptions) -> Self {
        Self {
            loader,
            options,
            models: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Load a model and register it under a fresh handle.
    ///
    /// The map lock is not held while the backend parses the model, so a slow
    /// load does not stall detection on other handles.
    pub fn load(
        &self,
        assets: &dyn AssetSource,
        param_path: &str,
        weights_path: &str,
    ) -> Result<ModelHandle> {
        let model = Model::load(
            assets,
            param_path,
            weights_path,
            self.loader.as_ref(),
            &self.options,
        )?;
        let handle = ModelHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.models
            .lock()
            .map_err(|_| Error::Poisoned)?
            .insert(handle, Arc::new(Mutex::new(model)));
        log::debug!("registered {} from {}", handle, assets.describe());
        Ok(handle)
    }

    pub fn get(&self, handle: ModelHandle) -> Result<Arc<Mutex<Model>>> {
        self.models
            .lock()
            .map_err(|_| Error::Poisoned)?
            .get(&handle)
            .cloned()
            .ok_or(Error::UnknownHandle(handle))
    }

    pub fn detect(
        &self,
        handle: ModelHandle,
        image: &ImageView<'_>,
        threshold: f32,
    ) -> Result<Vec<DetectionResult>> {
        let model = self.get(handle)?;
        let mut guard = model.lock().map_err(|_| Error::Poisoned)?;
        guard.detect(image, threshold)
    }

    pub fn detect_class(
        &self,
        handle: ModelHandle,
        image: &ImageView<'_>,
        threshold: f32,
        query: &str,
    ) -> Result<Vec<DetectionResult>> {
        let model = self.get(handle)?;
        let mut guard = model.lock().map_err(|_| Error::Poisoned)?;
        guard.detect_class(image, threshold, query)
    }

    pub fn info(&self, handle: ModelHandle) -> Result<ModelInfo> {
        let model = self.get(handle)?;
        let guard = model.lock().map_err(|_| Error::Poisoned)?;
        Ok(guard.info().clone())
    }

    /// Drop a model. Returns false when the handle was not registered.
    /// A detect call already holding the model finishes before it is freed.
    pub fn release(&self, handle: ModelHandle) -> bool {
        let removed = match self.models.lock() {
            Ok(mut models) => models.remove(&handle).is_some(),
            Err(poisoned) => poisoned.into_inner().remove(&handle).is_some(),
        };
        if removed {
            log::debug!("released {}", handle);
        }
        removed
    }

    pub fn contains(&self, handle: ModelHandle) -> bool {
        self.models
            .lock()
            .map(|models| models.contains_key(&handle))
            .unwrap_or(false)
    }

    /// Registered handles in load order.
    pub fn handles(&self) -> Vec<ModelHandle> {
        let mut handles: Vec<ModelHandle> = self
            .models
            .lock()
            .map(|models| models.keys().copied().collect())
            .unwrap_or_default();
        handles.sort();
        handles
    }

    pub fn len(&self) -> usize {
        self.models.lock().map(|models| models.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
