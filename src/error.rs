use std::path::PathBuf;

use thiserror::Error;

use crate::detect::ModelHandle;

/// Status code returned by `load_model` on success.
pub const STATUS_OK: i32 = 0;
/// Asset missing or unreadable.
pub const STATUS_ASSET_ERROR: i32 = -1;
/// Model could not be parsed or initialized by the backend.
pub const STATUS_MODEL_ERROR: i32 = -2;
/// Invalid argument (bad path, threshold, image).
pub const STATUS_INVALID_ARGUMENT: i32 = -3;
/// Internal failure (poisoned lock, inference fault).
pub const STATUS_INTERNAL_ERROR: i32 = -4;

#[derive(Error, Debug)]
pub enum Error {
    #[error("asset not found: {0}")]
    AssetNotFound(String),
    #[error("invalid asset path '{0}'")]
    InvalidAssetPath(String),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model load failed: {0}")]
    ModelLoad(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("confidence threshold {0} is outside [0, 1]")]
    InvalidThreshold(f32),
    #[error("unknown model handle {0}")]
    UnknownHandle(ModelHandle),
    #[error("no model loaded")]
    NoModelLoaded,
    #[error("model lock poisoned")]
    Poisoned,
}

impl Error {
    /// Coarse status code for the binding surface.
    pub fn status_code(&self) -> i32 {
        match self {
            Error::AssetNotFound(_) | Error::Io { .. } => STATUS_ASSET_ERROR,
            Error::ModelLoad(_) => STATUS_MODEL_ERROR,
            Error::InvalidAssetPath(_)
            | Error::InvalidImage(_)
            | Error::InvalidThreshold(_)
            | Error::UnknownHandle(_)
            | Error::NoModelLoaded => STATUS_INVALID_ARGUMENT,
            Error::Inference(_) | Error::Poisoned => STATUS_INTERNAL_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
