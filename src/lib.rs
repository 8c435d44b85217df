//! YOLOv8 detector binding
//!
//! Loads an object-detection model from an asset store (a parameter file plus
//! a weights file) and runs it on decoded images, returning class, confidence
//! and a pixel-space bounding box per detected object.
//!
//! # Module Structure
//!
//! - `assets`: read-only asset stores (directory, in-memory)
//! - `detect`: image views, letterboxing, output decoding, NMS, labels,
//!   inference backends, loaded models and the multi-model registry
//! - `binding`: single-model binding with integer status codes
//! - `scene`: scene matching by image embedding similarity
//! - `config`: TOML + environment configuration
//! - `error`: error type and status code mapping

pub mod assets;
pub mod binding;
pub mod config;
pub mod detect;
pub mod error;
pub mod scene;

pub use assets::{AssetSource, DirectoryAssets, MemoryAssets};
pub use binding::{shared, DetectorBinding};
pub use config::DetectorConfig;
pub use detect::{
    DetectionResult, ImageView, Model, ModelHandle, ModelInfo, ModelOptions, ModelRegistry,
    PixelFormat,
};
pub use error::{
    Error, Result, STATUS_ASSET_ERROR, STATUS_INTERNAL_ERROR, STATUS_INVALID_ARGUMENT,
    STATUS_MODEL_ERROR, STATUS_OK,
};
pub use scene::{SceneMatch, SceneMatcher, SceneOptions, UNKNOWN_SCENE};
