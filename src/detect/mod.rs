mod backend;
pub mod backends;
mod labels;
mod model;
pub mod postprocess;
pub mod preprocess;
mod registry;
mod result;
mod view;

pub use backend::{InferenceBackend, ModelLoader, RawOutput};
pub use backends::StubLoader;
#[cfg(feature = "backend-tract")]
pub use backends::TractLoader;
pub use labels::{LabelSet, COCO_CLASSES};
pub use model::{
    validate_threshold, Model, ModelInfo, ModelOptions, DEFAULT_INPUT_SIZE,
    DEFAULT_MAX_DETECTIONS, DEFAULT_NMS_THRESHOLD,
};
pub use registry::{ModelHandle, ModelRegistry};
pub use result::{DetectionResult, UNKNOWN_CLASS_NAME};
pub use view::{ImageView, PixelFormat};
