use crate::error::Result;

use super::preprocess::InputTensor;

/// Raw head output with the batch dimension removed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawOutput {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

/// A model instantiated by an inference engine.
///
/// The backend owns the parsed graph and weights. It receives a
/// letterboxed NCHW tensor and returns the first output of the graph; all
/// decoding happens outside the backend.
pub trait InferenceBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Square input side the model was prepared for.
    fn input_size(&self) -> u32;

    fn infer(&mut self, input: &InputTensor) -> Result<RawOutput>;

    /// Optional warm-up hook, run once after loading.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Builds backends from a parameter file and a weights file.
pub trait ModelLoader: Send + Sync {
    fn name(&self) -> &'static str;

    fn load(
        &self,
        param: &[u8],
        weights: &[u8],
        input_size: u32,
    ) -> Result<Box<dyn InferenceBackend>>;
}
