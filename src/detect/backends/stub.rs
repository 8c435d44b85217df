use crate::detect::backend::{InferenceBackend, ModelLoader, RawOutput};
use crate::detect::preprocess::InputTensor;
use crate::error::{Error, Result};

/// Stub loader for testing. Every model it builds replays one canned head
/// output, regardless of the input image.
#[derive(Clone, Debug, Default)]
pub struct StubLoader {
    output: RawOutput,
}

impl StubLoader {
    pub fn new(output: RawOutput) -> Self {
        Self { output }
    }

    /// Loader whose models never report anything: one anchor, all scores zero.
    pub fn empty(num_classes: usize) -> Self {
        let rows = 4 + num_classes;
        Self::new(RawOutput {
            rows,
            cols: 1,
            data: vec![0.0; rows],
        })
    }
}

impl ModelLoader for StubLoader {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn load(
        &self,
        param: &[u8],
        weights: &[u8],
        input_size: u32,
    ) -> Result<Box<dyn InferenceBackend>> {
        if param.is_empty() {
            return Err(Error::ModelLoad("parameter file is empty".into()));
        }
        if weights.is_empty() {
            return Err(Error::ModelLoad("weights file is empty".into()));
        }
        Ok(Box::new(StubBackend {
            output: self.output.clone(),
            input_size,
        }))
    }
}

pub struct StubBackend {
    output: RawOutput,
    input_size: u32,
}

impl InferenceBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn infer(&mut self, input: &InputTensor) -> Result<RawOutput> {
        let side = self.input_size as usize;
        if input.data.len() != 3 * side * side {
            return Err(Error::Inference(format!(
                "expected {} input values, received {}",
                3 * side * side,
                input.data.len()
            )));
        }
        Ok(self.output.clone())
    }
}
