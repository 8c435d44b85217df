#![cfg(feature = "backend-tract")]

use tract_onnx::pb::{GraphProto, ModelProto};
use tract_onnx::prelude::*;

use crate::detect::backend::{InferenceBackend, ModelLoader, RawOutput};
use crate::detect::preprocess::InputTensor;
use crate::error::{Error, Result};

/// `TensorProto.data_location` value for tensors stored outside the graph.
const DATA_LOCATION_EXTERNAL: i32 = 1;

/// Tract-based loader for ONNX models.
///
/// The parameter file is the ONNX graph. Initializers saved as external
/// data are read from the weights file using their `offset`/`length`
/// entries; the `location` entry is ignored since the weights file is named
/// explicitly. Graphs with embedded initializers load without touching the
/// weights file.
#[derive(Clone, Copy, Debug, Default)]
pub struct TractLoader;

impl TractLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ModelLoader for TractLoader {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn load(
        &self,
        param: &[u8],
        weights: &[u8],
        input_size: u32,
    ) -> Result<Box<dyn InferenceBackend>> {
        let mut proto = tract_onnx::onnx()
            .proto_model_for_read(&mut &param[..])
            .map_err(|e| Error::ModelLoad(format!("failed to parse ONNX graph: {e:#}")))?;

        let graph = proto
            .graph
            .as_mut()
            .ok_or_else(|| Error::ModelLoad("ONNX model has no graph".into()))?;
        let inlined = inline_external_data(graph, weights)?;
        if inlined == 0 {
            log::debug!(
                "graph embeds its initializers; ignoring {} byte weights file",
                weights.len()
            );
        } else {
            log::debug!("inlined {} external initializers", inlined);
        }

        let side = input_size as usize;
        let model = build_plan(&proto, side)
            .map_err(|e| Error::ModelLoad(format!("failed to prepare ONNX model: {e:#}")))?;

        Ok(Box::new(TractBackend { model, input_size }))
    }
}

fn build_plan(proto: &ModelProto, side: usize) -> TractResult<TypedRunnableModel<TypedModel>> {
    tract_onnx::onnx()
        .model_for_proto_model(proto)?
        .with_input_fact(
            0,
            InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
        )?
        .into_optimized()?
        .into_runnable()
}

/// Replace external-data initializers with raw bytes sliced from `weights`.
/// Returns how many initializers were inlined.
fn inline_external_data(graph: &mut GraphProto, weights: &[u8]) -> Result<usize> {
    let mut inlined = 0;
    for tensor in graph.initializer.iter_mut() {
        if tensor.data_location != Some(DATA_LOCATION_EXTERNAL) {
            continue;
        }
        let mut offset = 0usize;
        let mut length = None;
        for entry in &tensor.external_data {
            match entry.key.as_str() {
                "offset" => offset = parse_extent(&tensor.name, "offset", &entry.value)?,
                "length" => length = Some(parse_extent(&tensor.name, "length", &entry.value)?),
                _ => {}
            }
        }
        let end = match length {
            Some(length) => offset.checked_add(length),
            None => Some(weights.len()),
        }
        .filter(|end| *end <= weights.len() && offset <= *end)
        .ok_or_else(|| {
            Error::ModelLoad(format!(
                "initializer '{}' lies outside the {} byte weights file",
                tensor.name,
                weights.len()
            ))
        })?;

        tensor.raw_data = weights[offset..end].to_vec();
        tensor.data_location = Some(0);
        tensor.external_data.clear();
        inlined += 1;
    }
    Ok(inlined)
}

fn parse_extent(tensor: &str, key: &str, value: &str) -> Result<usize> {
    value.trim().parse().map_err(|_| {
        Error::ModelLoad(format!(
            "initializer '{}' has invalid {} '{}'",
            tensor, key, value
        ))
    })
}

/// Runnable tract plan with a fixed `1x3xSxS` input.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn infer(&mut self, input: &InputTensor) -> Result<RawOutput> {
        let side = self.input_size as usize;
        let tensor = Tensor::from_shape(&[1, 3, side, side], &input.data)
            .map_err(|e| Error::Inference(format!("failed to build input tensor: {e:#}")))?;
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .map_err(|e| Error::Inference(format!("ONNX inference failed: {e:#}")))?;
        let output = outputs
            .first()
            .ok_or_else(|| Error::Inference("model produced no outputs".into()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|_| Error::Inference("model output tensor was not f32".into()))?;

        let (rows, cols) = match *view.shape() {
            [1, rows, cols] | [rows, cols] => (rows, cols),
            [cols] => (1, cols),
            ref other => {
                return Err(Error::Inference(format!(
                    "unexpected output shape {:?}",
                    other
                )))
            }
        };
        Ok(RawOutput {
            rows,
            cols,
            data: view.iter().copied().collect(),
        })
    }

    fn warm_up(&mut self) -> Result<()> {
        let side = self.input_size as usize;
        let blank = InputTensor {
            data: vec![0.0; 3 * side * side],
            letterbox: crate::detect::preprocess::Letterbox::compute(
                self.input_size,
                self.input_size,
                self.input_size,
            )?,
        };
        self.infer(&blank).map(|_| ())
    }
}
