//! YOLOv8 head decoding and class-aware non-maximum suppression.

use crate::error::{Error, Result};

use super::backend::RawOutput;
use super::labels::LabelSet;
use super::preprocess::Letterbox;
use super::result::DetectionResult;

/// Box regression values (cx, cy, w, h) that precede class scores.
const BOX_FEATURES: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputLayout {
    /// `[4 + classes, anchors]`, the layout of an exported YOLOv8 head.
    ChannelsFirst { classes: usize, anchors: usize },
    /// `[anchors, 4 + classes]`.
    AnchorsFirst { classes: usize, anchors: usize },
}

impl OutputLayout {
    pub fn infer(output: &RawOutput, num_labels: usize) -> Result<Self> {
        let (rows, cols) = (output.rows, output.cols);
        if output.data.len() != rows * cols {
            return Err(Error::Inference(format!(
                "output holds {} values, shape says {}x{}",
                output.data.len(),
                rows,
                cols
            )));
        }
        let channels_first = if rows == BOX_FEATURES + num_labels {
            true
        } else if cols == BOX_FEATURES + num_labels {
            false
        } else {
            rows <= cols
        };
        let (features, anchors) = if channels_first {
            (rows, cols)
        } else {
            (cols, rows)
        };
        if features <= BOX_FEATURES {
            return Err(Error::Inference(format!(
                "output shape {}x{} has no class scores",
                rows, cols
            )));
        }
        let classes = features - BOX_FEATURES;
        Ok(if channels_first {
            OutputLayout::ChannelsFirst { classes, anchors }
        } else {
            OutputLayout::AnchorsFirst { classes, anchors }
        })
    }

    pub fn anchors(&self) -> usize {
        match *self {
            OutputLayout::ChannelsFirst { anchors, .. }
            | OutputLayout::AnchorsFirst { anchors, .. } => anchors,
        }
    }

    pub fn classes(&self) -> usize {
        match *self {
            OutputLayout::ChannelsFirst { classes, .. }
            | OutputLayout::AnchorsFirst { classes, .. } => classes,
        }
    }

    fn value(&self, data: &[f32], anchor: usize, feature: usize) -> f32 {
        match *self {
            OutputLayout::ChannelsFirst { anchors, .. } => data[feature * anchors + anchor],
            OutputLayout::AnchorsFirst { classes, .. } => {
                data[anchor * (classes + BOX_FEATURES) + feature]
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DecodeParams<'a> {
    pub threshold: f32,
    pub nms_threshold: f32,
    pub max_detections: usize,
    pub letterbox: Letterbox,
    pub image_width: u32,
    pub image_height: u32,
    pub labels: &'a LabelSet,
}

/// Decode, threshold and suppress. Results are sorted by descending
/// confidence and every result has `confidence >= params.threshold`.
pub fn decode(output: &RawOutput, params: &DecodeParams<'_>) -> Result<Vec<DetectionResult>> {
    let layout = OutputLayout::infer(output, params.labels.len())?;
    let proposals = proposals(output, &layout, params);
    let mut kept = nms(proposals, params.nms_threshold);
    kept.truncate(params.max_detections);
    Ok(kept)
}

fn proposals(
    output: &RawOutput,
    layout: &OutputLayout,
    params: &DecodeParams<'_>,
) -> Vec<DetectionResult> {
    let data = &output.data;
    let max_x = params.image_width as f32;
    let max_y = params.image_height as f32;
    let mut out = Vec::new();

    for anchor in 0..layout.anchors() {
        let mut class_id = 0usize;
        let mut score = f32::NEG_INFINITY;
        for class in 0..layout.classes() {
            let value = layout.value(data, anchor, BOX_FEATURES + class);
            if value > score {
                score = value;
                class_id = class;
            }
        }
        if score < params.threshold {
            continue;
        }

        let cx = layout.value(data, anchor, 0);
        let cy = layout.value(data, anchor, 1);
        let w = layout.value(data, anchor, 2);
        let h = layout.value(data, anchor, 3);

        let (x0, y0) = params.letterbox.unmap(cx - w * 0.5, cy - h * 0.5);
        let (x1, y1) = params.letterbox.unmap(cx + w * 0.5, cy + h * 0.5);
        let x0 = x0.clamp(0.0, max_x);
        let y0 = y0.clamp(0.0, max_y);
        let x1 = x1.clamp(0.0, max_x);
        let y1 = y1.clamp(0.0, max_y);
        if !(x1 > x0 && y1 > y0) {
            continue;
        }

        let class_id = class_id as u32;
        out.push(DetectionResult {
            class_id,
            class_name: params.labels.name(class_id).to_string(),
            confidence: score,
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        });
    }
    out
}

/// Greedy class-aware NMS over proposals sorted by descending confidence.
/// A proposal is dropped when its IoU with an already kept box of the same
/// class exceeds `nms_threshold`.
pub fn nms(mut proposals: Vec<DetectionResult>, nms_threshold: f32) -> Vec<DetectionResult> {
    proposals.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<DetectionResult> = Vec::with_capacity(proposals.len());
    for candidate in proposals {
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && candidate.iou(k) > nms_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
