#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::nms::non_max_suppression;
use crate::detect::result::{BoundingBox, ClassDetection};
use crate::frame::{Frame, RGB_CHANNELS};

/// Box coordinates preceding the class scores in each YOLOv8 prediction column.
const BOX_ROWS: usize = 4;

/// Tract-based YOLOv8 backend for ONNX inference.
///
/// Expects a model exported with a `[1, 3, H, W]` float input and a
/// `[1, 4 + classes, anchors]` output (`cx, cy, w, h` followed by per-class
/// scores). Frames are stretched to the model input; boxes are mapped back
/// to frame pixels.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_width: u32,
    input_height: u32,
    class_count: usize,
    confidence_threshold: f32,
    iou_threshold: f32,
    max_detections: usize,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32, class_count: usize) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_size as usize, input_size as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_width: input_size,
            input_height: input_size,
            class_count,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 300,
        })
    }

    /// Override the default confidence and IoU thresholds.
    pub fn with_thresholds(mut self, confidence: f32, iou: f32) -> Self {
        self.confidence_threshold = confidence;
        self.iou_threshold = iou;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        if frame.width == 0 || frame.height == 0 {
            return Err(anyhow!("cannot run inference on an empty frame"));
        }
        let pixels = frame.pixels();
        let src_w = frame.width as usize;
        let src_h = frame.height as usize;
        let dst_w = self.input_width as usize;
        let dst_h = self.input_height as usize;

        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, dst_h, dst_w),
            |(_, channel, y, x)| {
                let sx = x * src_w / dst_w;
                let sy = y * src_h / dst_h;
                let idx = (sy * src_w + sx) * RGB_CHANNELS + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<ClassDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let preds = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output was not [batch, rows, anchors]")?;

        let rows = preds.shape()[1];
        if rows != BOX_ROWS + self.class_count {
            return Err(anyhow!(
                "model output has {} rows, expected {} for {} classes",
                rows,
                BOX_ROWS + self.class_count,
                self.class_count
            ));
        }

        let scale_x = frame.width as f32 / self.input_width as f32;
        let scale_y = frame.height as f32 / self.input_height as f32;
        let max_x = frame.width as i32;
        let max_y = frame.height as i32;

        let mut candidates = Vec::new();
        for anchor in 0..preds.shape()[2] {
            let (class_id, score) = (0..self.class_count)
                .map(|c| (c, preds[[0, BOX_ROWS + c, anchor]]))
                .fold((0, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if !score.is_finite() || score < self.confidence_threshold {
                continue;
            }

            let cx = preds[[0, 0, anchor]] * scale_x;
            let cy = preds[[0, 1, anchor]] * scale_y;
            let w = preds[[0, 2, anchor]] * scale_x;
            let h = preds[[0, 3, anchor]] * scale_y;
            let clamp_x = |v: f32| (v as i32).clamp(0, max_x);
            let clamp_y = |v: f32| (v as i32).clamp(0, max_y);

            candidates.push(ClassDetection {
                class_id,
                bbox: BoundingBox::new(
                    clamp_x(cx - w / 2.0),
                    clamp_y(cy - h / 2.0),
                    clamp_x(cx + w / 2.0),
                    clamp_y(cy + h / 2.0),
                ),
                confidence: score.min(1.0),
            });
        }

        Ok(non_max_suppression(
            candidates,
            self.iou_threshold,
            self.max_detections,
        ))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn class_count(&self) -> usize {
        self.class_count
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<ClassDetection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame)
    }
}
