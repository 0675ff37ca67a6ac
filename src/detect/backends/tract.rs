#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use tract_onnx::prelude::*;

use crate::decode::DecodedImage;
use crate::detect::backend::{ClassFilter, DetectorBackend};
use crate::detect::classes::coco_name;
use crate::detect::result::RawDetection;

const BOX_COORDS: usize = 4;
const LETTERBOX_FILL: u8 = 114;

/// Tract-based backend for YOLO-family ONNX detection models.
///
/// Expects a single `[1, 3, H, W]` f32 input and a `[1, 4 + classes, anchors]`
/// output with center-xywh boxes followed by per-class scores. This backend
/// loads a local model file once and performs no other I/O.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    candidate_threshold: f32,
    iou_threshold: f32,
}

/// Mapping from model input space back to source image pixels.
#[derive(Clone, Copy, Debug)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            candidate_threshold: 0.25,
            iou_threshold: 0.7,
        })
    }

    fn build_input(&self, image: &DecodedImage) -> Result<(Tensor, Letterbox)> {
        let (src_w, src_h) = (image.width(), image.height());
        if src_w == 0 || src_h == 0 {
            return Err(anyhow!("frame has zero dimension {}x{}", src_w, src_h));
        }

        let scale = (self.width as f32 / src_w as f32).min(self.height as f32 / src_h as f32);
        let scaled_w = ((src_w as f32 * scale).round() as u32).clamp(1, self.width);
        let scaled_h = ((src_h as f32 * scale).round() as u32).clamp(1, self.height);
        let resized = imageops::resize(image.as_rgb(), scaled_w, scaled_h, FilterType::Triangle);

        let pad_x = (self.width - scaled_w) / 2;
        let pad_y = (self.height - scaled_h) / 2;
        let mut canvas = RgbImage::from_pixel(self.width, self.height, Rgb([LETTERBOX_FILL; 3]));
        imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, channel, y, x)| canvas.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );

        Ok((
            input.into_tensor(),
            Letterbox {
                scale,
                pad_x: pad_x as f32,
                pad_y: pad_y as f32,
            },
        ))
    }

    fn decode_output(
        &self,
        outputs: TVec<TValue>,
        letterbox: Letterbox,
        classes: &ClassFilter,
    ) -> Result<Vec<RawDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output was not [batch, attributes, anchors]")?;

        let attributes = view.shape()[1];
        let anchors = view.shape()[2];
        if attributes <= BOX_COORDS {
            return Err(anyhow!(
                "model output has {} attributes per anchor; expected box + class scores",
                attributes
            ));
        }
        let class_count = attributes - BOX_COORDS;

        let mut candidates = Vec::new();
        for anchor in 0..anchors {
            for class_index in classes.iter().filter(|&c| c < class_count) {
                let confidence = view[[0, BOX_COORDS + class_index, anchor]];
                if confidence < self.candidate_threshold {
                    continue;
                }
                let cx = (view[[0, 0, anchor]] - letterbox.pad_x) / letterbox.scale;
                let cy = (view[[0, 1, anchor]] - letterbox.pad_y) / letterbox.scale;
                let w = view[[0, 2, anchor]] / letterbox.scale;
                let h = view[[0, 3, anchor]] / letterbox.scale;
                candidates.push(RawDetection {
                    class_index,
                    confidence,
                    center_xywh: [cx, cy, w, h],
                });
            }
        }

        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn class_name(&self, class_index: usize) -> Option<&str> {
        coco_name(class_index)
    }

    fn predict(&mut self, image: &DecodedImage, classes: &ClassFilter) -> Result<Vec<RawDetection>> {
        let (input, letterbox) = self.build_input(image)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode_output(outputs, letterbox, classes)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = DecodedImage::new(RgbImage::new(self.width, self.height));
        self.predict(&blank, &ClassFilter::new([0]))?;
        Ok(())
    }
}

/// Greedy per-class non-maximum suppression, highest confidence first.
fn non_max_suppression(mut candidates: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<RawDetection> = Vec::new();
    for candidate in candidates {
        let suppressed = kept.iter().any(|k| {
            k.class_index == candidate.class_index
                && iou(&k.center_xywh, &candidate.center_xywh) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let (ax1, ay1, ax2, ay2) = corners(a);
    let (bx1, by1, bx2, by2) = corners(b);
    let iw = (ax2.min(bx2) - ax1.max(bx1)).max(0.0);
    let ih = (ay2.min(by2) - ay1.max(by1)).max(0.0);
    let inter = iw * ih;
    let union = a[2] * a[3] + b[2] * b[3] - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

fn corners(b: &[f32; 4]) -> (f32, f32, f32, f32) {
    let (hw, hh) = (b[2] / 2.0, b[3] / 2.0);
    (b[0] - hw, b[1] - hh, b[0] + hw, b[1] + hh)
}
