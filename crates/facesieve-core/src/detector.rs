//! Face detection capability and its SCRFD implementation via ONNX Runtime.
//!
//! The pipeline only depends on the [`FaceDetector`] and [`DetectorProvider`]
//! traits; [`ScrfdDetector`] is the production implementation, decoding the
//! 3-stride anchor-free SCRFD outputs with NMS post-processing.

use crate::types::{Detection, RelativeBox};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.4;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — download det_10g.onnx from insightface")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Black-box face detection over an RGB image.
///
/// Returns zero or more detections with boxes in normalized coordinates.
/// Detections below the implementation's confidence threshold are never
/// returned.
pub trait FaceDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError>;
}

/// Hands out one detector per category.
///
/// The returned detector is released when dropped, so its native resources
/// live no longer than the category that acquired it.
pub trait DetectorProvider {
    fn acquire(&self) -> Result<Box<dyn FaceDetector>, DetectorError>;
}

/// Loads a fresh [`ScrfdDetector`] for every [`acquire`](DetectorProvider::acquire).
#[derive(Debug, Clone)]
pub struct ScrfdProvider {
    pub model_path: PathBuf,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
}

impl ScrfdProvider {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
        }
    }

    pub fn with_thresholds(mut self, confidence: f32, nms: f32) -> Self {
        self.confidence_threshold = confidence;
        self.nms_threshold = nms;
        self
    }
}

impl DetectorProvider for ScrfdProvider {
    fn acquire(&self) -> Result<Box<dyn FaceDetector>, DetectorError> {
        let detector =
            ScrfdDetector::load(&self.model_path, self.confidence_threshold, self.nms_threshold)?;
        Ok(Box::new(detector))
    }
}

/// Metadata for coordinate de-mapping after letterbox resize.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Output tensor indices for one stride: (score_idx, bbox_idx, kps_idx).
type StrideOutputIndices = (usize, usize, usize);

/// Face box in source-image pixels, prior to normalization.
#[derive(Debug, Clone, Copy)]
struct PixelDetection {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    confidence: f32,
}

/// SCRFD-based face detector.
pub struct ScrfdDetector {
    session: Session,
    input_height: usize,
    input_width: usize,
    confidence_threshold: f32,
    nms_threshold: f32,
    /// Per-stride output indices [(score, bbox, kps)] for strides [8, 16, 32].
    stride_indices: [StrideOutputIndices; 3],
}

impl ScrfdDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(
        model_path: &Path,
        confidence_threshold: f32,
        nms_threshold: f32,
    ) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();
        let num_outputs = output_names.len();

        tracing::debug!(
            path = %model_path.display(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        // SCRFD always exports 3 strides × score/bbox/kps; the kps tensors are unused here.
        if num_outputs < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {num_outputs}"
            )));
        }

        let stride_indices = discover_output_indices(&output_names);

        Ok(Self {
            session,
            input_height: SCRFD_INPUT_SIZE,
            input_width: SCRFD_INPUT_SIZE,
            confidence_threshold,
            nms_threshold,
            stride_indices,
        })
    }

    /// Preprocess an RGB image into a NCHW float tensor with letterbox padding.
    fn preprocess(&self, image: &RgbImage) -> (Array4<f32>, LetterboxInfo) {
        let width = image.width() as usize;
        let height = image.height() as usize;
        let letterbox = letterbox_for(width, height, self.input_width, self.input_height);

        let new_w = ((width as f32 * letterbox.scale).round() as usize).min(self.input_width);
        let new_h = ((height as f32 * letterbox.scale).round() as usize).min(self.input_height);
        let pad_x_start = letterbox.pad_x.floor() as usize;
        let pad_y_start = letterbox.pad_y.floor() as usize;

        // Pad value normalizes to 0.0.
        let mut tensor = Array4::<f32>::zeros((1, 3, self.input_height, self.input_width));
        let inv_scale = 1.0 / letterbox.scale;
        let raw = image.as_raw();

        for y in 0..new_h {
            let src_y = (y as f32 + 0.5) * inv_scale - 0.5;
            let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
            let y1 = (y0 + 1).min(height - 1);
            let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

            for x in 0..new_w {
                let src_x = (x as f32 + 0.5) * inv_scale - 0.5;
                let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
                let x1 = (x0 + 1).min(width - 1);
                let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

                let ty = pad_y_start + y;
                let tx = pad_x_start + x;
                if ty >= self.input_height || tx >= self.input_width {
                    continue;
                }

                for c in 0..3 {
                    let at = |px: usize, py: usize| raw[(py * width + px) * 3 + c] as f32;
                    let val = at(x0, y0) * (1.0 - fx) * (1.0 - fy)
                        + at(x1, y0) * fx * (1.0 - fy)
                        + at(x0, y1) * (1.0 - fx) * fy
                        + at(x1, y1) * fx * fy;
                    tensor[[0, c, ty, tx]] = (val - SCRFD_MEAN) / SCRFD_STD;
                }
            }
        }

        (tensor, letterbox)
    }
}

impl FaceDetector for ScrfdDetector {
    /// Detect faces, returning boxes sorted by descending confidence.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = self.preprocess(image);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut all_detections = Vec::new();

        for (stride_pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, _) = self.stride_indices[stride_pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;

            all_detections.extend(decode_stride(
                scores,
                bboxes,
                stride,
                self.input_width,
                self.input_height,
                &letterbox,
                self.confidence_threshold,
            ));
        }

        let kept = nms(all_detections, self.nms_threshold);
        tracing::trace!(faces = kept.len(), width, height, "SCRFD detect");

        Ok(kept
            .iter()
            .map(|d| to_relative(d, width, height))
            .collect())
    }
}

fn letterbox_for(width: usize, height: usize, input_width: usize, input_height: usize) -> LetterboxInfo {
    let scale_w = input_width as f32 / width as f32;
    let scale_h = input_height as f32 / height as f32;
    let scale = scale_w.min(scale_h);

    let new_w = (width as f32 * scale).round().min(input_width as f32);
    let new_h = (height as f32 * scale).round().min(input_height as f32);

    LetterboxInfo {
        scale,
        pad_x: (input_width as f32 - new_w) / 2.0,
        pad_y: (input_height as f32 - new_h) / 2.0,
    }
}

fn to_relative(d: &PixelDetection, width: u32, height: u32) -> Detection {
    let w = width as f32;
    let h = height as f32;
    Detection {
        bbox: RelativeBox {
            xmin: d.x / w,
            ymin: d.y / h,
            width: d.width / w,
            height: d.height / h,
        },
        confidence: d.confidence,
    }
}

/// Discover output tensor ordering by name.
///
/// Named exports ("score_8", "bbox_16", ...) are mapped to stride slots;
/// anything else falls back to the standard positional ordering:
///   [0-2] = scores, [3-5] = bboxes, [6-8] = kps (strides 8, 16, 32)
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let mut named = [(0, 0, 0); 3];
    for (slot, &stride) in SCRFD_STRIDES.iter().enumerate() {
        match (find("score", stride), find("bbox", stride), find("kps", stride)) {
            (Some(s), Some(b), Some(k)) => named[slot] = (s, b, k),
            _ => {
                tracing::debug!(?names, "SCRFD: output names not recognized, using positional mapping");
                return [(0, 3, 6), (1, 4, 7), (2, 5, 8)];
            }
        }
    }
    named
}

/// Decode detections for a single stride level.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    input_width: usize,
    input_height: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<PixelDetection> {
    let grid_h = input_height / stride;
    let grid_w = input_width / stride;
    let num_anchors = grid_h * grid_w * SCRFD_ANCHORS_PER_CELL;
    let s = stride as f32;

    let mut detections = Vec::new();

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let anchor_idx = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_cx = (anchor_idx % grid_w) as f32 * s;
        let anchor_cy = (anchor_idx / grid_w) as f32 * s;

        // [x1_offset, y1_offset, x2_offset, y2_offset] * stride
        let off = idx * 4;
        if off + 3 >= bboxes.len() {
            continue;
        }
        let x1 = (anchor_cx - bboxes[off] * s - letterbox.pad_x) / letterbox.scale;
        let y1 = (anchor_cy - bboxes[off + 1] * s - letterbox.pad_y) / letterbox.scale;
        let x2 = (anchor_cx + bboxes[off + 2] * s - letterbox.pad_x) / letterbox.scale;
        let y2 = (anchor_cy + bboxes[off + 3] * s - letterbox.pad_y) / letterbox.scale;

        detections.push(PixelDetection {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
        });
    }

    detections
}

/// Non-Maximum Suppression; output is sorted by descending confidence.
fn nms(mut detections: Vec<PixelDetection>, iou_threshold: f32) -> Vec<PixelDetection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i]);

        for j in (i + 1)..detections.len() {
            if !suppressed[j] && iou(&detections[i], &detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Intersection-over-Union between two boxes.
fn iou(a: &PixelDetection, b: &PixelDetection) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union_area = a.width * a.height + b.width * b.height - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}
