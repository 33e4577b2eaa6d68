//! ONNX face detection and embedding extraction.
//!
//! Detection uses a SCRFD-family model (anchor-free, three stride levels
//! with non-maximum suppression); embedding uses an ArcFace-family model
//! over aligned 112×112 crops. Both run on CPU via ONNX Runtime.

use crate::align;
use crate::types::{Embedding, FaceBox};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const DET_INPUT_SIZE: usize = 640;
const DET_MEAN: f32 = 127.5;
const DET_STD: f32 = 128.0;
const DET_CONFIDENCE: f32 = 0.5;
const DET_NMS_IOU: f32 = 0.4;
/// Stride levels of the detector head. Outputs are ordered
/// [scores 8/16/32, box deltas 8/16/32, landmarks 8/16/32].
const DET_STRIDES: [usize; 3] = [8, 16, 32];
const DET_ANCHORS_PER_CELL: usize = 2;
const DET_OUTPUT_COUNT: usize = 9;

const EMBED_MEAN: f32 = 127.5;
/// ArcFace normalization is symmetric, unlike the detector's.
const EMBED_STD: f32 = 127.5;
const EMBED_DIM: usize = 512;
const EMBED_MODEL_VERSION: &str = "w600k_r50";

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A face found in one image: where it is and what it looks like.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: FaceBox,
    pub embedding: Embedding,
}

/// Coordinate mapping for the letterbox resize into the detector input.
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    /// Map a point in detector-input space back to frame space.
    fn unproject(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Face detector and embedder over a pair of ONNX sessions.
///
/// `encode` is the whole pipeline: detect every face in a grayscale image
/// and return one embedding per face, highest detection confidence first.
pub struct FaceEncoder {
    detector: Session,
    embedder: Session,
}

impl FaceEncoder {
    /// Load both ONNX models. Fails fast if either file is missing or the
    /// detector does not expose the expected nine output tensors.
    pub fn load(detector_path: &str, embedder_path: &str) -> Result<Self, EncoderError> {
        for path in [detector_path, embedder_path] {
            if !Path::new(path).exists() {
                return Err(EncoderError::ModelNotFound(path.to_string()));
            }
        }

        let detector = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(detector_path)?;

        let num_outputs = detector.outputs().len();
        if num_outputs < DET_OUTPUT_COUNT {
            return Err(EncoderError::InferenceFailed(format!(
                "detector must expose {DET_OUTPUT_COUNT} outputs (3 strides × scores/boxes/landmarks), got {num_outputs}"
            )));
        }

        let embedder = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(embedder_path)?;

        tracing::info!(
            detector = detector_path,
            embedder = embedder_path,
            "face encoder loaded"
        );

        Ok(Self { detector, embedder })
    }

    /// Detect every face in a grayscale image and extract one embedding
    /// per face. Returns an empty vector when no face is present.
    pub fn encode(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<DetectedFace>, EncoderError> {
        let faces = self.detect(gray, width, height)?;

        let mut encoded = Vec::with_capacity(faces.len());
        for bbox in faces {
            let embedding = self.embed(gray, width, height, &bbox)?;
            encoded.push(DetectedFace { bbox, embedding });
        }
        Ok(encoded)
    }

    /// Run detection, returning boxes sorted by confidence, highest first.
    fn detect(&mut self, gray: &[u8], width: u32, height: u32) -> Result<Vec<FaceBox>, EncoderError> {
        let (input, letterbox) = detector_input(gray, width as usize, height as usize);

        let outputs = self
            .detector
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut found = Vec::new();
        for (level, &stride) in DET_STRIDES.iter().enumerate() {
            let (_, scores) = outputs[level]
                .try_extract_tensor::<f32>()
                .map_err(|e| EncoderError::InferenceFailed(format!("scores, stride {stride}: {e}")))?;
            let (_, deltas) = outputs[level + 3]
                .try_extract_tensor::<f32>()
                .map_err(|e| EncoderError::InferenceFailed(format!("boxes, stride {stride}: {e}")))?;
            let (_, points) = outputs[level + 6]
                .try_extract_tensor::<f32>()
                .map_err(|e| EncoderError::InferenceFailed(format!("landmarks, stride {stride}: {e}")))?;

            found.extend(decode_grid(scores, deltas, points, stride, &letterbox));
        }

        let mut faces = nms(found, DET_NMS_IOU);
        faces.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(faces)
    }

    /// Align one detected face and extract its L2-normalized embedding.
    fn embed(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
        face: &FaceBox,
    ) -> Result<Embedding, EncoderError> {
        let aligned = align::crop_aligned(gray, width, height, &face.landmarks);
        let input = crop_input(&aligned);

        let outputs = self
            .embedder
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EncoderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != EMBED_DIM {
            return Err(EncoderError::InferenceFailed(format!(
                "expected {EMBED_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        let norm = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
        let values = if norm > 0.0 {
            raw.iter().map(|v| v / norm).collect()
        } else {
            raw.to_vec()
        };

        Ok(Embedding {
            values,
            model_version: Some(EMBED_MODEL_VERSION.to_string()),
        })
    }
}

/// Resize a grayscale image with bilinear interpolation.
fn resize_bilinear(gray: &[u8], width: usize, height: usize, new_w: usize, new_h: usize) -> Vec<u8> {
    let scale_x = width as f32 / new_w as f32;
    let scale_y = height as f32 / new_h as f32;

    let mut out = vec![0u8; new_w * new_h];
    for y in 0..new_h {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor().max(0.0) as usize).min(height - 1);
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..new_w {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor().max(0.0) as usize).min(width - 1);
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let top = gray[y0 * width + x0] as f32 * (1.0 - fx) + gray[y0 * width + x1] as f32 * fx;
            let bottom = gray[y1 * width + x0] as f32 * (1.0 - fx) + gray[y1 * width + x1] as f32 * fx;
            out[y * new_w + x] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Letterbox a grayscale image into the detector's NCHW input tensor.
///
/// The tensor starts zeroed; since the pad value DET_MEAN normalizes to
/// exactly 0.0, only the resized region needs filling. Grayscale is
/// replicated across the three channels.
fn detector_input(gray: &[u8], width: usize, height: usize) -> (Array4<f32>, Letterbox) {
    let scale = (DET_INPUT_SIZE as f32 / width as f32).min(DET_INPUT_SIZE as f32 / height as f32);
    let new_w = ((width as f32 * scale).round() as usize).max(1);
    let new_h = ((height as f32 * scale).round() as usize).max(1);
    let pad_x = ((DET_INPUT_SIZE - new_w) / 2) as f32;
    let pad_y = ((DET_INPUT_SIZE - new_h) / 2) as f32;

    let resized = resize_bilinear(gray, width, height, new_w, new_h);

    let mut tensor = Array4::<f32>::zeros((1, 3, DET_INPUT_SIZE, DET_INPUT_SIZE));
    let (x_off, y_off) = (pad_x as usize, pad_y as usize);
    for y in 0..new_h {
        for x in 0..new_w {
            let normalized = (resized[y * new_w + x] as f32 - DET_MEAN) / DET_STD;
            for channel in 0..3 {
                tensor[[0, channel, y + y_off, x + x_off]] = normalized;
            }
        }
    }

    (tensor, Letterbox { scale, pad_x, pad_y })
}

/// Preprocess an aligned 112×112 crop into the embedder's NCHW tensor.
fn crop_input(aligned: &[u8]) -> Array4<f32> {
    let size = align::CROP_SIZE;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for y in 0..size {
        for x in 0..size {
            let pixel = aligned.get(y * size + x).copied().unwrap_or(0) as f32;
            let normalized = (pixel - EMBED_MEAN) / EMBED_STD;
            for channel in 0..3 {
                tensor[[0, channel, y, x]] = normalized;
            }
        }
    }
    tensor
}

/// Decode the anchor grid of one stride level into frame-space boxes.
///
/// Anchors sit at cell centers, two per cell; box deltas are offsets from
/// the anchor in stride units, landmarks likewise. Anchors whose landmark
/// slice is missing are dropped — alignment needs all five points.
fn decode_grid(
    scores: &[f32],
    deltas: &[f32],
    points: &[f32],
    stride: usize,
    letterbox: &Letterbox,
) -> Vec<FaceBox> {
    let grid = DET_INPUT_SIZE / stride;
    let num_anchors = grid * grid * DET_ANCHORS_PER_CELL;

    let mut boxes = Vec::new();
    for idx in 0..num_anchors {
        let confidence = scores.get(idx).copied().unwrap_or(0.0);
        if confidence <= DET_CONFIDENCE {
            continue;
        }

        let cell = idx / DET_ANCHORS_PER_CELL;
        let anchor_x = ((cell % grid) * stride) as f32;
        let anchor_y = ((cell / grid) * stride) as f32;

        let d = idx * 4;
        if d + 3 >= deltas.len() {
            continue;
        }
        let (x1, y1) = letterbox.unproject(
            anchor_x - deltas[d] * stride as f32,
            anchor_y - deltas[d + 1] * stride as f32,
        );
        let (x2, y2) = letterbox.unproject(
            anchor_x + deltas[d + 2] * stride as f32,
            anchor_y + deltas[d + 3] * stride as f32,
        );

        let p = idx * 10;
        if p + 9 >= points.len() {
            continue;
        }
        let landmarks: [(f32, f32); 5] = std::array::from_fn(|i| {
            letterbox.unproject(
                anchor_x + points[p + i * 2] * stride as f32,
                anchor_y + points[p + i * 2 + 1] * stride as f32,
            )
        });

        boxes.push(FaceBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence,
            landmarks,
        });
    }

    boxes
}

/// Intersection-over-union of two boxes.
fn iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Non-maximum suppression: keep the highest-confidence box of each
/// overlapping cluster.
fn nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|kept| iou(kept, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> FaceBox {
        FaceBox {
            x,
            y,
            width: w,
            height: h,
            confidence,
            landmarks: [(0.0, 0.0); 5],
        }
    }

    #[test]
    fn test_iou_identical() {
        let a = face(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = face(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = face(20.0, 20.0, 10.0, 10.0, 1.0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = face(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = face(5.0, 0.0, 10.0, 10.0, 1.0);
        // intersection 50, union 150
        assert!((iou(&a, &b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_cluster() {
        let boxes = vec![
            face(0.0, 0.0, 100.0, 100.0, 0.9),
            face(5.0, 5.0, 100.0, 100.0, 0.8),
            face(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let kept = nms(boxes, 0.4);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert!((kept[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_disjoint() {
        let boxes = vec![
            face(0.0, 0.0, 10.0, 10.0, 0.9),
            face(50.0, 50.0, 10.0, 10.0, 0.8),
        ];
        assert_eq!(nms(boxes, 0.4).len(), 2);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_letterbox_unproject_roundtrip() {
        let letterbox = Letterbox {
            scale: 2.0,
            pad_x: 0.0,
            pad_y: 140.0,
        };
        // Frame point (100, 50) projects to (200, 240) in input space.
        let (x, y) = letterbox.unproject(200.0, 240.0);
        assert!((x - 100.0).abs() < 1e-5);
        assert!((y - 50.0).abs() < 1e-5);
    }

    #[test]
    fn test_detector_input_shape_and_padding() {
        // 320x240 letterboxes to 640x480 with 80px vertical pads.
        let gray = vec![255u8; 320 * 240];
        let (tensor, letterbox) = detector_input(&gray, 320, 240);

        assert_eq!(tensor.shape(), &[1, 3, DET_INPUT_SIZE, DET_INPUT_SIZE]);
        assert!((letterbox.scale - 2.0).abs() < 1e-6);
        assert_eq!(letterbox.pad_x, 0.0);
        assert_eq!(letterbox.pad_y, 80.0);

        // Pad rows normalize to 0, image rows to (255 - mean) / std.
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        let expected = (255.0 - DET_MEAN) / DET_STD;
        assert!((tensor[[0, 0, 320, 320]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_crop_input_normalization_and_channels() {
        let aligned = vec![128u8; align::CROP_SIZE * align::CROP_SIZE];
        let tensor = crop_input(&aligned);

        assert_eq!(tensor.shape(), &[1, 3, align::CROP_SIZE, align::CROP_SIZE]);
        let expected = (128.0 - EMBED_MEAN) / EMBED_STD;
        for channel in 0..3 {
            assert!((tensor[[0, channel, 10, 10]] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_resize_bilinear_uniform_stays_uniform() {
        let gray = vec![77u8; 100 * 100];
        let resized = resize_bilinear(&gray, 100, 100, 200, 200);
        assert!(resized.iter().all(|&p| p == 77));
    }

    #[test]
    fn test_decode_grid_single_anchor() {
        // Only anchor 0 (cell center at the origin) scores above the
        // confidence threshold; identity letterbox keeps coordinates as-is.
        let letterbox = Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        let scores = [0.9f32, 0.0];
        // Box extends 2 stride units in every direction from the anchor.
        let deltas = [2.0f32, 2.0, 2.0, 2.0, 0.0, 0.0, 0.0, 0.0];
        let points: Vec<f32> = (0..20).map(|i| (i / 2) as f32).collect();

        let boxes = decode_grid(&scores, &deltas, &points, 8, &letterbox);
        assert_eq!(boxes.len(), 1);

        let b = &boxes[0];
        assert!((b.x - -16.0).abs() < 1e-5);
        assert!((b.y - -16.0).abs() < 1e-5);
        assert!((b.width - 32.0).abs() < 1e-5);
        assert!((b.height - 32.0).abs() < 1e-5);
        assert!((b.confidence - 0.9).abs() < 1e-6);
        // Landmark i decodes to (i * stride, i * stride).
        assert!((b.landmarks[3].0 - 24.0).abs() < 1e-5);
        assert!((b.landmarks[3].1 - 24.0).abs() < 1e-5);
    }

    #[test]
    fn test_decode_grid_drops_anchor_without_landmarks() {
        let letterbox = Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        let scores = [0.9f32];
        let deltas = [1.0f32, 1.0, 1.0, 1.0];
        // Landmark tensor too short for anchor 0.
        let points = [0.0f32; 5];

        assert!(decode_grid(&scores, &deltas, &points, 8, &letterbox).is_empty());
    }

    #[test]
    fn test_decode_grid_all_below_threshold() {
        let letterbox = Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        let scores = [0.1f32, 0.2, 0.3];
        let deltas = [1.0f32; 12];
        let points = [1.0f32; 30];
        assert!(decode_grid(&scores, &deltas, &points, 8, &letterbox).is_empty());
    }
}
