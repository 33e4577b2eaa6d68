//! rollcall-core — face detection, embedding, and gallery matching.
//!
//! Detection and embedding run via ONNX Runtime (a SCRFD-family detector
//! and an ArcFace-family embedder). Reference photos enroll into a
//! [`Gallery`]; live probes resolve against it by Euclidean distance.

pub mod align;
pub mod encoder;
pub mod gallery;
pub mod types;

pub use encoder::{DetectedFace, EncoderError, FaceEncoder};
pub use gallery::{Gallery, GalleryError};
pub use types::{Embedding, EuclideanMatcher, FaceBox, Identity, MatchOutcome, Matcher};

/// Default directory for the ONNX model files.
pub fn default_model_dir() -> std::path::PathBuf {
    std::path::PathBuf::from("models")
}
