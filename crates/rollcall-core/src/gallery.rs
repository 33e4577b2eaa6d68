//! Reference-photo gallery.
//!
//! Enrollment is filename-as-schema: `known_faces/<Name>_<RollNo>.<ext>`,
//! one face per photo. The stem grammar is parsed explicitly; a file
//! violating it is skipped with a warning.

use crate::encoder::{EncoderError, FaceEncoder};
use crate::types::Identity;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("filename {0:?} does not match Name_RollNo.ext")]
    MalformedFilename(String),
    #[error("no face detected in reference photo {0}")]
    NoFaceDetected(PathBuf),
    #[error("{count} faces detected in reference photo {path} — one face per photo")]
    AmbiguousReference { path: PathBuf, count: usize },
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
    #[error("encoder: {0}")]
    Encoder(#[from] EncoderError),
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no usable reference photos in {0}")]
    EmptyGallery(PathBuf),
}

/// In-memory gallery of enrolled identities, keyed by roll number.
///
/// Read-only after [`load`](Gallery::load); iteration is sorted by roll
/// number, which fixes the matcher's tie-break order.
#[derive(Default)]
pub struct Gallery {
    by_roll: BTreeMap<String, Identity>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an identity, returning the entry it replaced if the roll
    /// number was already enrolled.
    pub fn insert(&mut self, identity: Identity) -> Option<Identity> {
        self.by_roll.insert(identity.roll_no.clone(), identity)
    }

    pub fn get(&self, roll_no: &str) -> Option<&Identity> {
        self.by_roll.get(roll_no)
    }

    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.by_roll.values()
    }

    pub fn len(&self) -> usize {
        self.by_roll.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_roll.is_empty()
    }

    /// Build the gallery from a directory of labeled reference photos.
    ///
    /// Files are visited in sorted name order. A photo that fails to
    /// enroll (bad name, unreadable image, zero or multiple faces) is
    /// skipped with a warning; ending up with nothing enrolled is fatal.
    /// When two photos carry the same roll number the later one wins.
    pub fn load(dir: &Path, encoder: &mut FaceEncoder) -> Result<Gallery, GalleryError> {
        let entries = std::fs::read_dir(dir).map_err(|source| GalleryError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut photos: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| has_image_extension(path))
            .collect();
        photos.sort();

        let mut gallery = Gallery::new();
        for path in &photos {
            match enroll_photo(path, encoder) {
                Ok(identity) => {
                    tracing::info!(
                        name = %identity.name,
                        roll_no = %identity.roll_no,
                        photo = %path.display(),
                        "enrolled"
                    );
                    if let Some(replaced) = gallery.insert(identity) {
                        tracing::warn!(
                            roll_no = %replaced.roll_no,
                            "duplicate roll number, keeping the later photo"
                        );
                    }
                }
                Err(err) => {
                    tracing::warn!(photo = %path.display(), error = %err, "skipping reference photo");
                }
            }
        }

        if gallery.is_empty() {
            return Err(GalleryError::EmptyGallery(dir.to_path_buf()));
        }

        tracing::info!(enrolled = gallery.len(), dir = %dir.display(), "gallery loaded");
        Ok(gallery)
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Parse `Name_RollNo` from a filename stem.
///
/// Splits on the first underscore so names may not contain one, but roll
/// numbers may. Both parts must be non-empty.
pub fn parse_stem(stem: &str) -> Option<(String, String)> {
    let (name, roll_no) = stem.split_once('_')?;
    if name.is_empty() || roll_no.is_empty() {
        return None;
    }
    Some((name.to_string(), roll_no.to_string()))
}

/// Parse the `(name, roll_no)` label from a photo path.
pub fn parse_photo_label(path: &Path) -> Result<(String, String), GalleryError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| GalleryError::MalformedFilename(path.display().to_string()))?;

    parse_stem(stem).ok_or_else(|| GalleryError::MalformedFilename(stem.to_string()))
}

/// Enroll one reference photo: parse its label, decode it, and extract
/// exactly one face embedding.
fn enroll_photo(path: &Path, encoder: &mut FaceEncoder) -> Result<Identity, GalleryError> {
    let (name, roll_no) = parse_photo_label(path)?;

    let photo = image::open(path)?.into_luma8();
    let (width, height) = photo.dimensions();

    let mut faces = encoder.encode(photo.as_raw(), width, height)?;
    match faces.len() {
        0 => Err(GalleryError::NoFaceDetected(path.to_path_buf())),
        1 => Ok(Identity {
            name,
            roll_no,
            embedding: faces.remove(0).embedding,
        }),
        count => Err(GalleryError::AmbiguousReference {
            path: path.to_path_buf(),
            count,
        }),
    }
}
