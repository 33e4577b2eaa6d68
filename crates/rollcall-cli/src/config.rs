use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "rollcall.toml";

/// Default Euclidean-distance threshold for a positive match.
///
/// Embeddings are L2-normalized, so distance d and cosine similarity s
/// satisfy d² = 2 − 2s; 1.10 corresponds to s ≈ 0.40.
const DEFAULT_DISTANCE_THRESHOLD: f32 = 1.10;

/// Tool configuration.
///
/// Layered lowest-precedence first: built-in defaults, then an optional
/// `rollcall.toml`, then `ROLLCALL_*` environment variables. Path flags on
/// the command line override all three (applied by `main`).
#[derive(Debug)]
pub struct Config {
    /// Directory of labeled reference photos (`Name_RollNo.ext`).
    pub known_faces_dir: PathBuf,
    /// Attendance ledger CSV file.
    pub attendance_file: PathBuf,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Euclidean distance below which a probe matches a gallery entry.
    pub distance_threshold: f32,
    /// Frames to discard at session start (auto-exposure stabilization).
    pub warmup_frames: usize,
    /// Non-dark frames to capture per attendance session.
    pub frames_per_session: usize,
}

/// Shape of the on-disk configuration file; every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    known_faces_dir: Option<PathBuf>,
    attendance_file: Option<PathBuf>,
    camera_device: Option<String>,
    model_dir: Option<PathBuf>,
    distance_threshold: Option<f32>,
    warmup_frames: Option<usize>,
    frames_per_session: Option<usize>,
}

impl Config {
    /// Load configuration: `file` if given (missing is then an error),
    /// else `rollcall.toml` in the working directory if present, else
    /// defaults; `ROLLCALL_*` environment variables override either.
    pub fn load(file: Option<&Path>) -> anyhow::Result<Config> {
        let file_config = match file {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                let raw = std::fs::read_to_string(DEFAULT_CONFIG_FILE)
                    .with_context(|| format!("reading {DEFAULT_CONFIG_FILE}"))?;
                toml::from_str(&raw).with_context(|| format!("parsing {DEFAULT_CONFIG_FILE}"))?
            }
            None => FileConfig::default(),
        };

        Ok(Config {
            known_faces_dir: env_path("ROLLCALL_KNOWN_FACES_DIR")
                .or(file_config.known_faces_dir)
                .unwrap_or_else(|| PathBuf::from("known_faces")),
            attendance_file: env_path("ROLLCALL_ATTENDANCE_FILE")
                .or(file_config.attendance_file)
                .unwrap_or_else(|| PathBuf::from("attendance.csv")),
            camera_device: std::env::var("ROLLCALL_CAMERA_DEVICE")
                .ok()
                .or(file_config.camera_device)
                .unwrap_or_else(|| "/dev/video0".to_string()),
            model_dir: env_path("ROLLCALL_MODEL_DIR")
                .or(file_config.model_dir)
                .unwrap_or_else(rollcall_core::default_model_dir),
            distance_threshold: env_parse("ROLLCALL_DISTANCE_THRESHOLD")
                .or(file_config.distance_threshold)
                .unwrap_or(DEFAULT_DISTANCE_THRESHOLD),
            warmup_frames: env_parse("ROLLCALL_WARMUP_FRAMES")
                .or(file_config.warmup_frames)
                .unwrap_or(4),
            frames_per_session: env_parse("ROLLCALL_FRAMES_PER_SESSION")
                .or(file_config.frames_per_session)
                .unwrap_or(3),
        })
    }

    /// Path to the face detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the face embedding model.
    pub fn embedder_model_path(&self) -> String {
        self.model_dir
            .join("w600k_r50.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().map(PathBuf::from)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
