use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Pipeline configuration.
///
/// Built from defaults, then `FACESIEVE_*` environment variables, then an
/// optional TOML file. Command-line flags are applied by the caller last.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// SCRFD detection model.
    pub model_path: PathBuf,
    /// Detections scoring at or below this are discarded.
    pub min_detection_confidence: f32,
    /// IoU above which overlapping detections are suppressed.
    pub nms_threshold: f32,
    /// Side length of the square face crops.
    pub target_size: u32,
    /// Cosine-distance radius for near-duplicate clustering.
    pub cluster_eps: f32,
    /// Minimum neighbourhood size (self included) for a core point.
    pub cluster_min_samples: usize,
    /// Variants generated per processed image.
    pub augmentations_per_image: usize,
    /// Fixed RNG seed for reproducible augmentation.
    pub seed: Option<u64>,
    /// Apply the final ImageNet normalization step to augmented variants.
    pub normalize_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_path: default_model_dir().join(DEFAULT_MODEL_FILE),
            min_detection_confidence: facesieve_core::detector::DEFAULT_CONFIDENCE_THRESHOLD,
            nms_threshold: facesieve_core::detector::DEFAULT_NMS_THRESHOLD,
            target_size: 224,
            cluster_eps: facesieve_core::cluster::DEFAULT_EPS,
            cluster_min_samples: facesieve_core::cluster::DEFAULT_MIN_SAMPLES,
            augmentations_per_image: 9,
            seed: None,
            normalize_output: true,
        }
    }
}

const DEFAULT_MODEL_FILE: &str = "det_10g.onnx";

/// TOML overrides; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub model_path: Option<PathBuf>,
    pub min_detection_confidence: Option<f32>,
    pub nms_threshold: Option<f32>,
    pub target_size: Option<u32>,
    pub cluster_eps: Option<f32>,
    pub cluster_min_samples: Option<usize>,
    pub augmentations_per_image: Option<usize>,
    pub seed: Option<u64>,
    pub normalize_output: Option<bool>,
}

impl Config {
    /// Load configuration from `FACESIEVE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let model_path = match std::env::var("FACESIEVE_MODEL_PATH") {
            Ok(p) => PathBuf::from(p),
            Err(_) => std::env::var("FACESIEVE_MODEL_DIR")
                .map(|d| PathBuf::from(d).join(DEFAULT_MODEL_FILE))
                .unwrap_or(defaults.model_path),
        };

        Self {
            model_path,
            min_detection_confidence: env_f32(
                "FACESIEVE_MIN_DETECTION_CONFIDENCE",
                defaults.min_detection_confidence,
            ),
            nms_threshold: env_f32("FACESIEVE_NMS_THRESHOLD", defaults.nms_threshold),
            target_size: env_u32("FACESIEVE_TARGET_SIZE", defaults.target_size),
            cluster_eps: env_f32("FACESIEVE_CLUSTER_EPS", defaults.cluster_eps),
            cluster_min_samples: env_usize(
                "FACESIEVE_CLUSTER_MIN_SAMPLES",
                defaults.cluster_min_samples,
            ),
            augmentations_per_image: env_usize(
                "FACESIEVE_AUGMENTATIONS_PER_IMAGE",
                defaults.augmentations_per_image,
            ),
            seed: std::env::var("FACESIEVE_SEED")
                .ok()
                .and_then(|v| v.parse().ok()),
            normalize_output: std::env::var("FACESIEVE_NORMALIZE_OUTPUT")
                .map(|v| v != "0")
                .unwrap_or(defaults.normalize_output),
        }
    }

    /// Environment configuration, overridden by `file` when given, then validated.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_env();
        if let Some(path) = file {
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let overrides: ConfigFile =
                toml::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
            config.apply_file(overrides);
            tracing::debug!(path = %path.display(), "config file applied");
        }
        config.validate()?;
        Ok(config)
    }

    /// Replace every field the file sets.
    pub fn apply_file(&mut self, file: ConfigFile) {
        if let Some(v) = file.model_path {
            self.model_path = v;
        }
        if let Some(v) = file.min_detection_confidence {
            self.min_detection_confidence = v;
        }
        if let Some(v) = file.nms_threshold {
            self.nms_threshold = v;
        }
        if let Some(v) = file.target_size {
            self.target_size = v;
        }
        if let Some(v) = file.cluster_eps {
            self.cluster_eps = v;
        }
        if let Some(v) = file.cluster_min_samples {
            self.cluster_min_samples = v;
        }
        if let Some(v) = file.augmentations_per_image {
            self.augmentations_per_image = v;
        }
        if file.seed.is_some() {
            self.seed = file.seed;
        }
        if let Some(v) = file.normalize_output {
            self.normalize_output = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_detection_confidence) {
            return Err(ConfigError::Invalid(format!(
                "min_detection_confidence {} outside [0, 1]",
                self.min_detection_confidence
            )));
        }
        if !(0.0..=1.0).contains(&self.nms_threshold) {
            return Err(ConfigError::Invalid(format!(
                "nms_threshold {} outside [0, 1]",
                self.nms_threshold
            )));
        }
        if self.target_size == 0 {
            return Err(ConfigError::Invalid("target_size must be positive".into()));
        }
        if !(self.cluster_eps > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "cluster_eps {} must be positive",
                self.cluster_eps
            )));
        }
        if self.cluster_min_samples == 0 {
            return Err(ConfigError::Invalid(
                "cluster_min_samples must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// `$XDG_DATA_HOME/facesieve/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facesieve")
        .join("models")
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
