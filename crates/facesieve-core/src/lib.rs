//! facesieve-core — Face dataset curation engine.
//!
//! Extracts the largest face from each image with an SCRFD detector running
//! on ONNX Runtime, drops exact duplicates by perceptual hash and near
//! duplicates by histogram clustering, and produces randomized augmentations
//! of the surviving crops.

pub mod augment;
pub mod cluster;
pub mod detector;
pub mod extractor;
pub mod hash;
pub mod types;
mod warp;

pub use augment::{AugmentError, AugmentPipeline};
pub use cluster::{Clusterer, Dbscan, HistogramFeature, Metric, NearDuplicateClusterer, NOISE};
pub use detector::{DetectorError, DetectorProvider, FaceDetector, ScrfdDetector, ScrfdProvider};
pub use extractor::{ExtractOutcome, FaceExtractor, SkipReason};
pub use hash::{DuplicateFilter, PerceptualHash};
pub use types::{Detection, FaceCrop, PixelBox, ProcessedRecord, RelativeBox};
