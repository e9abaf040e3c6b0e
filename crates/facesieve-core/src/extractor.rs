//! Face extraction: decode, detect, keep the largest face, crop and resize.

use crate::detector::FaceDetector;
use crate::types::{Detection, FaceCrop};
use image::imageops::{self, FilterType};
use image::{ImageReader, RgbImage};
use std::path::Path;

/// Why an image produced no face crop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The file could not be read or decoded.
    Unreadable,
    /// The detector found no face.
    NoFace,
    /// The largest face's box is empty or reaches outside the image.
    InvalidBox,
    /// Any other per-image failure (e.g. inference error).
    Failed(String),
}

/// Result of running extraction on one image.
#[derive(Debug, Clone)]
pub enum ExtractOutcome {
    Extracted(FaceCrop),
    Skipped(SkipReason),
}

impl ExtractOutcome {
    pub fn into_crop(self) -> Option<FaceCrop> {
        match self {
            Self::Extracted(crop) => Some(crop),
            Self::Skipped(_) => None,
        }
    }
}

/// Decode an image file into 8-bit RGB, sniffing the format from content
/// when the extension is missing or wrong.
pub fn decode_rgb(path: &Path) -> image::ImageResult<RgbImage> {
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(image.to_rgb8())
}

/// Produces square face crops of a fixed size.
#[derive(Debug, Clone, Copy)]
pub struct FaceExtractor {
    target_size: u32,
}

impl FaceExtractor {
    pub fn new(target_size: u32) -> Self {
        Self { target_size }
    }

    pub fn target_size(&self) -> u32 {
        self.target_size
    }

    /// Decode `path` and extract its largest face.
    ///
    /// Decode failures are silent; detector failures are logged with the
    /// source path. Neither is an error for the caller.
    pub fn extract_path(
        &self,
        path: &Path,
        category: &str,
        detector: &mut dyn FaceDetector,
    ) -> ExtractOutcome {
        let image = match decode_rgb(path) {
            Ok(image) => image,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "skipping undecodable image");
                return ExtractOutcome::Skipped(SkipReason::Unreadable);
            }
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let outcome = self.extract(&image, category, &file_name, detector);
        if let ExtractOutcome::Skipped(SkipReason::Failed(reason)) = &outcome {
            tracing::warn!(path = %path.display(), error = %reason, "error processing image");
        }
        outcome
    }

    /// Extract the largest face from an already-decoded image.
    pub fn extract(
        &self,
        image: &RgbImage,
        category: &str,
        file_name: &str,
        detector: &mut dyn FaceDetector,
    ) -> ExtractOutcome {
        if self.target_size == 0 {
            return ExtractOutcome::Skipped(SkipReason::Failed("target size is zero".into()));
        }

        let detections = match detector.detect(image) {
            Ok(d) => d,
            Err(e) => return ExtractOutcome::Skipped(SkipReason::Failed(e.to_string())),
        };

        let Some(largest) = largest_detection(&detections) else {
            return ExtractOutcome::Skipped(SkipReason::NoFace);
        };

        let (width, height) = image.dimensions();
        let source_box = largest.bbox.to_pixels(width, height);
        if !source_box.fits_within(width, height) {
            tracing::debug!(file = file_name, ?source_box, width, height, "rejecting out-of-bounds face box");
            return ExtractOutcome::Skipped(SkipReason::InvalidBox);
        }

        // fits_within guarantees every coordinate is non-negative and within u32 range.
        let face = imageops::crop_imm(
            image,
            source_box.x as u32,
            source_box.y as u32,
            source_box.width as u32,
            source_box.height as u32,
        )
        .to_image();
        let pixels = imageops::resize(&face, self.target_size, self.target_size, FilterType::Triangle);

        ExtractOutcome::Extracted(FaceCrop {
            pixels,
            category: category.to_string(),
            file_name: file_name.to_string(),
            source_box,
        })
    }
}

/// Detection with the largest relative area; the first one wins ties.
pub fn largest_detection(detections: &[Detection]) -> Option<&Detection> {
    detections.iter().fold(None, |best: Option<&Detection>, d| match best {
        Some(b) if b.bbox.area() >= d.bbox.area() => Some(b),
        _ => Some(d),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectorError;
    use crate::types::RelativeBox;
    use image::Rgb;

    /// Returns a fixed list of detections for every image.
    struct FixedDetector(Vec<Detection>);

    impl FaceDetector for FixedDetector {
        fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
            Ok(self.0.clone())
        }
    }

    struct FailingDetector;

    impl FaceDetector for FailingDetector {
        fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
            Err(DetectorError::InferenceFailed("boom".into()))
        }
    }

    fn det(xmin: f32, ymin: f32, width: f32, height: f32) -> Detection {
        Detection {
            bbox: RelativeBox { xmin, ymin, width, height },
            confidence: 0.9,
        }
    }

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 128]))
    }

    #[test]
    fn test_largest_detection_picks_max_area() {
        let dets = vec![det(0.0, 0.0, 0.2, 0.2), det(0.1, 0.1, 0.5, 0.5), det(0.0, 0.0, 0.3, 0.3)];
        let best = largest_detection(&dets).unwrap();
        assert!((best.bbox.width - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_largest_detection_first_max_wins() {
        let dets = vec![det(0.1, 0.1, 0.4, 0.4), det(0.5, 0.5, 0.4, 0.4)];
        let best = largest_detection(&dets).unwrap();
        assert!((best.bbox.xmin - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_largest_detection_empty() {
        assert!(largest_detection(&[]).is_none());
    }

    #[test]
    fn test_extract_crops_and_resizes() {
        let image = gradient(200, 100);
        let mut detector = FixedDetector(vec![det(0.25, 0.2, 0.5, 0.6)]);
        let outcome = FaceExtractor::new(32).extract(&image, "alice", "a.jpg", &mut detector);

        let crop = outcome.into_crop().expect("face expected");
        assert_eq!(crop.pixels.dimensions(), (32, 32));
        assert_eq!(crop.category, "alice");
        assert_eq!(crop.file_name, "a.jpg");
        assert_eq!(crop.source_box.x, 50);
        assert_eq!(crop.source_box.y, 20);
        assert_eq!(crop.source_box.width, 100);
        assert_eq!(crop.source_box.height, 60);
    }

    #[test]
    fn test_extract_no_face() {
        let image = gradient(64, 64);
        let mut detector = FixedDetector(vec![]);
        let outcome = FaceExtractor::new(32).extract(&image, "c", "x.png", &mut detector);
        assert!(matches!(outcome, ExtractOutcome::Skipped(SkipReason::NoFace)));
    }

    #[test]
    fn test_extract_rejects_box_outside_image() {
        let image = gradient(64, 64);
        let mut detector = FixedDetector(vec![det(0.6, 0.1, 0.5, 0.5)]);
        let outcome = FaceExtractor::new(32).extract(&image, "c", "x.png", &mut detector);
        assert!(matches!(outcome, ExtractOutcome::Skipped(SkipReason::InvalidBox)));
    }

    #[test]
    fn test_extract_rejects_negative_origin() {
        let image = gradient(64, 64);
        let mut detector = FixedDetector(vec![det(-0.1, 0.1, 0.5, 0.5)]);
        let outcome = FaceExtractor::new(32).extract(&image, "c", "x.png", &mut detector);
        assert!(matches!(outcome, ExtractOutcome::Skipped(SkipReason::InvalidBox)));
    }

    #[test]
    fn test_extract_rejects_degenerate_box() {
        let image = gradient(64, 64);
        let mut detector = FixedDetector(vec![det(0.1, 0.1, 0.001, 0.5)]);
        let outcome = FaceExtractor::new(32).extract(&image, "c", "x.png", &mut detector);
        assert!(matches!(outcome, ExtractOutcome::Skipped(SkipReason::InvalidBox)));
    }

    #[test]
    fn test_extract_only_considers_largest_face() {
        // The largest face is out of bounds; the smaller valid one is not used.
        let image = gradient(64, 64);
        let mut detector = FixedDetector(vec![det(0.1, 0.1, 0.2, 0.2), det(0.7, 0.7, 0.6, 0.6)]);
        let outcome = FaceExtractor::new(32).extract(&image, "c", "x.png", &mut detector);
        assert!(matches!(outcome, ExtractOutcome::Skipped(SkipReason::InvalidBox)));
    }

    #[test]
    fn test_extract_detector_failure_is_skip() {
        let image = gradient(64, 64);
        let outcome = FaceExtractor::new(32).extract(&image, "c", "x.png", &mut FailingDetector);
        match outcome {
            ExtractOutcome::Skipped(SkipReason::Failed(msg)) => assert!(msg.contains("boom")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_extract_is_deterministic() {
        let image = gradient(120, 90);
        let mut detector = FixedDetector(vec![det(0.1, 0.1, 0.6, 0.7)]);
        let extractor = FaceExtractor::new(48);
        let a = extractor.extract(&image, "c", "x.png", &mut detector).into_crop().unwrap();
        let b = extractor.extract(&image, "c", "x.png", &mut detector).into_crop().unwrap();
        assert_eq!(a.pixels, b.pixels);
    }

    #[test]
    fn test_extract_path_unreadable() {
        let path = std::env::temp_dir().join("facesieve-definitely-missing-file.jpg");
        let mut detector = FixedDetector(vec![det(0.0, 0.0, 1.0, 1.0)]);
        let outcome = FaceExtractor::new(32).extract_path(&path, "c", &mut detector);
        assert!(matches!(outcome, ExtractOutcome::Skipped(SkipReason::Unreadable)));
    }
}
