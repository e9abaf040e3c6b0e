use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Face bounding box in the detector's normalized (0–1) coordinate space.
///
/// Values may fall outside [0, 1] when the detector places a box partly
/// beyond the image border.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativeBox {
    pub xmin: f32,
    pub ymin: f32,
    pub width: f32,
    pub height: f32,
}

impl RelativeBox {
    /// Area in normalized units (relative width × relative height).
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Convert to absolute pixel coordinates for an image of the given size.
    ///
    /// Each coordinate is truncated toward zero, so a box that starts a
    /// fraction of a pixel before the border still maps to `x = 0`.
    pub fn to_pixels(&self, image_width: u32, image_height: u32) -> PixelBox {
        let w = image_width as f64;
        let h = image_height as f64;
        PixelBox {
            x: (self.xmin as f64 * w) as i64,
            y: (self.ymin as f64 * h) as i64,
            width: (self.width as f64 * w) as i64,
            height: (self.height as f64 * h) as i64,
        }
    }
}

/// Absolute bounding box in source-image pixels. Signed so that boxes
/// reaching past the top/left border can be represented and rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl PixelBox {
    /// True when the box has positive size and lies fully inside a
    /// `width × height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x >= 0
            && self.y >= 0
            && self.x + self.width <= width as i64
            && self.y + self.height <= height as i64
    }
}

/// A single face detection as reported by a [`FaceDetector`](crate::FaceDetector).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: RelativeBox,
    pub confidence: f32,
}

/// A square, resized crop of the largest face found in a source image.
#[derive(Debug, Clone)]
pub struct FaceCrop {
    /// `target_size × target_size` RGB pixels.
    pub pixels: RgbImage,
    /// Category (identity) the source image belongs to.
    pub category: String,
    /// File name of the source image, without directory.
    pub file_name: String,
    /// Region of the source image the crop was taken from.
    pub source_box: PixelBox,
}

/// One persisted, deduplicated face crop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub category: String,
    pub path: PathBuf,
    pub original: String,
}
