//! Mean-threshold perceptual hash and the per-category exact-match filter.

use crate::types::FaceCrop;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, RgbImage};
use std::collections::HashSet;
use std::fmt;

const HASH_GRID: u32 = 8;
const HASH_BITS: usize = (HASH_GRID * HASH_GRID) as usize;

/// 64-bit fingerprint of an 8×8 luminance grid thresholded against its mean.
///
/// Bit 63 is the top-left cell; cells follow in row-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PerceptualHash(u64);

impl PerceptualHash {
    /// Hash an 8-bit RGB image.
    pub fn compute(image: &RgbImage) -> Self {
        let gray = luminance(image);
        let grid = imageops::resize(&gray, HASH_GRID, HASH_GRID, FilterType::Triangle);

        let cells: Vec<f32> = grid.pixels().map(|p| p.0[0] as f32).collect();
        let mean = cells.iter().sum::<f32>() / HASH_BITS as f32;

        let bits = cells
            .iter()
            .fold(0u64, |acc, &v| (acc << 1) | u64::from(v > mean));
        Self(bits)
    }

    /// Hash any decoded image, converting it to 8-bit RGB first.
    pub fn from_dynamic(image: &DynamicImage) -> Self {
        Self::compute(&image.to_rgb8())
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    /// The hash as 64 '0'/'1' characters, top-left cell first.
    pub fn to_bit_string(&self) -> String {
        format!("{:064b}", self.0)
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_bit_string())
    }
}

/// ITU-R BT.601 luma of an RGB image.
pub fn luminance(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        Luma([y.round().clamp(0.0, 255.0) as u8])
    })
}

/// Exact perceptual-hash deduplication within one category.
///
/// Create one filter per category; it never sees crops from other
/// categories.
#[derive(Debug, Default)]
pub struct DuplicateFilter {
    seen: HashSet<PerceptualHash>,
}

impl DuplicateFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `hash`; returns `false` if it was already seen.
    pub fn admit(&mut self, hash: PerceptualHash) -> bool {
        self.seen.insert(hash)
    }

    /// Hash `crop` and decide keep (`true`) or drop (`false`).
    pub fn keep(&mut self, crop: &FaceCrop) -> bool {
        self.admit(PerceptualHash::compute(&crop.pixels))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
