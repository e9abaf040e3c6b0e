//! Randomized augmentation of face crops.
//!
//! An [`AugmentPipeline`] is an ordered list of [`Step`]s; each step fires
//! independently with its own probability and operates on the output of the
//! previous one. [`AugmentPipeline::default`] is the face-recognition recipe:
//! flip, shift/scale/rotate, brightness/contrast, Gaussian noise, one of two
//! blurs, then ImageNet normalization.

use crate::warp;
use image::imageops;
use image::{Rgb, RgbImage};
use imageproc::filter::filter_clamped;
use imageproc::kernel::Kernel;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use thiserror::Error;

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Error, Debug, PartialEq)]
pub enum AugmentError {
    #[error("probability {0} outside [0, 1]")]
    Probability(f64),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Which blur a [`Transform::OneOfBlur`] ended up applying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurKind {
    Gaussian,
    Motion,
}

/// A single image transform. Random parameters are drawn per application.
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    HorizontalFlip,
    /// Shift by up to `shift_limit` of each dimension, scale by `1 ± scale_limit`,
    /// rotate by up to `±rotate_limit` degrees, all about the image centre.
    ShiftScaleRotate {
        shift_limit: f32,
        scale_limit: f32,
        rotate_limit: f32,
    },
    /// `out = in · (1 + c) + b · 255` with `c ∈ ±contrast_limit`, `b ∈ ±brightness_limit`.
    BrightnessContrast {
        brightness_limit: f32,
        contrast_limit: f32,
    },
    /// Zero-mean noise with σ drawn from `std_range`, relative to 255.
    GaussNoise { std_range: (f32, f32) },
    /// Gaussian or motion blur, chosen uniformly, with an odd kernel size
    /// drawn from `blur_limit`.
    OneOfBlur { blur_limit: (usize, usize) },
    /// Per-channel `(p/255 − mean) / std`, then divided by `max_value` and
    /// re-encoded to 8 bits as `trunc(v · 255)`, saturating.
    Normalize {
        mean: [f32; 3],
        std: [f32; 3],
        max_value: f32,
    },
}

impl Transform {
    pub fn apply<R: Rng + ?Sized>(&self, image: RgbImage, rng: &mut R) -> RgbImage {
        match *self {
            Transform::HorizontalFlip => imageops::flip_horizontal(&image),
            Transform::ShiftScaleRotate {
                shift_limit,
                scale_limit,
                rotate_limit,
            } => {
                let angle = uniform(rng, -rotate_limit, rotate_limit);
                let scale = uniform(rng, 1.0 - scale_limit, 1.0 + scale_limit);
                let dx = uniform(rng, -shift_limit, shift_limit);
                let dy = uniform(rng, -shift_limit, shift_limit);
                shift_scale_rotate(&image, angle, scale, dx, dy)
            }
            Transform::BrightnessContrast {
                brightness_limit,
                contrast_limit,
            } => {
                let alpha = 1.0 + uniform(rng, -contrast_limit, contrast_limit);
                let beta = uniform(rng, -brightness_limit, brightness_limit);
                brightness_contrast(image, alpha, beta)
            }
            Transform::GaussNoise { std_range } => {
                let sigma = uniform(rng, std_range.0, std_range.1) * 255.0;
                gauss_noise(image, sigma, rng)
            }
            Transform::OneOfBlur { blur_limit } => {
                let kind = if rng.gen_bool(0.5) {
                    BlurKind::Gaussian
                } else {
                    BlurKind::Motion
                };
                let size = odd_kernel_size(rng, blur_limit);
                match kind {
                    BlurKind::Gaussian => gaussian_blur(&image, size),
                    BlurKind::Motion => {
                        let angle = uniform(rng, 0.0, 180.0);
                        motion_blur(&image, size, angle)
                    }
                }
            }
            Transform::Normalize {
                mean,
                std,
                max_value,
            } => normalize(image, mean, std, max_value),
        }
    }
}

/// A transform that fires with probability `p`.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub transform: Transform,
    pub p: f64,
}

impl Step {
    pub fn new(transform: Transform, p: f64) -> Self {
        Self { transform, p }
    }
}

/// Ordered, independently-randomized augmentation steps.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentPipeline {
    steps: Vec<Step>,
}

impl Default for AugmentPipeline {
    fn default() -> Self {
        Self::face_recognition(true)
    }
}

impl AugmentPipeline {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// The standard recipe. `normalize` controls the final ImageNet step.
    pub fn face_recognition(normalize: bool) -> Self {
        let mut steps = vec![
            Step::new(Transform::HorizontalFlip, 0.5),
            Step::new(
                Transform::ShiftScaleRotate {
                    shift_limit: 0.05,
                    scale_limit: 0.1,
                    rotate_limit: 15.0,
                },
                0.7,
            ),
            Step::new(
                Transform::BrightnessContrast {
                    brightness_limit: 0.2,
                    contrast_limit: 0.2,
                },
                0.8,
            ),
            Step::new(Transform::GaussNoise { std_range: (0.04, 0.1) }, 0.2),
            Step::new(Transform::OneOfBlur { blur_limit: (3, 7) }, 0.2),
        ];
        if normalize {
            // The recipe's statistics are indexed in BGR order; channel 0 here is red.
            steps.push(Step::new(
                Transform::Normalize {
                    mean: reversed(IMAGENET_MEAN),
                    std: reversed(IMAGENET_STD),
                    max_value: 255.0,
                },
                1.0,
            ));
        }
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Check probabilities and parameter ranges.
    pub fn validate(&self) -> Result<(), AugmentError> {
        for step in &self.steps {
            if !(0.0..=1.0).contains(&step.p) {
                return Err(AugmentError::Probability(step.p));
            }
            match &step.transform {
                Transform::GaussNoise { std_range: (lo, hi) } if !(0.0 <= *lo && lo <= hi) => {
                    return Err(AugmentError::InvalidParameter(format!(
                        "noise std range ({lo}, {hi})"
                    )));
                }
                Transform::OneOfBlur { blur_limit: (lo, hi) } if !(3 <= *lo && lo <= hi) => {
                    return Err(AugmentError::InvalidParameter(format!(
                        "blur limit ({lo}, {hi}) must satisfy 3 <= lo <= hi"
                    )));
                }
                Transform::Normalize { std, max_value, .. }
                    if std.iter().any(|s| *s <= 0.0) || *max_value <= 0.0 =>
                {
                    return Err(AugmentError::InvalidParameter(
                        "normalize std and max_value must be positive".into(),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Produce one randomized variant of `image`.
    pub fn apply<R: Rng + ?Sized>(&self, image: &RgbImage, rng: &mut R) -> RgbImage {
        let mut out = image.clone();
        for step in &self.steps {
            if rng.gen::<f64>() < step.p {
                out = step.transform.apply(out, rng);
            }
        }
        out
    }
}

fn reversed([a, b, c]: [f32; 3]) -> [f32; 3] {
    [c, b, a]
}

fn uniform<R: Rng + ?Sized>(rng: &mut R, lo: f32, hi: f32) -> f32 {
    if hi > lo {
        rng.gen_range(lo..=hi)
    } else {
        lo
    }
}

fn odd_kernel_size<R: Rng + ?Sized>(rng: &mut R, (lo, hi): (usize, usize)) -> usize {
    let lo = lo.max(3) | 1;
    let hi = hi.max(lo);
    let choices = (hi - lo) / 2 + 1;
    lo + 2 * rng.gen_range(0..choices)
}

fn shift_scale_rotate(image: &RgbImage, angle: f32, scale: f32, dx: f32, dy: f32) -> RgbImage {
    let (w, h) = image.dimensions();
    let matrix = warp::similarity_matrix(
        (w as f32 / 2.0, h as f32 / 2.0),
        angle,
        scale,
        (dx * w as f32, dy * h as f32),
    );
    warp::warp_similarity(image, &matrix)
}

fn brightness_contrast(mut image: RgbImage, alpha: f32, beta: f32) -> RgbImage {
    let offset = beta * 255.0;
    for p in image.pixels_mut() {
        for v in p.0.iter_mut() {
            *v = (*v as f32 * alpha + offset).round().clamp(0.0, 255.0) as u8;
        }
    }
    image
}

fn gauss_noise<R: Rng + ?Sized>(mut image: RgbImage, sigma: f32, rng: &mut R) -> RgbImage {
    let Ok(normal) = Normal::new(0.0f32, sigma) else {
        return image;
    };
    for p in image.pixels_mut() {
        for v in p.0.iter_mut() {
            *v = (*v as f32 + normal.sample(rng)).round().clamp(0.0, 255.0) as u8;
        }
    }
    image
}

/// σ derived from kernel size the way OpenCV does when σ is left unspecified.
fn gaussian_sigma(size: usize) -> f32 {
    0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Separable Gaussian taps expanded to a normalized `size × size` kernel.
fn gaussian_kernel(size: usize) -> Vec<f32> {
    let sigma = gaussian_sigma(size);
    let half = (size / 2) as f32;
    let taps: Vec<f32> = (0..size)
        .map(|i| (-((i as f32 - half).powi(2)) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f32 = taps.iter().sum();

    let mut kernel = Vec::with_capacity(size * size);
    for ky in &taps {
        for kx in &taps {
            kernel.push(ky * kx / (total * total));
        }
    }
    kernel
}

fn gaussian_blur(image: &RgbImage, size: usize) -> RgbImage {
    apply_kernel(image, &gaussian_kernel(size), size)
}

/// Line kernel through the centre at `angle_deg`, normalized to sum 1.
fn motion_kernel(size: usize, angle_deg: f32) -> Vec<f32> {
    let mut kernel = vec![0.0f32; size * size];
    let half = (size / 2) as i64;
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    for t in -half..=half {
        let x = (half as f32 + t as f32 * cos).round() as i64;
        let y = (half as f32 + t as f32 * sin).round() as i64;
        if (0..size as i64).contains(&x) && (0..size as i64).contains(&y) {
            kernel[y as usize * size + x as usize] = 1.0;
        }
    }
    let total: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= total);
    kernel
}

fn motion_blur(image: &RgbImage, size: usize, angle_deg: f32) -> RgbImage {
    apply_kernel(image, &motion_kernel(size, angle_deg), size)
}

fn apply_kernel(image: &RgbImage, kernel: &[f32], size: usize) -> RgbImage {
    filter_clamped::<_, f32, u8>(image, Kernel::new(kernel, size as u32, size as u32))
}

fn normalize(mut image: RgbImage, mean: [f32; 3], std: [f32; 3], max_value: f32) -> RgbImage {
    for p in image.pixels_mut() {
        let Rgb(channels) = *p;
        for c in 0..3 {
            let normalized = (channels[c] as f32 / 255.0 - mean[c]) / std[c];
            let as_float = normalized / max_value;
            p.0[c] = (as_float * 255.0) as u8;
        }
    }
    image
}
