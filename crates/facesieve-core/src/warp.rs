//! Similarity warps for RGB images.
//!
//! Out-of-bounds samples use reflect-101 borders (`dcb|abcd|cba`), so
//! shifted or rotated crops never gain black margins. `imageproc`'s
//! `warp` only fills with a constant colour, hence the local sampler.

use image::{Rgb, RgbImage};

/// Map an out-of-range index back into `0..len` by reflect-101.
pub(crate) fn reflect_101(mut i: i64, len: usize) -> usize {
    let n = len as i64;
    if n <= 1 {
        return 0;
    }
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * n - 2 - i;
        } else {
            return i as usize;
        }
    }
}

/// Build a 2×3 similarity transform rotating by `angle_deg` (counter-clockwise)
/// and scaling by `scale` about `center`, then translating by `shift`.
///
/// Returns [a, -b, tx, b, a, ty] representing the forward (source → output) matrix:
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
pub(crate) fn similarity_matrix(
    center: (f32, f32),
    angle_deg: f32,
    scale: f32,
    shift: (f32, f32),
) -> [f32; 6] {
    let theta = angle_deg.to_radians();
    let alpha = scale * theta.cos();
    let beta = scale * theta.sin();
    let (cx, cy) = center;

    // Rotating counter-clockwise in image coordinates (y down) is a = alpha, b = -beta.
    let a = alpha;
    let b = -beta;
    let tx = (1.0 - alpha) * cx - beta * cy + shift.0;
    let ty = beta * cx + (1.0 - alpha) * cy + shift.1;

    [a, -b, tx, b, a, ty]
}

/// Apply a similarity matrix from [`similarity_matrix`] to an RGB image,
/// keeping its dimensions. Uses bilinear interpolation.
pub(crate) fn warp_similarity(image: &RgbImage, matrix: &[f32; 6]) -> RgbImage {
    let (width, height) = image.dimensions();
    let (a, _neg_b, tx) = (matrix[0], matrix[1], matrix[2]);
    let (b, _a2, ty) = (matrix[3], matrix[4], matrix[5]);

    // Invert the 2x2 part: M = [[a, -b], [b, a]], det = a^2 + b^2
    let det = a * a + b * b;
    if det.abs() < 1e-12 {
        return image.clone();
    }
    let ia = a / det;
    let ib = b / det;

    let sample = |x: i64, y: i64| -> [f32; 3] {
        let p = image.get_pixel(
            reflect_101(x, width as usize) as u32,
            reflect_101(y, height as usize) as u32,
        );
        [p.0[0] as f32, p.0[1] as f32, p.0[2] as f32]
    };

    RgbImage::from_fn(width, height, |ox, oy| {
        // Map output pixel back to source: src = M_inv * (dst - t)
        let dx = ox as f32 - tx;
        let dy = oy as f32 - ty;
        let sx = ia * dx + ib * dy;
        let sy = -ib * dx + ia * dy;

        let x0 = sx.floor() as i64;
        let y0 = sy.floor() as i64;
        let fx = sx - x0 as f32;
        let fy = sy - y0 as f32;

        let tl = sample(x0, y0);
        let tr = sample(x0 + 1, y0);
        let bl = sample(x0, y0 + 1);
        let br = sample(x0 + 1, y0 + 1);

        let mut out = [0u8; 3];
        for c in 0..3 {
            let val = tl[c] * (1.0 - fx) * (1.0 - fy)
                + tr[c] * fx * (1.0 - fy)
                + bl[c] * (1.0 - fx) * fy
                + br[c] * fx * fy;
            out[c] = val.round().clamp(0.0, 255.0) as u8;
        }
        Rgb(out)
    })
}
