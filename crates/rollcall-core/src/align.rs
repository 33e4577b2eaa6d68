//! Canonical face alignment.
//!
//! Maps the five detected landmarks onto the reference positions the
//! embedding model was trained with, then warps the face region into a
//! 112×112 grayscale crop.

/// Side length of the aligned crop fed to the embedder.
pub const CROP_SIZE: usize = 112;

/// Reference landmark positions for a 112×112 crop (InsightFace layout):
/// [left_eye, right_eye, nose, left_mouth, right_mouth].
const CANONICAL_LANDMARKS: [(f32, f32); 5] = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

/// Similarity transform (scale + rotation + translation):
/// (x, y) ↦ (a·x − b·y + tx, b·x + a·y + ty).
#[derive(Debug, Clone, Copy)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    const IDENTITY: Similarity = Similarity {
        a: 1.0,
        b: 0.0,
        tx: 0.0,
        ty: 0.0,
    };

    /// Least-squares fit of the transform taking `src` points to `dst`.
    ///
    /// The normal equations of the 4-DOF problem have a closed-form
    /// solution in the point sums. Degenerate inputs (all points
    /// coincident) fall back to identity.
    fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Similarity {
        let n = src.len() as f32;
        let (mut sx, mut sy, mut su, mut sv) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
        let (mut sxx, mut sxu, mut syu) = (0.0f32, 0.0f32, 0.0f32);

        for (&(x, y), &(u, v)) in src.iter().zip(dst.iter()) {
            sx += x;
            sy += y;
            su += u;
            sv += v;
            sxx += x * x + y * y;
            sxu += x * u + y * v;
            syu += x * v - y * u;
        }

        let denom = n * sxx - sx * sx - sy * sy;
        if denom.abs() < 1e-6 {
            return Similarity::IDENTITY;
        }

        let a = (n * sxu - sx * su - sy * sv) / denom;
        let b = (n * syu - sx * sv + sy * su) / denom;
        let tx = (su - a * sx + b * sy) / n;
        let ty = (sv - b * sx - a * sy) / n;

        Similarity { a, b, tx, ty }
    }

    /// Map a point in destination space back to source space.
    ///
    /// The 2×2 part has determinant a² + b²; a transform estimated from
    /// non-degenerate landmarks is always invertible.
    fn unmap(&self, u: f32, v: f32) -> (f32, f32) {
        let det = self.a * self.a + self.b * self.b;
        let du = u - self.tx;
        let dv = v - self.ty;
        ((self.a * du + self.b * dv) / det, (self.a * dv - self.b * du) / det)
    }
}

/// Sample a grayscale image at a fractional position with bilinear
/// interpolation. Out-of-bounds reads return 0 (black).
fn sample_bilinear(gray: &[u8], width: usize, height: usize, x: f32, y: f32) -> f32 {
    let at = |xi: i64, yi: i64| -> f32 {
        if xi >= 0 && xi < width as i64 && yi >= 0 && yi < height as i64 {
            gray[yi as usize * width + xi as usize] as f32
        } else {
            0.0
        }
    };

    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    at(x0, y0) * (1.0 - fx) * (1.0 - fy)
        + at(x0 + 1, y0) * fx * (1.0 - fy)
        + at(x0, y0 + 1) * (1.0 - fx) * fy
        + at(x0 + 1, y0 + 1) * fx * fy
}

/// Align a detected face to the canonical 112×112 crop.
///
/// Fits the similarity transform from the detected landmarks to the
/// reference positions and inverse-maps every output pixel with bilinear
/// sampling.
pub fn crop_aligned(
    gray: &[u8],
    width: u32,
    height: u32,
    landmarks: &[(f32, f32); 5],
) -> Vec<u8> {
    let transform = Similarity::estimate(landmarks, &CANONICAL_LANDMARKS);
    let (w, h) = (width as usize, height as usize);

    let mut crop = vec![0u8; CROP_SIZE * CROP_SIZE];
    for oy in 0..CROP_SIZE {
        for ox in 0..CROP_SIZE {
            let (sx, sy) = transform.unmap(ox as f32, oy as f32);
            let value = sample_bilinear(gray, w, h, sx, sy);
            crop[oy * CROP_SIZE + ox] = value.round().clamp(0.0, 255.0) as u8;
        }
    }

    crop
}
