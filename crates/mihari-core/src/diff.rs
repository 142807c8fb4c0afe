use image::RgbaImage;

/// Score reported when no comparison is possible; far above any sane
/// threshold so the first observation always processes.
pub const FORCED_DIFF_SCORE: f64 = 1000.0;

/// Mean absolute difference of 8-bit luminance between two captures.
/// 0 means identical; higher means more different. A missing previous
/// frame or a size mismatch forces processing.
pub fn diff_score(current: &RgbaImage, previous: Option<&RgbaImage>) -> f64 {
    let Some(previous) = previous else {
        return FORCED_DIFF_SCORE;
    };
    if current.dimensions() != previous.dimensions() {
        return FORCED_DIFF_SCORE;
    }
    let count = (current.width() as u64 * current.height() as u64).max(1);
    let total: u64 = current
        .pixels()
        .zip(previous.pixels())
        .map(|(a, b)| (luma(a) as i64 - luma(b) as i64).unsigned_abs())
        .sum();
    total as f64 / count as f64
}

/// ITU-R 601 luminance weighting.
fn luma(p: &image::Rgba<u8>) -> u8 {
    ((299 * p.0[0] as u32 + 587 * p.0[1] as u32 + 114 * p.0[2] as u32) / 1000) as u8
}
