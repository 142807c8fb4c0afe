//! Executors for the preprocessing steps. Every function is a pure
//! transform of (image, parameters); cross-step state lives nowhere.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};

use crate::config::{BinarizeMethod, DenoiseMethod, Interpolation, MorphOp, PadColor};

pub fn scale(image: DynamicImage, factor: f32, interpolation: Interpolation) -> DynamicImage {
    if factor <= 1.0 {
        return image;
    }
    let factor = factor.min(4.0);
    let filter = match interpolation {
        Interpolation::Nearest => FilterType::Nearest,
        Interpolation::Bilinear => FilterType::Triangle,
        Interpolation::Bicubic => FilterType::CatmullRom,
        Interpolation::Lanczos => FilterType::Lanczos3,
    };
    let w = ((image.width() as f32) * factor).round().max(1.0) as u32;
    let h = ((image.height() as f32) * factor).round().max(1.0) as u32;
    image.resize_exact(w, h, filter)
}

pub fn grayscale(image: DynamicImage) -> DynamicImage {
    DynamicImage::ImageLuma8(image.to_luma8())
}

/// Conditional polarity flip: when mean brightness exceeds the
/// threshold the image is inverted, so output converges to light text
/// on a dark background regardless of the source polarity.
pub fn auto_invert(image: DynamicImage, threshold: u8) -> DynamicImage {
    let gray = image.to_luma8();
    let total: u64 = gray.pixels().map(|p| p.0[0] as u64).sum();
    let count = (gray.width() as u64 * gray.height() as u64).max(1);
    let mean = total as f64 / count as f64;
    if mean > threshold as f64 {
        let mut out = image;
        out.invert();
        out
    } else {
        image
    }
}

/// Affine remap around mid-gray, then a brightness multiplier.
pub fn contrast_brightness(image: DynamicImage, factor: f32, brightness: f32) -> DynamicImage {
    let remap = |v: u8| -> u8 {
        let c = ((v as f32 - 128.0) * factor + 128.0) * brightness;
        c.clamp(0.0, 255.0) as u8
    };
    match image {
        DynamicImage::ImageLuma8(mut gray) => {
            for p in gray.pixels_mut() {
                p.0[0] = remap(p.0[0]);
            }
            DynamicImage::ImageLuma8(gray)
        }
        other => {
            let mut rgba = other.to_rgba8();
            for p in rgba.pixels_mut() {
                for ch in 0..3 {
                    p.0[ch] = remap(p.0[ch]);
                }
            }
            DynamicImage::ImageRgba8(rgba)
        }
    }
}

/// Contrast-limited adaptive histogram equalization over a tiled grid.
/// Each pixel is remapped by bilinear interpolation between the
/// clipped-CDF lookup tables of the four surrounding tiles.
pub fn equalize(image: DynamicImage, clip_limit: f32, grid_size: u32) -> DynamicImage {
    let gray = image.to_luma8();
    let (w, h) = gray.dimensions();
    let grid = grid_size.clamp(1, 32);
    if w == 0 || h == 0 {
        return DynamicImage::ImageLuma8(gray);
    }
    let tile_w = w.div_ceil(grid).max(1);
    let tile_h = h.div_ceil(grid).max(1);
    let tiles_x = w.div_ceil(tile_w);
    let tiles_y = h.div_ceil(tile_h);

    let mut luts: Vec<[u8; 256]> = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);
            let pixels = ((x1 - x0) * (y1 - y0)).max(1);

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[gray.get_pixel(x, y).0[0] as usize] += 1;
                }
            }

            // Clip the histogram and spread the excess uniformly.
            let clip = ((clip_limit.max(0.5) * pixels as f32 / 256.0) as u32).max(1);
            let mut excess = 0u32;
            for bin in hist.iter_mut() {
                if *bin > clip {
                    excess += *bin - clip;
                    *bin = clip;
                }
            }
            let bonus = excess / 256;
            for bin in hist.iter_mut() {
                *bin += bonus;
            }

            let mut lut = [0u8; 256];
            let mut cdf = 0u32;
            for (v, bin) in hist.iter().enumerate() {
                cdf += *bin;
                lut[v] = ((cdf as f32 / pixels as f32) * 255.0).round().min(255.0) as u8;
            }
            luts.push(lut);
        }
    }

    let lut_at = |tx: i64, ty: i64| -> &[u8; 256] {
        let tx = tx.clamp(0, tiles_x as i64 - 1) as u32;
        let ty = ty.clamp(0, tiles_y as i64 - 1) as u32;
        &luts[(ty * tiles_x + tx) as usize]
    };

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let v = gray.get_pixel(x, y).0[0] as usize;
            let fx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
            let fy = (y as f32 + 0.5) / tile_h as f32 - 0.5;
            let tx0 = fx.floor() as i64;
            let ty0 = fy.floor() as i64;
            let wx = fx - tx0 as f32;
            let wy = fy - ty0 as f32;

            let v00 = lut_at(tx0, ty0)[v] as f32;
            let v10 = lut_at(tx0 + 1, ty0)[v] as f32;
            let v01 = lut_at(tx0, ty0 + 1)[v] as f32;
            let v11 = lut_at(tx0 + 1, ty0 + 1)[v] as f32;
            let top = v00 * (1.0 - wx) + v10 * wx;
            let bottom = v01 * (1.0 - wx) + v11 * wx;
            let blended = top * (1.0 - wy) + bottom * wy;
            out.put_pixel(x, y, Luma([blended.round().clamp(0.0, 255.0) as u8]));
        }
    }
    DynamicImage::ImageLuma8(out)
}

/// Unsharp mask: original plus `amount` times the difference from a
/// Gaussian-blurred copy.
pub fn sharpen(image: DynamicImage, amount: f32, radius: f32) -> DynamicImage {
    if amount <= 0.0 {
        return image;
    }
    let blurred = image.blur(radius.max(0.1));
    match image {
        DynamicImage::ImageLuma8(gray) => {
            let soft = blurred.to_luma8();
            let mut out = gray;
            for (p, b) in out.pixels_mut().zip(soft.pixels()) {
                let v = p.0[0] as f32 + amount * (p.0[0] as f32 - b.0[0] as f32);
                p.0[0] = v.clamp(0.0, 255.0) as u8;
            }
            DynamicImage::ImageLuma8(out)
        }
        other => {
            let soft = blurred.to_rgba8();
            let mut out = other.to_rgba8();
            for (p, b) in out.pixels_mut().zip(soft.pixels()) {
                for ch in 0..3 {
                    let v = p.0[ch] as f32 + amount * (p.0[ch] as f32 - b.0[ch] as f32);
                    p.0[ch] = v.clamp(0.0, 255.0) as u8;
                }
            }
            DynamicImage::ImageRgba8(out)
        }
    }
}

pub fn denoise(image: DynamicImage, method: DenoiseMethod, strength: u8) -> DynamicImage {
    let strength = strength.max(1);
    match method {
        DenoiseMethod::Gaussian => {
            let ksize = (strength | 1).max(3) as f32;
            image.blur(ksize / 3.0)
        }
        DenoiseMethod::Median => {
            DynamicImage::ImageLuma8(median_filter(&image.to_luma8(), (strength | 1).max(3)))
        }
        DenoiseMethod::Bilateral => {
            DynamicImage::ImageLuma8(bilateral_filter(&image.to_luma8(), strength))
        }
        DenoiseMethod::NlMeans => {
            DynamicImage::ImageLuma8(nl_means_filter(&image.to_luma8(), strength))
        }
    }
}

fn median_filter(gray: &GrayImage, ksize: u8) -> GrayImage {
    let (w, h) = gray.dimensions();
    let r = (ksize / 2) as i64;
    let mut out = GrayImage::new(w, h);
    let mut window = Vec::with_capacity((ksize as usize).pow(2));
    for y in 0..h {
        for x in 0..w {
            window.clear();
            for dy in -r..=r {
                for dx in -r..=r {
                    let sx = (x as i64 + dx).clamp(0, w as i64 - 1) as u32;
                    let sy = (y as i64 + dy).clamp(0, h as i64 - 1) as u32;
                    window.push(gray.get_pixel(sx, sy).0[0]);
                }
            }
            window.sort_unstable();
            out.put_pixel(x, y, Luma([window[window.len() / 2]]));
        }
    }
    out
}

fn bilateral_filter(gray: &GrayImage, strength: u8) -> GrayImage {
    let (w, h) = gray.dimensions();
    let r: i64 = 4;
    let sigma = (strength as f32 * 7.0).max(1.0);
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let center = gray.get_pixel(x, y).0[0] as f32;
            let mut acc = 0.0f32;
            let mut norm = 0.0f32;
            for dy in -r..=r {
                for dx in -r..=r {
                    let sx = (x as i64 + dx).clamp(0, w as i64 - 1) as u32;
                    let sy = (y as i64 + dy).clamp(0, h as i64 - 1) as u32;
                    let v = gray.get_pixel(sx, sy).0[0] as f32;
                    let spatial = ((dx * dx + dy * dy) as f32) / two_sigma_sq;
                    let range = (v - center) * (v - center) / two_sigma_sq;
                    let weight = (-spatial - range).exp();
                    acc += weight * v;
                    norm += weight;
                }
            }
            out.put_pixel(x, y, Luma([(acc / norm.max(f32::EPSILON)).round() as u8]));
        }
    }
    out
}

/// Non-local means over a reduced search window. Patch radius 1,
/// search radius 5; full-size windows are too slow without SIMD.
fn nl_means_filter(gray: &GrayImage, strength: u8) -> GrayImage {
    let (w, h) = gray.dimensions();
    let search: i64 = 5;
    let patch: i64 = 1;
    let h2 = (strength as f32 * strength as f32).max(1.0);
    let sample = |x: i64, y: i64| -> f32 {
        gray.get_pixel(x.clamp(0, w as i64 - 1) as u32, y.clamp(0, h as i64 - 1) as u32).0[0] as f32
    };
    let mut out = GrayImage::new(w, h);
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let mut acc = 0.0f32;
            let mut norm = 0.0f32;
            for sy in -search..=search {
                for sx in -search..=search {
                    let mut dist = 0.0f32;
                    for py in -patch..=patch {
                        for px in -patch..=patch {
                            let d = sample(x + px, y + py) - sample(x + sx + px, y + sy + py);
                            dist += d * d;
                        }
                    }
                    dist /= ((2 * patch + 1) * (2 * patch + 1)) as f32;
                    let weight = (-dist / h2).exp();
                    acc += weight * sample(x + sx, y + sy);
                    norm += weight;
                }
            }
            out.put_pixel(
                x as u32,
                y as u32,
                Luma([(acc / norm.max(f32::EPSILON)).round() as u8]),
            );
        }
    }
    out
}

pub fn binarize(
    image: DynamicImage,
    method: BinarizeMethod,
    block_size: u32,
    constant: i32,
    threshold: u8,
) -> DynamicImage {
    let gray = image.to_luma8();
    let out = match method {
        BinarizeMethod::Fixed => threshold_fixed(&gray, threshold),
        BinarizeMethod::Otsu => threshold_fixed(&gray, otsu_level(&gray)),
        BinarizeMethod::AdaptiveMean => {
            let block = (block_size | 1).max(3);
            let means = box_mean(&gray, block / 2);
            threshold_local(&gray, &means, constant)
        }
        BinarizeMethod::AdaptiveGaussian => {
            let block = (block_size | 1).max(3);
            let means = image::imageops::blur(&gray, block as f32 / 6.0);
            threshold_local(&gray, &means, constant)
        }
    };
    DynamicImage::ImageLuma8(out)
}

fn threshold_fixed(gray: &GrayImage, level: u8) -> GrayImage {
    let mut out = gray.clone();
    for p in out.pixels_mut() {
        p.0[0] = if p.0[0] > level { 255 } else { 0 };
    }
    out
}

fn threshold_local(gray: &GrayImage, local_mean: &GrayImage, constant: i32) -> GrayImage {
    let mut out = gray.clone();
    for (p, m) in out.pixels_mut().zip(local_mean.pixels()) {
        let cutoff = m.0[0] as i32 - constant;
        p.0[0] = if (p.0[0] as i32) > cutoff { 255 } else { 0 };
    }
    out
}

/// Otsu's method: the level maximizing between-class variance.
fn otsu_level(gray: &GrayImage) -> u8 {
    let mut hist = [0u64; 256];
    for p in gray.pixels() {
        hist[p.0[0] as usize] += 1;
    }
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return 128;
    }
    let sum_all: f64 = hist.iter().enumerate().map(|(v, n)| v as f64 * *n as f64).sum();

    let mut best_level = 0u8;
    let mut best_variance = 0.0f64;
    let mut weight_bg = 0u64;
    let mut sum_bg = 0.0f64;
    for level in 0..256usize {
        weight_bg += hist[level];
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }
        sum_bg += level as f64 * hist[level] as f64;
        let mean_bg = sum_bg / weight_bg as f64;
        let mean_fg = (sum_all - sum_bg) / weight_fg as f64;
        let variance =
            weight_bg as f64 * weight_fg as f64 * (mean_bg - mean_fg) * (mean_bg - mean_fg);
        if variance > best_variance {
            best_variance = variance;
            best_level = level as u8;
        }
    }
    best_level
}

/// Box mean over a clamped window, via an integral image.
fn box_mean(gray: &GrayImage, radius: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let mut integral = vec![0u64; ((w + 1) * (h + 1)) as usize];
    let stride = (w + 1) as usize;
    for y in 0..h as usize {
        for x in 0..w as usize {
            integral[(y + 1) * stride + x + 1] = gray.get_pixel(x as u32, y as u32).0[0] as u64
                + integral[y * stride + x + 1]
                + integral[(y + 1) * stride + x]
                - integral[y * stride + x];
        }
    }
    let r = radius as i64;
    let mut out = GrayImage::new(w, h);
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let x0 = (x - r).max(0) as usize;
            let y0 = (y - r).max(0) as usize;
            let x1 = (x + r + 1).min(w as i64) as usize;
            let y1 = (y + r + 1).min(h as i64) as usize;
            let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                - integral[y0 * stride + x1]
                - integral[y1 * stride + x0];
            let area = (((x1 - x0) * (y1 - y0)) as u64).max(1);
            out.put_pixel(x as u32, y as u32, Luma([(sum / area) as u8]));
        }
    }
    out
}

pub fn morphology(
    image: DynamicImage,
    op: MorphOp,
    kernel_size: u32,
    iterations: u32,
) -> DynamicImage {
    let mut gray = image.to_luma8();
    let k = kernel_size.max(1);
    for _ in 0..iterations.max(1) {
        gray = match op {
            MorphOp::Dilate => rank_filter(&gray, k, true),
            MorphOp::Erode => rank_filter(&gray, k, false),
            MorphOp::Close => rank_filter(&rank_filter(&gray, k, true), k, false),
            MorphOp::Open => rank_filter(&rank_filter(&gray, k, false), k, true),
        };
    }
    DynamicImage::ImageLuma8(gray)
}

/// Max (dilate) or min (erode) over a square structuring element.
fn rank_filter(gray: &GrayImage, kernel: u32, take_max: bool) -> GrayImage {
    let (w, h) = gray.dimensions();
    let r = (kernel / 2) as i64;
    let mut out = GrayImage::new(w, h);
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let mut acc: u8 = if take_max { 0 } else { 255 };
            for dy in -r..=r {
                for dx in -r..=r {
                    let sx = (x + dx).clamp(0, w as i64 - 1) as u32;
                    let sy = (y + dy).clamp(0, h as i64 - 1) as u32;
                    let v = gray.get_pixel(sx, sy).0[0];
                    acc = if take_max { acc.max(v) } else { acc.min(v) };
                }
            }
            out.put_pixel(x as u32, y as u32, Luma([acc]));
        }
    }
    out
}

/// Uniform border, recovers characters touching the capture edge.
pub fn pad(image: DynamicImage, pixels: u32, color: PadColor) -> DynamicImage {
    if pixels == 0 {
        return image;
    }
    let fill = match color {
        PadColor::White => 255u8,
        PadColor::Black => 0u8,
    };
    match image {
        DynamicImage::ImageLuma8(gray) => {
            let mut canvas = GrayImage::from_pixel(
                gray.width() + pixels * 2,
                gray.height() + pixels * 2,
                Luma([fill]),
            );
            image::imageops::replace(&mut canvas, &gray, pixels as i64, pixels as i64);
            DynamicImage::ImageLuma8(canvas)
        }
        other => {
            let rgba = other.to_rgba8();
            let mut canvas = image::RgbaImage::from_pixel(
                rgba.width() + pixels * 2,
                rgba.height() + pixels * 2,
                image::Rgba([fill, fill, fill, 255]),
            );
            image::imageops::replace(&mut canvas, &rgba, pixels as i64, pixels as i64);
            DynamicImage::ImageRgba8(canvas)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BinarizeMethod, DenoiseMethod, Interpolation, MorphOp, PadColor};
    use image::{DynamicImage, GrayImage, Luma};

    fn gray(w: u32, h: u32, v: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(w, h, Luma([v])))
    }

    #[test]
    fn scale_resamples_by_factor() {
        let out = scale(gray(10, 20, 128), 2.0, Interpolation::Bilinear);
        assert_eq!((out.width(), out.height()), (20, 40));
        // Factor <= 1 is a no-op.
        let out = scale(gray(10, 20, 128), 1.0, Interpolation::Nearest);
        assert_eq!((out.width(), out.height()), (10, 20));
    }

    #[test]
    fn auto_invert_converges_polarity() {
        // Bright image inverts, dark image stays.
        let bright = auto_invert(gray(4, 4, 220), 127);
        assert_eq!(bright.to_luma8().get_pixel(0, 0).0[0], 35);
        let dark = auto_invert(gray(4, 4, 30), 127);
        assert_eq!(dark.to_luma8().get_pixel(0, 0).0[0], 30);
    }

    #[test]
    fn auto_invert_mean_keeps_fractional_part() {
        // Four pixels at 127 plus one at 130: mean 127.6, which must
        // still count as above a threshold of 127.
        let mut img = GrayImage::from_pixel(5, 1, Luma([127]));
        img.put_pixel(4, 0, Luma([130]));
        let out = auto_invert(DynamicImage::ImageLuma8(img), 127);
        assert_eq!(out.to_luma8().get_pixel(0, 0).0[0], 128);
    }

    #[test]
    fn binarize_fixed_is_two_level() {
        let mut img = GrayImage::from_pixel(4, 4, Luma([40]));
        img.put_pixel(0, 0, Luma([200]));
        let out = binarize(
            DynamicImage::ImageLuma8(img),
            BinarizeMethod::Fixed,
            11,
            2,
            128,
        )
        .to_luma8();
        assert_eq!(out.get_pixel(0, 0).0[0], 255);
        assert_eq!(out.get_pixel(1, 1).0[0], 0);
    }

    #[test]
    fn otsu_separates_bimodal_image() {
        let mut img = GrayImage::new(2, 2);
        img.put_pixel(0, 0, Luma([10]));
        img.put_pixel(1, 0, Luma([10]));
        img.put_pixel(0, 1, Luma([240]));
        img.put_pixel(1, 1, Luma([240]));
        let out = binarize(DynamicImage::ImageLuma8(img), BinarizeMethod::Otsu, 11, 2, 128)
            .to_luma8();
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(0, 1).0[0], 255);
    }

    #[test]
    fn dilate_grows_bright_pixels() {
        let mut img = GrayImage::from_pixel(5, 5, Luma([0]));
        img.put_pixel(2, 2, Luma([255]));
        let out = morphology(DynamicImage::ImageLuma8(img), MorphOp::Dilate, 3, 1).to_luma8();
        assert_eq!(out.get_pixel(1, 2).0[0], 255);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn pad_adds_uniform_border() {
        let out = pad(gray(5, 5, 10), 3, PadColor::White);
        assert_eq!((out.width(), out.height()), (11, 11));
        let l = out.to_luma8();
        assert_eq!(l.get_pixel(0, 0).0[0], 255);
        assert_eq!(l.get_pixel(5, 5).0[0], 10);
    }

    #[test]
    fn denoise_flattens_salt_noise() {
        let mut img = GrayImage::from_pixel(9, 9, Luma([50]));
        img.put_pixel(4, 4, Luma([255]));
        let out = denoise(DynamicImage::ImageLuma8(img), DenoiseMethod::Median, 3).to_luma8();
        assert_eq!(out.get_pixel(4, 4).0[0], 50);
    }

    #[test]
    fn equalize_preserves_dimensions() {
        let out = equalize(gray(33, 17, 90), 2.0, 8);
        assert_eq!((out.width(), out.height()), (33, 17));
    }
}
